//! In-process visibility, connectivity and focus signals.
//!
//! A host that knows about its own windowing (or a test) pushes changes
//! into a [`SignalHub`]; controllers consume it through the
//! [`Environment`] trait.

use reqflow_core::environment::{Callback, Environment};
use reqflow_core::subscription::{ListenerSet, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};

/// Host-driven [`Environment`].
///
/// Starts visible and online.
///
/// - `set_visible(true)` after being hidden fires the revisible signal, and
///   the focus signal too when online.
/// - `notify_focus()` fires the focus signal when visible and online.
#[derive(Debug)]
pub struct SignalHub {
    visible: AtomicBool,
    online: AtomicBool,
    focus: ListenerSet<()>,
    revisible: ListenerSet<()>,
}

impl SignalHub {
    /// A visible, online hub with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            visible: AtomicBool::new(true),
            online: AtomicBool::new(true),
            focus: ListenerSet::new(),
            revisible: ListenerSet::new(),
        }
    }

    /// Record a visibility change.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.visible.swap(visible, Ordering::AcqRel);
        if !visible || was_visible {
            return;
        }

        tracing::trace!("Page became visible");
        self.revisible.emit(&());
        if self.is_online() {
            self.focus.emit(&());
        }
    }

    /// Record a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// The window gained focus. Ignored while hidden or offline.
    pub fn notify_focus(&self) {
        if self.is_visible() && self.is_online() {
            self.focus.emit(&());
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SignalHub {
    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn subscribe_focus(&self, listener: Callback) -> Subscription {
        self.focus.subscribe(move |()| listener())
    }

    fn subscribe_revisible(&self, listener: Callback) -> Subscription {
        self.revisible.subscribe(move |()| listener())
    }
}
