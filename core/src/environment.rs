//! External signals the engine consumes.
//!
//! The engine never touches a window or a network stack. It only reads
//! boolean snapshots and subscribes to two signals:
//!
//! - **focus**: the window regained focus or became visible, while online.
//!   Drives refresh-on-focus.
//! - **revisible**: the page became visible again. Resumes paused polling.
//!
//! Implementations are injected through the request options. The runtime
//! crate ships an in-process `SignalHub` that a host drives.

use crate::subscription::Subscription;
use std::sync::Arc;

/// A parameterless signal callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Source of visibility, connectivity and focus signals.
pub trait Environment: Send + Sync {
    /// The page is currently visible.
    fn is_visible(&self) -> bool;

    /// The host currently has connectivity.
    fn is_online(&self) -> bool;

    /// Attach a listener to the focus signal.
    fn subscribe_focus(&self, listener: Callback) -> Subscription;

    /// Attach a listener to the "became visible" signal.
    fn subscribe_revisible(&self, listener: Callback) -> Subscription;
}

/// An environment that is always visible and online and never signals.
///
/// The default for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl Environment for Headless {
    fn is_visible(&self) -> bool {
        true
    }

    fn is_online(&self) -> bool {
        true
    }

    fn subscribe_focus(&self, _listener: Callback) -> Subscription {
        Subscription::detached()
    }

    fn subscribe_revisible(&self, _listener: Callback) -> Subscription {
        Subscription::detached()
    }
}
