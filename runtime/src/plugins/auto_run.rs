//! Automatic runs and readiness gating.
//!
//! - Initial `loading` is `!manual && ready`.
//! - While not ready, every run is vetoed, manual or not.
//! - Becoming ready triggers a run with the default params (automatic
//!   controllers only).
//! - A change of the refresh dependencies triggers the custom refresh
//!   action, or `refresh()` (automatic controllers only, and only once the
//!   first automatic run has happened).

use crate::controller::ControllerHandle;
use reqflow_core::config::RequestConfig;
use reqflow_core::environment::Callback;
use reqflow_core::plugin::{HookOutcome, Plugin};
use reqflow_core::state::PartialState;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Stable digest of a dependency list.
#[must_use]
pub fn fingerprint(deps: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    deps.hash(&mut hasher);
    hasher.finish()
}

/// Readiness gate and dependency-driven refresh.
pub struct AutoRunPlugin<P, T> {
    handle: ControllerHandle<P, T>,
    manual: bool,
    ready: AtomicBool,
    auto_ran: AtomicBool,
    deps: AtomicU64,
    default_params: Option<P>,
    refresh_action: Option<Callback>,
}

impl<P, T> AutoRunPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Build the plugin.
    #[must_use]
    pub fn new(
        handle: ControllerHandle<P, T>,
        config: &RequestConfig,
        default_params: Option<P>,
        refresh_deps: u64,
        refresh_action: Option<Callback>,
    ) -> Self {
        Self {
            handle,
            manual: config.manual,
            ready: AtomicBool::new(config.ready),
            auto_ran: AtomicBool::new(false),
            deps: AtomicU64::new(refresh_deps),
            default_params,
            refresh_action,
        }
    }

    /// Current readiness.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Note that the first automatic run has been issued.
    pub fn mark_auto_run(&self) {
        self.auto_ran.store(true, Ordering::Release);
    }

    /// `true` once the first automatic run has been issued.
    #[must_use]
    pub fn has_auto_run(&self) -> bool {
        self.auto_ran.load(Ordering::Acquire)
    }

    /// Record readiness; a change to `true` runs automatic controllers.
    pub fn set_ready(&self, ready: bool) {
        let was_ready = self.ready.swap(ready, Ordering::AcqRel);
        if was_ready == ready || !ready || self.manual {
            return;
        }

        tracing::debug!("Became ready; running");
        self.mark_auto_run();
        match &self.default_params {
            Some(params) => self.handle.run(params.clone()),
            None => self.handle.refresh(),
        }
    }

    /// Record new dependencies; a change refreshes automatic controllers.
    ///
    /// Changes recorded before the first automatic run only update the
    /// baseline.
    pub fn set_refresh_deps(&self, deps: &impl Hash) {
        let digest = fingerprint(deps);
        let previous = self.deps.swap(digest, Ordering::AcqRel);
        if previous == digest || self.manual {
            return;
        }
        if !self.has_auto_run() {
            tracing::debug!("Refresh dependencies changed before the first automatic run");
            return;
        }

        tracing::debug!("Refresh dependencies changed");
        match &self.refresh_action {
            Some(action) => action(),
            None => self.handle.refresh(),
        }
    }
}

impl<P, T> Plugin<P, T> for AutoRunPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "auto_run"
    }

    fn on_init(&self) -> Option<PartialState<P, T>> {
        Some(PartialState::new().with_loading(!self.manual && self.is_ready()))
    }

    fn on_before(&self, _params: &P) -> Option<HookOutcome<P, T>> {
        (!self.is_ready()).then(HookOutcome::stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_order_sensitive() {
        assert_eq!(fingerprint(&(1, "a")), fingerprint(&(1, "a")));
        assert_ne!(fingerprint(&(1, "a")), fingerprint(&("a", 1)));
    }

    fn plugin(manual: bool, ready: bool) -> AutoRunPlugin<(), ()> {
        let config = RequestConfig {
            manual,
            ready,
            ..RequestConfig::default()
        };
        AutoRunPlugin::new(ControllerHandle::detached(), &config, None, fingerprint(&()), None)
    }

    #[test]
    fn initial_loading_needs_auto_and_ready() {
        assert_eq!(plugin(false, true).on_init().and_then(|p| p.loading), Some(true));
        assert_eq!(plugin(true, true).on_init().and_then(|p| p.loading), Some(false));
        assert_eq!(plugin(false, false).on_init().and_then(|p| p.loading), Some(false));
    }

    #[test]
    fn vetoes_while_not_ready() {
        let plugin = plugin(true, false);

        assert!(plugin.on_before(&()).is_some_and(|o| o.should_stop()));
        plugin.set_ready(true);
        assert!(plugin.on_before(&()).is_none());
    }

    #[test]
    fn unchanged_deps_do_not_trigger_the_action() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let action: Callback = {
            let calls = std::sync::Arc::clone(&calls);
            std::sync::Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let plugin = AutoRunPlugin::<(), ()>::new(
            ControllerHandle::detached(),
            &RequestConfig::default(),
            None,
            fingerprint(&[1]),
            Some(action),
        );
        plugin.mark_auto_run();

        plugin.set_refresh_deps(&[1]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        plugin.set_refresh_deps(&[2]);
        plugin.set_refresh_deps(&[2]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deps_changes_wait_for_the_first_automatic_run() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let action: Callback = {
            let calls = std::sync::Arc::clone(&calls);
            std::sync::Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let plugin = AutoRunPlugin::<(), ()>::new(
            ControllerHandle::detached(),
            &RequestConfig::default(),
            None,
            fingerprint(&[1]),
            Some(action),
        );

        plugin.set_refresh_deps(&[2]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!plugin.has_auto_run());

        plugin.mark_auto_run();
        plugin.set_refresh_deps(&[2]);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "baseline moved to [2]");
        plugin.set_refresh_deps(&[3]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
