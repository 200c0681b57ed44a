//! Refresh when the window regains focus.

use crate::controller::ControllerHandle;
use crate::rate_limit::Cooldown;
use reqflow_core::environment::Environment;
use reqflow_core::plugin::Plugin;
use reqflow_core::subscription::Subscription;
use std::sync::Arc;
use std::time::Duration;

/// Refreshes on the focus signal, at most once per timespan.
pub struct FocusPlugin {
    subscription: Subscription,
}

impl FocusPlugin {
    /// Subscribe to `environment`'s focus signal.
    ///
    /// The signal may arrive on any thread, but it must be one with a Tokio
    /// runtime.
    #[must_use]
    pub fn new<P, T>(
        handle: ControllerHandle<P, T>,
        environment: &dyn Environment,
        timespan: Duration,
    ) -> Self
    where
        P: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let cooldown = Cooldown::new(timespan);
        let subscription = environment.subscribe_focus(Arc::new(move || {
            if cooldown.try_acquire() {
                tracing::debug!("Window focused; refreshing");
                handle.refresh();
            }
        }));
        Self { subscription }
    }
}

impl<P, T> Plugin<P, T> for FocusPlugin {
    fn name(&self) -> &'static str {
        "refresh_on_focus"
    }

    fn on_teardown(&self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerHandle;
    use crate::signals::SignalHub;

    #[tokio::test(start_paused = true)]
    async fn teardown_detaches_from_the_focus_signal() {
        let hub = SignalHub::new();
        let plugin = FocusPlugin::new(
            ControllerHandle::<(), ()>::detached(),
            &hub,
            Duration::from_secs(5),
        );
        assert!(plugin.subscription.is_active());

        Plugin::<(), ()>::on_teardown(&plugin);
        assert!(!plugin.subscription.is_active());

        hub.notify_focus();
    }
}
