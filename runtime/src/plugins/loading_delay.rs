//! Deferred loading flag.
//!
//! Every run starts with `loading = false`; a timer flips it to `true` after
//! the delay if the same run is still waiting on the service. Fast
//! responses therefore never show a loading state.

use crate::controller::ControllerHandle;
use crate::timer::TimerSlot;
use reqflow_core::error::ServiceError;
use reqflow_core::plugin::{HookOutcome, Plugin};
use reqflow_core::state::PartialState;
use std::time::Duration;

/// Suppresses loading flicker.
pub struct LoadingDelayPlugin<P, T> {
    handle: ControllerHandle<P, T>,
    delay: Duration,
    timer: TimerSlot,
}

impl<P, T> LoadingDelayPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Build the plugin.
    #[must_use]
    pub const fn new(handle: ControllerHandle<P, T>, delay: Duration) -> Self {
        Self {
            handle,
            delay,
            timer: TimerSlot::new(),
        }
    }
}

impl<P, T> Plugin<P, T> for LoadingDelayPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "loading_delay"
    }

    fn on_before(&self, _params: &P) -> Option<HookOutcome<P, T>> {
        let generation = self.handle.generation();
        let handle = self.handle.clone();
        self.timer.schedule(self.delay, move || {
            if handle.is_in_flight(generation) {
                handle.set_state(PartialState::new().with_loading(true));
            }
        });

        Some(HookOutcome::state(PartialState::new().with_loading(false)))
    }

    fn on_finally(&self, _params: &P, _data: Option<&T>, _error: Option<&ServiceError>) {
        self.timer.clear();
    }

    fn on_cancel(&self) {
        self.timer.clear();
    }

    fn on_teardown(&self) {
        self.timer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn runs_start_without_loading() {
        let plugin = LoadingDelayPlugin::<(), ()>::new(
            ControllerHandle::detached(),
            Duration::from_millis(300),
        );

        let outcome = plugin.on_before(&()).unwrap_or_default();
        assert_eq!(outcome.state.loading, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn settling_clears_the_pending_flip() {
        let plugin = LoadingDelayPlugin::<(), ()>::new(
            ControllerHandle::detached(),
            Duration::from_millis(300),
        );

        plugin.on_before(&());
        assert!(plugin.timer.is_pending());

        plugin.on_finally(&(), Some(&()), None);
        assert!(!plugin.timer.is_pending());
    }
}
