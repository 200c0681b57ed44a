//! Automatic retry with exponential backoff.
//!
//! A failed run schedules a refresh. The delay is the configured interval,
//! or `min(1000 * 2^n, 30000)` ms for the `n`-th consecutive failure. After
//! the limit is reached the counter resets and the next failure starts a
//! fresh series only when a run not issued by this plugin happens first.
//!
//! # Example
//!
//! ```
//! use reqflow_core::RetryLimit;
//! use reqflow_runtime::plugins::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(RetryLimit::Limited(3), None);
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
//! assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
//! ```

use crate::controller::ControllerHandle;
use crate::metrics::RequestMetrics;
use crate::timer::TimerSlot;
use reqflow_core::config::RetryLimit;
use reqflow_core::error::ServiceError;
use reqflow_core::plugin::{HookOutcome, Plugin};
use reqflow_core::state::PartialState;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Base of the exponential backoff.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Cap of the exponential backoff.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// How many retries, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed per series of failures.
    pub limit: RetryLimit,
    /// Fixed delay; exponential backoff when `None`.
    pub interval: Option<Duration>,
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub const fn new(limit: RetryLimit, interval: Option<Duration>) -> Self {
        Self { limit, interval }
    }

    /// Delay before the retry following the `attempt`-th consecutive failure.
    ///
    /// Uses exponential backoff: delay = 1s * 2^attempt, capped at 30s.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if let Some(interval) = self.interval {
            return interval;
        }

        BACKOFF_BASE
            .checked_mul(2_u32.saturating_pow(attempt))
            .map_or(BACKOFF_CAP, |delay| delay.min(BACKOFF_CAP))
    }
}

/// Re-runs failed requests.
pub struct RetryPlugin<P, T> {
    handle: ControllerHandle<P, T>,
    policy: RetryPolicy,
    failures: AtomicU32,
    triggered_by_retry: Arc<AtomicBool>,
    timer: TimerSlot,
}

impl<P, T> RetryPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Build the plugin.
    #[must_use]
    pub fn new(handle: ControllerHandle<P, T>, policy: RetryPolicy) -> Self {
        Self {
            handle,
            policy,
            failures: AtomicU32::new(0),
            triggered_by_retry: Arc::new(AtomicBool::new(false)),
            timer: TimerSlot::new(),
        }
    }

    /// Consecutive failures in the current series.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }
}

impl<P, T> Plugin<P, T> for RetryPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "retry"
    }

    fn on_before(&self, _params: &P) -> Option<HookOutcome<P, T>> {
        if !self.triggered_by_retry.swap(false, Ordering::AcqRel) {
            self.failures.store(0, Ordering::Release);
        }
        self.timer.clear();
        None
    }

    fn on_success(&self, _data: &T, _params: &P) -> Option<PartialState<P, T>> {
        self.failures.store(0, Ordering::Release);
        None
    }

    fn on_error(&self, error: &ServiceError, _params: &P) -> Option<PartialState<P, T>> {
        let attempt = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);

        if self.policy.limit.allows(attempt) {
            let delay = self.policy.delay_for_attempt(attempt);
            RequestMetrics::record_retry_scheduled();
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "Request failed, retrying..."
            );

            let handle = self.handle.clone();
            let triggered_by_retry = Arc::clone(&self.triggered_by_retry);
            self.timer.schedule(delay, move || {
                triggered_by_retry.store(true, Ordering::Release);
                handle.refresh();
            });
        } else {
            tracing::info!(attempt, error = %error, "Request failed after max retries");
            self.failures.store(0, Ordering::Release);
        }
        None
    }

    fn on_cancel(&self) {
        self.failures.store(0, Ordering::Release);
        self.timer.clear();
    }

    fn on_teardown(&self) {
        self.timer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn backoff_doubles_from_two_seconds() {
        let policy = RetryPolicy::new(RetryLimit::Unlimited, None);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
    }

    #[test]
    fn fixed_interval_overrides_backoff() {
        let policy = RetryPolicy::new(RetryLimit::Limited(3), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_the_limit_resets_the_counter() {
        let plugin = RetryPlugin::<(), ()>::new(
            ControllerHandle::detached(),
            RetryPolicy::new(RetryLimit::Limited(2), None),
        );
        let error = ServiceError::msg("down");

        plugin.on_error(&error, &());
        plugin.on_error(&error, &());
        assert_eq!(plugin.failures(), 2);

        plugin.on_error(&error, &());
        assert_eq!(plugin.failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_runs_start_a_new_series() {
        let plugin = RetryPlugin::<(), ()>::new(
            ControllerHandle::detached(),
            RetryPolicy::new(RetryLimit::Limited(5), None),
        );

        plugin.on_error(&ServiceError::msg("down"), &());
        assert_eq!(plugin.failures(), 1);

        plugin.on_before(&());
        assert_eq!(plugin.failures(), 0);
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(attempt in 0u32..64) {
            let policy = RetryPolicy::new(RetryLimit::Unlimited, None);
            let delay = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);

            prop_assert!(delay <= BACKOFF_CAP);
            prop_assert!(delay <= next);
        }
    }
}
