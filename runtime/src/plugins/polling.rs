//! Interval polling that can pause while the page is hidden.

use crate::controller::ControllerHandle;
use crate::metrics::RequestMetrics;
use crate::timer::TimerSlot;
use reqflow_core::config::{RequestConfig, RetryLimit};
use reqflow_core::environment::Environment;
use reqflow_core::error::ServiceError;
use reqflow_core::plugin::{HookOutcome, Plugin};
use reqflow_core::state::PartialState;
use reqflow_core::subscription::Subscription;
use reqflow_core::sync::lock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Re-runs the last request every interval.
///
/// Every settled run schedules the next one. When the timer fires while the
/// page is hidden and `polling_when_hidden` is off, the poll waits for the
/// page to become visible instead. Consecutive failures beyond
/// `polling_error_retry_count` stop polling until the next run.
pub struct PollingPlugin<P, T> {
    handle: ControllerHandle<P, T>,
    environment: Arc<dyn Environment>,
    interval: Mutex<Option<Duration>>,
    when_hidden: bool,
    error_limit: RetryLimit,
    failures: AtomicU32,
    timer: TimerSlot,
    revisible: Arc<Mutex<Option<Subscription>>>,
}

impl<P, T> PollingPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Build the plugin. Inert while the interval is unset.
    #[must_use]
    pub fn new(
        handle: ControllerHandle<P, T>,
        config: &RequestConfig,
        environment: Arc<dyn Environment>,
    ) -> Self {
        Self {
            handle,
            environment,
            interval: Mutex::new(config.polling_interval),
            when_hidden: config.polling_when_hidden,
            error_limit: config.polling_error_retry_count,
            failures: AtomicU32::new(0),
            timer: TimerSlot::new(),
            revisible: Arc::new(Mutex::new(None)),
        }
    }

    fn interval(&self) -> Option<Duration> {
        *lock(&self.interval)
    }

    /// Change the interval. `None` stops polling immediately.
    pub fn set_interval(&self, interval: Option<Duration>) {
        *lock(&self.interval) = interval.filter(|interval| !interval.is_zero());
        if self.interval().is_none() {
            self.stop();
        }
    }

    /// `true` while a poll is scheduled or waiting for visibility.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.timer.is_pending() || lock(&self.revisible).is_some()
    }

    fn stop(&self) {
        self.timer.clear();
        let waiting = lock(&self.revisible).take();
        drop(waiting);
    }

    fn schedule(&self, interval: Duration) {
        let handle = self.handle.clone();
        let environment = Arc::clone(&self.environment);
        let revisible = Arc::clone(&self.revisible);
        let when_hidden = self.when_hidden;

        RequestMetrics::record_poll_scheduled();
        self.timer.schedule(interval, move || {
            if when_hidden || environment.is_visible() {
                handle.refresh();
                return;
            }

            tracing::debug!("Page hidden; polling paused until visible");
            let subscription = environment.subscribe_revisible(Arc::new(move || handle.refresh()));
            let previous = lock(&revisible).replace(subscription);
            drop(previous);
        });
    }
}

impl<P, T> Plugin<P, T> for PollingPlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "polling"
    }

    fn on_before(&self, _params: &P) -> Option<HookOutcome<P, T>> {
        if self.interval().is_some() {
            self.stop();
        }
        None
    }

    fn on_success(&self, _data: &T, _params: &P) -> Option<PartialState<P, T>> {
        if self.interval().is_some() {
            self.failures.store(0, Ordering::Release);
        }
        None
    }

    fn on_error(&self, _error: &ServiceError, _params: &P) -> Option<PartialState<P, T>> {
        if self.interval().is_some() {
            self.failures.fetch_add(1, Ordering::AcqRel);
        }
        None
    }

    fn on_finally(&self, _params: &P, _data: Option<&T>, _error: Option<&ServiceError>) {
        let Some(interval) = self.interval() else {
            return;
        };

        let failures = self.failures.load(Ordering::Acquire);
        if self.error_limit.allows(failures) {
            self.schedule(interval);
        } else {
            tracing::info!(failures, "Polling stopped after repeated failures");
            self.failures.store(0, Ordering::Release);
        }
    }

    fn on_cancel(&self) {
        self.stop();
    }

    fn on_teardown(&self) {
        self.stop();
    }
}
