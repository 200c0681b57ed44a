//! Prometheus metrics for request orchestration.
//!
//! Counters cover the request lifecycle and the policies that shape it:
//! - Runs started, failed and superseded
//! - Cache hits (fresh and stale) and in-flight reuse
//! - Scheduled retries and polls
//!
//! Recording is a no-op until a recorder is installed, so the engine can be
//! used without exporting anything.
//!
//! # Example
//!
//! ```rust,no_run
//! use reqflow_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! // serve `text` from the host's own scrape endpoint
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Runs that reached the service.
pub const REQUESTS_TOTAL: &str = "reqflow_requests_total";
/// Runs that settled with an error.
pub const REQUESTS_FAILED_TOTAL: &str = "reqflow_requests_failed_total";
/// Runs whose result was discarded by a newer run or a cancel.
pub const REQUESTS_SUPERSEDED_TOTAL: &str = "reqflow_requests_superseded_total";
/// Service latency of settled runs.
pub const REQUEST_DURATION_SECONDS: &str = "reqflow_request_duration_seconds";
/// Runs answered from a fresh cache entry.
pub const CACHE_HITS_TOTAL: &str = "reqflow_cache_hits_total";
/// Runs that showed a stale cache entry while revalidating.
pub const CACHE_STALE_HITS_TOTAL: &str = "reqflow_cache_stale_hits_total";
/// Runs that joined an identical in-flight request.
pub const DEDUP_REUSE_TOTAL: &str = "reqflow_dedup_reuse_total";
/// Retries scheduled after a failure.
pub const RETRIES_SCHEDULED_TOTAL: &str = "reqflow_retries_scheduled_total";
/// Polls scheduled after a settled run.
pub const POLLS_SCHEDULED_TOTAL: &str = "reqflow_polls_scheduled_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder owner.
///
/// Installs the global recorder and renders the scrape text. reqflow binds
/// no sockets; the host serves [`render`](Self::render) however it likes.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// A recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs a
    /// warning and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this recorder was not the one installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of runs that reached the service");
    describe_counter!(REQUESTS_FAILED_TOTAL, "Total number of runs that settled with an error");
    describe_counter!(
        REQUESTS_SUPERSEDED_TOTAL,
        "Total number of run results discarded by a newer run or a cancel"
    );
    describe_histogram!(REQUEST_DURATION_SECONDS, "Time from run start to settlement");

    describe_counter!(CACHE_HITS_TOTAL, "Total number of runs answered from a fresh cache entry");
    describe_counter!(
        CACHE_STALE_HITS_TOTAL,
        "Total number of runs that showed stale data while revalidating"
    );
    describe_counter!(DEDUP_REUSE_TOTAL, "Total number of runs that joined an in-flight request");

    describe_counter!(RETRIES_SCHEDULED_TOTAL, "Total number of retries scheduled");
    describe_counter!(POLLS_SCHEDULED_TOTAL, "Total number of polls scheduled");
}

/// Request lifecycle metrics recorder.
pub struct RequestMetrics;

impl RequestMetrics {
    /// Record a run reaching the service.
    pub fn record_start() {
        counter!(REQUESTS_TOTAL).increment(1);
    }

    /// Record how long a settled run took.
    pub fn record_duration(duration: Duration) {
        histogram!(REQUEST_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Record a failed run.
    pub fn record_failure() {
        counter!(REQUESTS_FAILED_TOTAL).increment(1);
    }

    /// Record a discarded result.
    pub fn record_superseded() {
        counter!(REQUESTS_SUPERSEDED_TOTAL).increment(1);
    }

    /// Record a fresh cache hit.
    pub fn record_cache_hit() {
        counter!(CACHE_HITS_TOTAL).increment(1);
    }

    /// Record a stale cache hit.
    pub fn record_stale_hit() {
        counter!(CACHE_STALE_HITS_TOTAL).increment(1);
    }

    /// Record a run joining an in-flight request.
    pub fn record_dedup_reuse() {
        counter!(DEDUP_REUSE_TOTAL).increment(1);
    }

    /// Record a scheduled retry.
    pub fn record_retry_scheduled() {
        counter!(RETRIES_SCHEDULED_TOTAL).increment(1);
    }

    /// Record a scheduled poll.
    pub fn record_poll_scheduled() {
        counter!(POLLS_SCHEDULED_TOTAL).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recorder_creation() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.handle().is_none());
        assert!(recorder.render().is_none());
    }

    #[test]
    fn test_metrics_recorder_install() {
        let mut recorder = MetricsRecorder::default();

        let result = recorder.install();
        assert!(result.is_ok());
    }

    #[test]
    fn test_request_metrics_render() {
        let mut recorder = MetricsRecorder::new();
        recorder.install().unwrap();

        RequestMetrics::record_start();
        RequestMetrics::record_failure();
        RequestMetrics::record_duration(Duration::from_millis(40));
        RequestMetrics::record_cache_hit();
        RequestMetrics::record_retry_scheduled();

        // Another test may own the recorder; recording still succeeds.
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains(REQUESTS_TOTAL));
            assert!(rendered.contains(REQUESTS_FAILED_TOTAL));
            assert!(rendered.contains(CACHE_HITS_TOTAL));
            assert!(rendered.contains(RETRIES_SCHEDULED_TOTAL));
        }
    }

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        RequestMetrics::record_superseded();
        RequestMetrics::record_stale_hit();
        RequestMetrics::record_dedup_reuse();
        RequestMetrics::record_poll_scheduled();
    }
}
