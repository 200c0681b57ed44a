//! # Reqflow Testing
//!
//! Testing utilities and helpers for the reqflow request engine.
//!
//! This crate provides:
//! - [`MockService`]: a scripted service that counts its calls
//! - [`HookLog`] / [`RecordingPlugin`]: plugins that log every hook they receive
//! - [`StateRecorder`]: waits for a controller's state to reach a condition
//!
//! ## Example
//!
//! ```ignore
//! use reqflow_testing::{MockService, StateRecorder};
//! use std::time::Duration;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_user_fetch() {
//!     let mock = MockService::new(|id: &u32| format!("user-{id}"))
//!         .with_latency(Duration::from_millis(20));
//!     let controller = RequestController::new(mock.service(), options);
//!
//!     controller.run(1);
//!     let mut recorder = StateRecorder::new(controller.subscribe());
//!     let state = recorder.wait_for(|s| s.data.is_some()).await.unwrap();
//!
//!     assert_eq!(mock.calls(), 1);
//! }
//! ```

/// Scripted services
pub mod mocks;

/// Hook-logging plugins
pub mod plugins;

/// State observation helpers
pub mod recorder;

pub use mocks::MockService;
pub use plugins::{HookCall, HookLog, RecordingPlugin};
pub use recorder::{RecorderError, StateRecorder};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
