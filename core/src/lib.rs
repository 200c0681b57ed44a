//! # Reqflow Core
//!
//! Core traits and types for the reqflow request orchestration engine.
//!
//! This crate is framework-free vocabulary: it describes one asynchronous
//! "fetch a resource" operation and the policies layered on top of it, but
//! executes nothing. The runtime crate drives it.
//!
//! ## Core Concepts
//!
//! - **Service**: `Fn(P) -> Future<Output = Result<T, ServiceError>>`
//! - **State**: `{ loading, params, data, error }`, changed only by merging
//!   partial updates
//! - **Plugin**: a table of optional lifecycle hooks (`on_before`,
//!   `on_request`, `on_success`, ...) whose results are merged in order
//! - **Config**: plain-data options, loadable from JSON
//! - **Environment**: visibility, connectivity and focus signals
//!
//! ## Example
//!
//! ```ignore
//! use reqflow_core::plugin::{HookOutcome, Plugin};
//!
//! struct Gate { open: bool }
//!
//! impl Plugin<u32, String> for Gate {
//!     fn on_before(&self, _params: &u32) -> Option<HookOutcome<u32, String>> {
//!         (!self.open).then(HookOutcome::stop)
//!     }
//! }
//! ```

/// Plain-data request configuration
pub mod config;

/// External visibility/connectivity/focus signals
pub mod environment;

/// Service and run errors
pub mod error;

/// Service contract and the plugin hook table
pub mod plugin;

/// Request state and partial updates
pub mod state;

/// Listener registration with RAII teardown
pub mod subscription;

/// Poison-tolerant locking
pub mod sync;

// Re-export commonly used types
pub use config::{CacheKey, ConfigWarning, Expiry, RequestConfig, RetryLimit};
pub use environment::{Callback, Environment, Headless};
pub use error::{RunError, ServiceError};
pub use plugin::{service_fn, HookOutcome, Plugin, ServiceFn, ServiceFuture};
pub use state::{PartialState, RequestState};
pub use subscription::{Listener, ListenerSet, Subscription};
