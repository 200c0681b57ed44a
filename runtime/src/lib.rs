//! # Reqflow Runtime
//!
//! Runtime for the reqflow request orchestration engine.
//!
//! This crate provides the [`RequestController`] that drives one asynchronous
//! "fetch a resource" operation through an ordered pipeline of plugins, and
//! the built-in plugins themselves.
//!
//! ## Core Components
//!
//! - **Controller**: owns the observable state and the generation counter
//!   that discards superseded results
//! - **Plugin registry**: dispatches every lifecycle hook in registration
//!   order and merges the results
//! - **Cache scope**: TTL cache, in-flight request dedup and per-key change
//!   notification, shared by every controller that is handed the same scope
//! - **Policies**: retry, polling, debounce/throttle, loading delay,
//!   refresh on focus, readiness gating
//! - **Signal hub**: an in-process source of visibility, connectivity and
//!   focus signals
//!
//! ## Example
//!
//! ```ignore
//! use reqflow_core::service_fn;
//! use reqflow_runtime::{CacheScope, RequestController, RequestOptions, RetryLimit};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scope = Arc::new(CacheScope::new());
//! let controller = RequestController::new(
//!     service_fn(|id: u32| async move { fetch_user(id).await }),
//!     RequestOptions::new()
//!         .with_default_params(1)
//!         .with_cache_key("user:1")
//!         .with_cache_scope(scope)
//!         .with_stale_time(Duration::from_secs(1))
//!         .with_retry_count(RetryLimit::Limited(3)),
//! );
//! controller.start();
//!
//! let mut changes = controller.subscribe();
//! while changes.changed().await.is_ok() {
//!     let state = changes.borrow_and_update().clone();
//!     render(state);
//! }
//! ```

/// Cache, in-flight dedup and per-key notification
pub mod cache;

/// The request controller and its weak handle
pub mod controller;

/// Prometheus metrics for observability
pub mod metrics;

/// Per-controller options and user callbacks
pub mod options;

/// Built-in plugins
pub mod plugins;

/// Debounce, throttle and cooldown primitives
pub mod rate_limit;

/// Ordered plugin dispatch
pub mod registry;

/// In-process environment signals
pub mod signals;

/// Single-slot cancellable timers
pub mod timer;

pub use cache::{CacheEntry, CacheScope, CacheStorage, ClearScope};
pub use controller::{ControllerHandle, RequestController, RunFuture, Runner};
pub use options::{Callbacks, RequestOptions};
pub use rate_limit::{Cooldown, DebounceSettings, Debouncer};
pub use registry::PluginRegistry;
pub use signals::SignalHub;
pub use timer::TimerSlot;

// Re-export the vocabulary so hosts can depend on the runtime alone
pub use reqflow_core::{
    service_fn, CacheKey, Environment, Expiry, HookOutcome, PartialState, Plugin, RequestConfig,
    RequestState, RetryLimit, RunError, ServiceError, ServiceFn, ServiceFuture, Subscription,
};
