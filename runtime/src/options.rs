//! Everything a [`RequestController`](crate::controller::RequestController)
//! is built from.
//!
//! [`RequestOptions`] wraps the plain-data [`RequestConfig`] and adds the
//! parts that cannot be serialized: default params, user callbacks, the
//! shared cache scope, custom cache storage, the signal environment and any
//! extra plugins.
//!
//! # Example
//!
//! ```ignore
//! use reqflow_runtime::{CacheScope, RequestOptions};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scope = Arc::new(CacheScope::new());
//! let options = RequestOptions::<u32, String>::new()
//!     .with_default_params(1)
//!     .with_cache_key("user")
//!     .with_cache_scope(Arc::clone(&scope))
//!     .with_retry_count(3)
//!     .with_polling_interval(Duration::from_secs(10));
//! ```

use crate::cache::{CacheScope, CacheStorage};
use crate::controller::ControllerHandle;
use crate::plugins::auto_run::fingerprint;
use reqflow_core::config::{CacheKey, Expiry, RequestConfig, RetryLimit};
use reqflow_core::environment::{Callback, Environment, Headless};
use reqflow_core::error::ServiceError;
use reqflow_core::plugin::Plugin;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Called with the params right before the service is invoked.
pub type BeforeCallback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Called after a current run succeeded.
pub type SuccessCallback<P, T> = Arc<dyn Fn(&T, &P) + Send + Sync>;

/// Called after a current run failed.
pub type ErrorCallback<P> = Arc<dyn Fn(&ServiceError, &P) + Send + Sync>;

/// Called after either outcome.
pub type FinallyCallback<P, T> = Arc<dyn Fn(&P, Option<&T>, Option<&ServiceError>) + Send + Sync>;

/// Builds an extra plugin once the controller exists.
pub type PluginFactory<P, T> =
    Box<dyn FnOnce(ControllerHandle<P, T>) -> Arc<dyn Plugin<P, T>> + Send>;

/// User lifecycle callbacks.
pub struct Callbacks<P, T> {
    /// See [`BeforeCallback`].
    pub on_before: Option<BeforeCallback<P>>,
    /// See [`SuccessCallback`].
    pub on_success: Option<SuccessCallback<P, T>>,
    /// See [`ErrorCallback`].
    pub on_error: Option<ErrorCallback<P>>,
    /// See [`FinallyCallback`].
    pub on_finally: Option<FinallyCallback<P, T>>,
}

impl<P, T> Default for Callbacks<P, T> {
    fn default() -> Self {
        Self {
            on_before: None,
            on_success: None,
            on_error: None,
            on_finally: None,
        }
    }
}

impl<P, T> Clone for Callbacks<P, T> {
    fn clone(&self) -> Self {
        Self {
            on_before: self.on_before.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_finally: self.on_finally.clone(),
        }
    }
}

/// Construction options of one controller.
pub struct RequestOptions<P, T> {
    /// Plain-data options.
    pub config: RequestConfig,
    /// Params for automatic runs.
    pub default_params: Option<P>,
    /// Fingerprint of the initial refresh dependencies.
    pub refresh_deps: u64,
    /// Replaces `refresh()` when the refresh dependencies change.
    pub refresh_deps_action: Option<Callback>,
    /// Stores shared with other controllers.
    pub cache_scope: Option<Arc<CacheScope<P, T>>>,
    /// Replaces the built-in TTL store.
    pub cache_storage: Option<Arc<dyn CacheStorage<P, T>>>,
    /// Visibility, connectivity and focus source.
    pub environment: Arc<dyn Environment>,
    /// User callbacks.
    pub callbacks: Callbacks<P, T>,
    /// Extra plugins, registered after the built-in ones.
    pub plugins: Vec<PluginFactory<P, T>>,
}

impl<P, T> Default for RequestOptions<P, T> {
    fn default() -> Self {
        Self::from_config(RequestConfig::default())
    }
}

impl<P, T> RequestOptions<P, T> {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options around an existing config, such as one parsed from JSON.
    #[must_use]
    pub fn from_config(config: RequestConfig) -> Self {
        Self {
            config,
            default_params: None,
            refresh_deps: fingerprint(&()),
            refresh_deps_action: None,
            cache_scope: None,
            cache_storage: None,
            environment: Arc::new(Headless),
            callbacks: Callbacks::default(),
            plugins: Vec::new(),
        }
    }

    /// Wait for an explicit run.
    #[must_use]
    pub const fn with_manual(mut self, manual: bool) -> Self {
        self.config.manual = manual;
        self
    }

    /// Initial readiness.
    #[must_use]
    pub const fn with_ready(mut self, ready: bool) -> Self {
        self.config.ready = ready;
        self
    }

    /// Params for automatic runs.
    #[must_use]
    pub fn with_default_params(mut self, params: P) -> Self {
        self.default_params = Some(params);
        self
    }

    /// Initial refresh dependencies.
    #[must_use]
    pub fn with_refresh_deps(mut self, deps: &impl Hash) -> Self {
        self.refresh_deps = fingerprint(deps);
        self
    }

    /// Run `action` instead of `refresh()` when the dependencies change.
    #[must_use]
    pub fn with_refresh_deps_action(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.refresh_deps_action = Some(Arc::new(action));
        self
    }

    /// Enable caching under `key`.
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<CacheKey>) -> Self {
        self.config.cache_key = Some(key.into());
        self
    }

    /// How long cache entries live.
    #[must_use]
    pub fn with_cache_time(mut self, cache_time: impl Into<Expiry>) -> Self {
        self.config.cache_time = cache_time.into();
        self
    }

    /// How long cache entries count as fresh.
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: impl Into<Expiry>) -> Self {
        self.config.stale_time = stale_time.into();
        self
    }

    /// Share cached data with every controller using the same scope.
    #[must_use]
    pub fn with_cache_scope(mut self, scope: Arc<CacheScope<P, T>>) -> Self {
        self.cache_scope = Some(scope);
        self
    }

    /// Persist cache entries somewhere else.
    #[must_use]
    pub fn with_cache_storage(mut self, storage: Arc<dyn CacheStorage<P, T>>) -> Self {
        self.cache_storage = Some(storage);
        self
    }

    /// Enable polling.
    #[must_use]
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.config.polling_interval = Some(interval);
        self
    }

    /// Keep polling while hidden.
    #[must_use]
    pub const fn with_polling_when_hidden(mut self, when_hidden: bool) -> Self {
        self.config.polling_when_hidden = when_hidden;
        self
    }

    /// Stop polling after this many consecutive failures.
    #[must_use]
    pub fn with_polling_error_retry_count(mut self, limit: impl Into<RetryLimit>) -> Self {
        self.config.polling_error_retry_count = limit.into();
        self
    }

    /// Enable retries.
    #[must_use]
    pub fn with_retry_count(mut self, limit: impl Into<RetryLimit>) -> Self {
        self.config.retry_count = Some(limit.into());
        self
    }

    /// Fixed retry delay.
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = Some(interval);
        self
    }

    /// Enable trailing-edge debouncing.
    #[must_use]
    pub const fn with_debounce_wait(mut self, wait: Duration) -> Self {
        self.config.debounce_wait = Some(wait);
        self
    }

    /// Debounce edges.
    #[must_use]
    pub const fn with_debounce_edges(mut self, leading: bool, trailing: bool) -> Self {
        self.config.debounce_leading = Some(leading);
        self.config.debounce_trailing = Some(trailing);
        self
    }

    /// Longest a debounced run may be deferred.
    #[must_use]
    pub const fn with_debounce_max_wait(mut self, max_wait: Duration) -> Self {
        self.config.debounce_max_wait = Some(max_wait);
        self
    }

    /// Enable throttling.
    #[must_use]
    pub const fn with_throttle_wait(mut self, wait: Duration) -> Self {
        self.config.throttle_wait = Some(wait);
        self
    }

    /// Throttle edges.
    #[must_use]
    pub const fn with_throttle_edges(mut self, leading: bool, trailing: bool) -> Self {
        self.config.throttle_leading = Some(leading);
        self.config.throttle_trailing = Some(trailing);
        self
    }

    /// Delay the loading flag.
    #[must_use]
    pub const fn with_loading_delay(mut self, delay: Duration) -> Self {
        self.config.loading_delay = Some(delay);
        self
    }

    /// Refresh on focus, at most once per `timespan`.
    #[must_use]
    pub const fn with_refresh_on_window_focus(mut self, timespan: Duration) -> Self {
        self.config.refresh_on_window_focus = true;
        self.config.focus_timespan = timespan;
        self
    }

    /// Signal source.
    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// See [`BeforeCallback`].
    #[must_use]
    pub fn on_before(mut self, callback: impl Fn(&P) + Send + Sync + 'static) -> Self {
        self.callbacks.on_before = Some(Arc::new(callback));
        self
    }

    /// See [`SuccessCallback`].
    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&T, &P) + Send + Sync + 'static) -> Self {
        self.callbacks.on_success = Some(Arc::new(callback));
        self
    }

    /// See [`ErrorCallback`].
    #[must_use]
    pub fn on_error(
        mut self,
        callback: impl Fn(&ServiceError, &P) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_error = Some(Arc::new(callback));
        self
    }

    /// See [`FinallyCallback`].
    #[must_use]
    pub fn on_finally(
        mut self,
        callback: impl Fn(&P, Option<&T>, Option<&ServiceError>) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_finally = Some(Arc::new(callback));
        self
    }

    /// Register an extra plugin after the built-in ones.
    #[must_use]
    pub fn with_plugin(
        mut self,
        factory: impl FnOnce(ControllerHandle<P, T>) -> Arc<dyn Plugin<P, T>> + Send + 'static,
    ) -> Self {
        self.plugins.push(Box::new(factory));
        self
    }
}

impl<P, T> fmt::Debug for RequestOptions<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("config", &self.config)
            .field("has_default_params", &self.default_params.is_some())
            .field("shared_cache", &self.cache_scope.is_some())
            .field("custom_storage", &self.cache_storage.is_some())
            .field("plugins", &self.plugins.len())
            .finish_non_exhaustive()
    }
}
