//! The request controller.
//!
//! A [`RequestController`] drives one logical "fetch a resource" operation.
//! It owns the observable [`RequestState`], the generation counter that
//! decides which settlement may touch that state, and the ordered plugin
//! registry through which every policy (cache, retry, polling, ...) acts.
//!
//! # Generations
//!
//! Every run and every cancel bumps the generation. A run captures the
//! generation it started under and, when its service call settles, applies
//! the result only if the generation is still the same. Superseded results
//! are dropped and the caller gets [`RunError::Cancelled`]. The service call
//! itself is never aborted.
//!
//! # Run chain
//!
//! `run_async` is not a method that plugins patch at runtime. The
//! controller builds an explicit chain once, at construction:
//!
//! ```text
//! throttle( debounce( execute ) )
//! ```
//!
//! Each layer passes straight through while its limiter is unset, so
//! enabling or disabling debounce/throttle later never reorders the chain.
//!
//! # Example
//!
//! ```ignore
//! use reqflow_core::service_fn;
//! use reqflow_runtime::{RequestController, RequestOptions};
//!
//! let controller = RequestController::new(
//!     service_fn(|id: u32| async move { Ok::<_, anyhow::Error>(format!("user-{id}")) }),
//!     RequestOptions::new().with_manual(true),
//! );
//!
//! let user = controller.run_async(7).await?;
//! assert_eq!(controller.state().data.as_deref(), Some("user-7"));
//! ```

use crate::cache::CacheScope;
use crate::metrics::RequestMetrics;
use crate::options::{Callbacks, RequestOptions};
use crate::plugins::auto_run::AutoRunPlugin;
use crate::plugins::cache::CachePlugin;
use crate::plugins::focus::FocusPlugin;
use crate::plugins::loading_delay::LoadingDelayPlugin;
use crate::plugins::polling::PollingPlugin;
use crate::plugins::rate_limit::{debounce_settings, throttle_settings, RateLimitPlugin};
use crate::plugins::retry::{RetryPlugin, RetryPolicy};
use crate::rate_limit::DebounceSettings;
use crate::registry::PluginRegistry;
use futures::future::{self, BoxFuture, FutureExt};
use reqflow_core::error::{RunError, ServiceError};
use reqflow_core::plugin::ServiceFn;
use reqflow_core::state::{PartialState, RequestState};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// The pending outcome of one run.
pub type RunFuture<T> = BoxFuture<'static, Result<T, RunError>>;

/// One layer of the run chain.
pub type Runner<P, T> = Arc<dyn Fn(P) -> RunFuture<T> + Send + Sync>;

pub(crate) fn settled<T: Send + 'static>(outcome: Result<T, RunError>) -> RunFuture<T> {
    future::ready(outcome).boxed()
}

struct ControllerInner<P, T> {
    service: ServiceFn<P, T>,
    state: watch::Sender<RequestState<P, T>>,
    generation: AtomicU64,
    /// Generation of the run waiting on the service; 0 when none is.
    awaiting: AtomicU64,
    registry: PluginRegistry<P, T>,
    callbacks: Callbacks<P, T>,
    runner: Runner<P, T>,
    default_params: Option<P>,
    manual: bool,
    auto_run: Arc<AutoRunPlugin<P, T>>,
    polling: Arc<PollingPlugin<P, T>>,
    debounce: Arc<RateLimitPlugin<P, T>>,
    throttle: Arc<RateLimitPlugin<P, T>>,
    torn_down: AtomicBool,
}

impl<P, T> ControllerInner<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn set_state(&self, patch: PartialState<P, T>) {
        if patch.is_empty() {
            return;
        }
        self.state.send_modify(|state| state.apply(patch));
    }

    fn snapshot(&self) -> RequestState<P, T> {
        self.state.borrow().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Apply `patch` only if `generation` is still current.
    ///
    /// The generation is compared under the state channel's write lock,
    /// which `cancel` also publishes through.
    fn commit_if_current(&self, generation: u64, patch: PartialState<P, T>) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            state.apply(patch);
            true
        })
    }

    /// The base of the run chain.
    ///
    /// Everything up to the service invocation happens before this returns.
    /// The rest is spawned, so the run settles even if the returned future
    /// is dropped.
    fn execute(self: &Arc<Self>, params: P) -> RunFuture<T> {
        if self.torn_down.load(Ordering::Acquire) {
            return settled(Err(RunError::Cancelled));
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let outcome = self.registry.before(&params);
        if outcome.should_stop() {
            tracing::debug!(generation, "Run vetoed before start");
            return settled(Err(RunError::NotReady));
        }

        let return_now = outcome.should_return();
        let early_data = return_now.then(|| outcome.state.data().cloned()).flatten();
        self.set_state(
            PartialState::new()
                .with_loading(true)
                .with_params(params.clone())
                .merge(outcome.state),
        );
        if return_now {
            tracing::debug!(generation, "Run answered without calling the service");
            return settled(early_data.ok_or(RunError::NotReady));
        }

        if let Some(on_before) = &self.callbacks.on_before {
            on_before(&params);
        }

        RequestMetrics::record_start();
        tracing::debug!(generation, "Request started");
        let request = self
            .registry
            .request(&self.service, &params)
            .unwrap_or_else(|| (self.service)(params.clone()));
        self.awaiting.store(generation, Ordering::Release);

        let inner = Arc::clone(self);
        let started = Instant::now();
        let task = tokio::spawn(async move {
            let result = request.await;
            RequestMetrics::record_duration(started.elapsed());
            inner.settle(generation, &params, result)
        });

        async move {
            task.await.unwrap_or_else(|join_error| {
                if join_error.is_panic() {
                    Err(RunError::Service(ServiceError::msg("service panicked")))
                } else {
                    Err(RunError::Cancelled)
                }
            })
        }
        .boxed()
    }

    fn settle(
        &self,
        generation: u64,
        params: &P,
        result: Result<T, ServiceError>,
    ) -> Result<T, RunError> {
        let outcome = match &result {
            Ok(data) => PartialState::new()
                .with_data(data.clone())
                .without_error()
                .with_loading(false),
            Err(error) => PartialState::new()
                .with_error(error.clone())
                .with_loading(false),
        };
        if !self.commit_if_current(generation, outcome) {
            RequestMetrics::record_superseded();
            tracing::debug!(generation, "Superseded result discarded");
            return Err(RunError::Cancelled);
        }
        let _ = self
            .awaiting
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire);

        match result {
            Ok(data) => {
                if let Some(on_success) = &self.callbacks.on_success {
                    on_success(&data, params);
                }
                self.set_state(self.registry.success(&data, params));
                if let Some(on_finally) = &self.callbacks.on_finally {
                    on_finally(params, Some(&data), None);
                }
                if self.is_current(generation) {
                    self.registry.finally(params, Some(&data), None);
                }
                Ok(data)
            },
            Err(error) => {
                RequestMetrics::record_failure();
                if let Some(on_error) = &self.callbacks.on_error {
                    on_error(&error, params);
                }
                self.set_state(self.registry.error(&error, params));
                if let Some(on_finally) = &self.callbacks.on_finally {
                    on_finally(params, None, Some(&error));
                }
                if self.is_current(generation) {
                    self.registry.finally(params, None, Some(&error));
                }
                Err(RunError::Service(error))
            },
        }
    }

    fn run_async(&self, params: P) -> RunFuture<T> {
        (self.runner)(params)
    }

    fn run(&self, params: P) {
        let future = self.run_async(params);
        let log_failures = self.callbacks.on_error.is_none();
        tokio::spawn(async move {
            match future.await {
                Ok(_) => {},
                Err(RunError::Service(error)) if log_failures => {
                    tracing::error!(error = %error, "Request failed");
                },
                Err(error) => {
                    tracing::debug!(error = %error, "Run finished without data");
                },
            }
        });
    }

    fn refresh_params(&self) -> Option<P> {
        self.state
            .borrow()
            .params
            .clone()
            .or_else(|| self.default_params.clone())
    }

    fn refresh_async(&self) -> RunFuture<T> {
        match self.refresh_params() {
            Some(params) => self.run_async(params),
            None => settled(Err(RunError::MissingParams)),
        }
    }

    fn refresh(&self) {
        match self.refresh_params() {
            Some(params) => self.run(params),
            None => tracing::debug!("Refresh skipped: no params recorded"),
        }
    }

    fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.awaiting.store(0, Ordering::Release);
        tracing::debug!(generation, "Request cancelled");
        self.set_state(PartialState::new().with_loading(false));
        self.registry.cancel();
    }

    fn mutate(&self, data: T) {
        self.registry.mutate(&data);
        self.set_state(PartialState::new().with_data(data));
    }
}

/// Drives one logical request through the plugin lifecycle.
///
/// Cloning is cheap and every clone controls the same request.
pub struct RequestController<P, T> {
    inner: Arc<ControllerInner<P, T>>,
}

impl<P, T> Clone for RequestController<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, T> RequestController<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Build a controller.
    ///
    /// Plugins are registered in a fixed order (debounce, loading delay,
    /// polling, refresh on focus, throttle, auto-run, cache, retry, then any
    /// extra plugins) and their `on_init` results seed the initial state.
    /// Nothing runs until [`start`](Self::start) or an explicit run.
    ///
    /// Must be called from within a Tokio runtime when the options enable
    /// caching with a finite cache time or refresh on focus.
    #[must_use]
    pub fn new(service: ServiceFn<P, T>, options: RequestOptions<P, T>) -> Self {
        let RequestOptions {
            config,
            default_params,
            refresh_deps,
            refresh_deps_action,
            cache_scope,
            cache_storage,
            environment,
            callbacks,
            plugins: extra_plugins,
        } = options;

        for warning in config.warnings() {
            tracing::warn!(%warning, "Questionable request configuration");
        }

        let inner = Arc::new_cyclic(|weak: &Weak<ControllerInner<P, T>>| {
            let handle = ControllerHandle {
                inner: Weak::clone(weak),
            };

            let debounce = Arc::new(RateLimitPlugin::debounce(debounce_settings(&config)));
            let throttle = Arc::new(RateLimitPlugin::throttle(throttle_settings(&config)));
            let polling = Arc::new(PollingPlugin::new(
                handle.clone(),
                &config,
                Arc::clone(&environment),
            ));
            let auto_run = Arc::new(AutoRunPlugin::new(
                handle.clone(),
                &config,
                default_params.clone(),
                refresh_deps,
                refresh_deps_action,
            ));

            let mut registry = PluginRegistry::new();
            registry.register(debounce.clone());
            if let Some(delay) = config.loading_delay {
                registry.register(Arc::new(LoadingDelayPlugin::new(handle.clone(), delay)));
            }
            registry.register(polling.clone());
            if config.refresh_on_window_focus {
                registry.register(Arc::new(FocusPlugin::new(
                    handle.clone(),
                    environment.as_ref(),
                    config.focus_timespan,
                )));
            }
            registry.register(throttle.clone());
            registry.register(auto_run.clone());
            if let Some(key) = &config.cache_key {
                let scope = cache_scope.unwrap_or_else(|| {
                    tracing::warn!(
                        %key,
                        "Cache key set without a shared cache scope; cached data stays private to this controller"
                    );
                    Arc::new(CacheScope::new())
                });
                registry.register(Arc::new(CachePlugin::new(
                    handle.clone(),
                    key.clone(),
                    &config,
                    scope,
                    cache_storage,
                )));
            }
            if let Some(limit) = config.retry_count.filter(|limit| !limit.is_disabled()) {
                registry.register(Arc::new(RetryPlugin::new(
                    handle.clone(),
                    RetryPolicy::new(limit, config.retry_interval),
                )));
            }
            for factory in extra_plugins {
                registry.register(factory(handle.clone()));
            }

            let mut initial = RequestState::default();
            initial.apply(registry.init());
            let (state, _) = watch::channel(initial);

            let base: Runner<P, T> = {
                let weak = Weak::clone(weak);
                Arc::new(move |params| match weak.upgrade() {
                    Some(inner) => inner.execute(params),
                    None => settled(Err(RunError::Cancelled)),
                })
            };
            let runner = throttle.wrap(debounce.wrap(base));

            ControllerInner {
                service,
                state,
                generation: AtomicU64::new(0),
                awaiting: AtomicU64::new(0),
                registry,
                callbacks,
                runner,
                default_params,
                manual: config.manual,
                auto_run,
                polling,
                debounce,
                throttle,
                torn_down: AtomicBool::new(false),
            }
        });

        tracing::debug!(plugins = ?inner.registry, "Request controller created");
        Self { inner }
    }

    /// Perform the initial automatic run.
    ///
    /// Does nothing for manual controllers. Uses the params seeded from the
    /// cache, falling back to the default params.
    pub fn start(&self) {
        if self.inner.manual {
            return;
        }
        self.inner.auto_run.mark_auto_run();
        match self.inner.refresh_params() {
            Some(params) => self.inner.run(params),
            None => tracing::warn!("Automatic run skipped: no default params configured"),
        }
    }

    /// Run the request and wait for its outcome.
    ///
    /// Plugin `on_before` hooks, the loading state update and the service
    /// invocation happen before this returns; the future only waits.
    ///
    /// # Errors
    ///
    /// - [`RunError::Service`] when the service fails.
    /// - [`RunError::Cancelled`] when a newer run or a cancel supersedes this
    ///   one, or a debounce/throttle window drops it.
    /// - [`RunError::NotReady`] when a plugin vetoes the run.
    pub fn run_async(&self, params: P) -> RunFuture<T> {
        self.inner.run_async(params)
    }

    /// Fire-and-forget [`run_async`](Self::run_async).
    ///
    /// Service failures are logged unless an `on_error` callback is set.
    pub fn run(&self, params: P) {
        self.inner.run(params);
    }

    /// Re-run with the last params.
    pub fn refresh(&self) {
        self.inner.refresh();
    }

    /// Re-run with the last params and wait.
    ///
    /// # Errors
    ///
    /// As [`run_async`](Self::run_async), plus [`RunError::MissingParams`]
    /// when no params were ever recorded and none are configured.
    pub fn refresh_async(&self) -> RunFuture<T> {
        self.inner.refresh_async()
    }

    /// Invalidate the outstanding run and stop every policy timer.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Replace the data directly. `loading` and `error` are untouched.
    pub fn mutate(&self, data: T) {
        self.inner.mutate(data);
    }

    /// Replace the data with a function of the current data.
    pub fn mutate_with(&self, update: impl FnOnce(Option<&T>) -> T) {
        let current = self.inner.state.borrow().data.clone();
        self.inner.mutate(update(current.as_ref()));
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RequestState<P, T> {
        self.inner.snapshot()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestState<P, T>> {
        self.inner.state.subscribe()
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// A weak handle for plugins and background tasks.
    #[must_use]
    pub fn handle(&self) -> ControllerHandle<P, T> {
        ControllerHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Names of the registered plugins, in dispatch order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.inner.registry.names()
    }

    /// Change readiness. Becoming ready triggers an automatic run.
    pub fn set_ready(&self, ready: bool) {
        self.inner.auto_run.set_ready(ready);
    }

    /// Replace the refresh dependencies. A change triggers a refresh.
    pub fn set_refresh_deps(&self, deps: &impl Hash) {
        self.inner.auto_run.set_refresh_deps(deps);
    }

    /// Change the polling interval. `None` stops polling.
    pub fn set_polling_interval(&self, interval: Option<Duration>) {
        self.inner.polling.set_interval(interval);
    }

    /// Change the debounce settings. `None` restores direct runs.
    pub fn set_debounce(&self, settings: Option<DebounceSettings>) {
        self.inner.debounce.reconfigure(settings);
    }

    /// Change the throttle settings. `None` restores direct runs.
    pub fn set_throttle(&self, settings: Option<DebounceSettings>) {
        self.inner.throttle.reconfigure(settings);
    }

    /// Cancel, detach every subscription and stop every timer.
    ///
    /// Later runs resolve to [`RunError::Cancelled`]. Calling this more
    /// than once is harmless.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel();
        self.inner.registry.teardown();
        tracing::debug!("Request controller torn down");
    }

    /// `true` after [`teardown`](Self::teardown).
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::Acquire)
    }
}

impl<P, T> fmt::Debug for RequestController<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestController")
            .field("generation", &self.inner.generation.load(Ordering::Acquire))
            .field("plugins", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

/// A non-owning reference to a controller.
///
/// Plugins and their timers hold this instead of the controller so that
/// dropping the controller releases everything. Every method is a no-op
/// once the controller is gone.
pub struct ControllerHandle<P, T> {
    inner: Weak<ControllerInner<P, T>>,
}

impl<P, T> Clone for ControllerHandle<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<P, T> ControllerHandle<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// A handle that never had a controller, for plugin unit tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    /// The controller, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<RequestController<P, T>> {
        self.inner.upgrade().map(|inner| RequestController { inner })
    }

    /// See [`RequestController::run`].
    pub fn run(&self, params: P) {
        if let Some(inner) = self.inner.upgrade() {
            inner.run(params);
        }
    }

    /// See [`RequestController::refresh`].
    pub fn refresh(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.refresh();
        }
    }

    /// Merge a partial update into the state.
    pub fn set_state(&self, patch: PartialState<P, T>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_state(patch);
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> Option<RequestState<P, T>> {
        self.inner.upgrade().map(|inner| inner.snapshot())
    }

    /// Params of the most recent run.
    #[must_use]
    pub fn params(&self) -> Option<P> {
        let inner = self.inner.upgrade()?;
        inner.state.borrow().params.clone()
    }

    /// Current generation, or 0 once the controller is gone.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner
            .upgrade()
            .map_or(0, |inner| inner.generation.load(Ordering::Acquire))
    }

    /// `true` while the run started under `generation` waits on the service.
    #[must_use]
    pub fn is_in_flight(&self, generation: u64) -> bool {
        generation != 0
            && self
                .inner
                .upgrade()
                .is_some_and(|inner| inner.awaiting.load(Ordering::Acquire) == generation)
    }
}

impl<P, T> fmt::Debug for ControllerHandle<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqflow_core::plugin::service_fn;
    use tokio::time::sleep;

    fn echo(latency: Duration) -> ServiceFn<u32, String> {
        service_fn(move |id: u32| async move {
            sleep(latency).await;
            Ok::<_, ServiceError>(format!("item-{id}"))
        })
    }

    fn manual() -> RequestOptions<u32, String> {
        RequestOptions::new().with_manual(true)
    }

    #[tokio::test(start_paused = true)]
    async fn run_async_writes_loading_then_data() {
        let controller = RequestController::new(echo(Duration::from_millis(10)), manual());
        assert!(!controller.state().loading);

        let pending = controller.run_async(3);
        let during = controller.state();
        assert!(during.loading);
        assert_eq!(during.params, Some(3));

        assert_eq!(pending.await.unwrap(), "item-3");
        let after = controller.state();
        assert!(!after.loading);
        assert_eq!(after.data.as_deref(), Some("item-3"));
        assert!(after.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_run_supersedes_older_one() {
        let controller = RequestController::new(echo(Duration::from_millis(50)), manual());

        let first = controller.run_async(1);
        sleep(Duration::from_millis(10)).await;
        let second = controller.run_async(2);

        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(second.await.unwrap(), "item-2");
        assert_eq!(controller.state().data.as_deref(), Some("item-2"));
        assert_eq!(controller.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_recorded_and_returned() {
        let service = service_fn(|_: u32| async { Err::<String, _>(ServiceError::msg("offline")) });
        let controller = RequestController::new(service, manual());

        let error = controller.run_async(1).await.unwrap_err();
        assert_eq!(error.service_error().unwrap().to_string(), "offline");

        let state = controller.state();
        assert!(!state.loading);
        assert_eq!(state.error.unwrap().to_string(), "offline");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_without_params_reports_missing_params() {
        let controller = RequestController::new(echo(Duration::ZERO), manual());
        assert!(matches!(
            controller.refresh_async().await,
            Err(RunError::MissingParams)
        ));

        let controller = RequestController::new(
            echo(Duration::ZERO),
            manual().with_default_params(9),
        );
        assert_eq!(controller.refresh_async().await.unwrap(), "item-9");
    }

    #[tokio::test(start_paused = true)]
    async fn mutate_leaves_loading_and_error_alone() {
        let controller = RequestController::new(echo(Duration::from_millis(10)), manual());
        let pending = controller.run_async(1);

        controller.mutate_with(|old| format!("{}-edited", old.map_or("none", String::as_str)));
        let state = controller.state();
        assert!(state.loading);
        assert_eq!(state.data.as_deref(), Some("none-edited"));

        pending.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_automatic_controllers_with_default_params() {
        let controller = RequestController::new(
            echo(Duration::from_millis(5)),
            RequestOptions::new().with_default_params(4),
        );
        assert!(controller.state().loading, "auto controllers start loading");

        controller.start();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.state().data.as_deref(), Some("item-4"));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_rejects_later_runs() {
        let controller = RequestController::new(echo(Duration::ZERO), manual());
        controller.teardown();
        controller.teardown();

        assert!(controller.is_torn_down());
        assert!(controller.run_async(1).await.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn handle_outlives_controller_harmlessly() {
        let controller = RequestController::new(echo(Duration::ZERO), manual());
        let handle = controller.handle();
        drop(controller);

        handle.refresh();
        handle.set_state(PartialState::new().with_loading(true));
        assert!(handle.state().is_none());
        assert_eq!(handle.generation(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn results_never_land_after_a_cross_thread_cancel() {
        for id in 0..500 {
            let service = service_fn(|id: u32| async move {
                tokio::task::yield_now().await;
                Ok::<_, ServiceError>(format!("item-{id}"))
            });
            let controller = RequestController::new(service, manual());

            let pending = controller.run_async(id);
            let canceller = {
                let controller = controller.clone();
                tokio::spawn(async move {
                    controller.cancel();
                    controller.state().data
                })
            };

            let seen_after_cancel = canceller.await.unwrap();
            let result = pending.await;
            let settled = controller.state();

            assert_eq!(settled.data, seen_after_cancel, "run {id} wrote after cancel");
            assert_eq!(result.is_ok(), settled.data.is_some());
            assert!(!settled.loading);
        }
    }
}
