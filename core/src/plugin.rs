//! The service contract and the plugin hook table.
//!
//! A request controller knows nothing about caching, retrying or polling.
//! Every such policy is a [`Plugin`]: a set of optional hooks the controller
//! calls at fixed points of one request's lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! run_async(params)
//!   │
//!   ├─► on_before(params)        ─► merged HookOutcome (stop_now / return_now / state)
//!   ├─► on_request(service, p)   ─► optional substitute ServiceFuture (dedup)
//!   │        ... await ...
//!   ├─► on_success(data, p)  or  on_error(error, p)
//!   └─► on_finally(p, data, error)   (only while still the current generation)
//!
//! cancel()          ─► on_cancel()
//! mutate(data)      ─► on_mutate(data)
//! teardown()        ─► on_teardown()
//! ```
//!
//! Plugins never call each other. The only coupling is the merge of the
//! values they return, in registration order.

use crate::error::ServiceError;
use crate::state::PartialState;
use futures::future::BoxFuture;
use futures::{FutureExt, TryFutureExt};
use std::future::Future;
use std::sync::Arc;

/// The pending result of one service invocation.
pub type ServiceFuture<T> = BoxFuture<'static, Result<T, ServiceError>>;

/// A service: takes the params tuple and returns the pending result.
pub type ServiceFn<P, T> = Arc<dyn Fn(P) -> ServiceFuture<T> + Send + Sync>;

/// Box an async function into a [`ServiceFn`].
///
/// # Example
///
/// ```
/// use reqflow_core::plugin::service_fn;
///
/// let service = service_fn(|id: u32| async move {
///     Ok::<_, anyhow::Error>(format!("user-{id}"))
/// });
/// # let _ = service;
/// ```
pub fn service_fn<P, T, E, F, Fut>(f: F) -> ServiceFn<P, T>
where
    P: 'static,
    T: 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<ServiceError> + 'static,
{
    Arc::new(move |params| f(params).map_err(Into::into).boxed())
}

/// What an `on_before` hook wants to happen.
#[derive(Debug, Clone)]
pub struct HookOutcome<P, T> {
    /// State merged over `loading = true, params` before the request starts.
    pub state: PartialState<P, T>,
    /// Veto the request entirely.
    pub stop_now: Option<bool>,
    /// Resolve immediately with `state.data` without calling the service.
    pub return_now: Option<bool>,
}

impl<P, T> Default for HookOutcome<P, T> {
    fn default() -> Self {
        Self {
            state: PartialState::default(),
            stop_now: None,
            return_now: None,
        }
    }
}

impl<P, T> HookOutcome<P, T> {
    /// Only contribute state.
    #[must_use]
    pub fn state(state: PartialState<P, T>) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// Veto the request.
    #[must_use]
    pub fn stop() -> Self {
        Self {
            stop_now: Some(true),
            ..Self::default()
        }
    }

    /// Short-circuit with the data in `state`.
    #[must_use]
    pub fn return_now(state: PartialState<P, T>) -> Self {
        Self {
            state,
            return_now: Some(true),
            ..Self::default()
        }
    }

    /// Merge `later` over `self`.
    #[must_use]
    pub fn merge(self, later: Self) -> Self {
        Self {
            state: self.state.merge(later.state),
            stop_now: later.stop_now.or(self.stop_now),
            return_now: later.return_now.or(self.return_now),
        }
    }

    /// The merged veto flag.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_now.unwrap_or(false)
    }

    /// The merged short-circuit flag.
    #[must_use]
    pub fn should_return(&self) -> bool {
        self.return_now.unwrap_or(false)
    }
}

/// A policy module observing one controller.
///
/// All hooks default to doing nothing, so a plugin implements only the
/// extension points it cares about. Hooks run synchronously between the
/// controller's suspension points and must not block.
pub trait Plugin<P, T>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Seed the initial state, once, before the first state assignment.
    fn on_init(&self) -> Option<PartialState<P, T>> {
        None
    }

    /// Called before every run.
    fn on_before(&self, _params: &P) -> Option<HookOutcome<P, T>> {
        None
    }

    /// Offer a substitute for invoking the service.
    fn on_request(&self, _service: &ServiceFn<P, T>, _params: &P) -> Option<ServiceFuture<T>> {
        None
    }

    /// Called after a current-generation success has been written to state.
    fn on_success(&self, _data: &T, _params: &P) -> Option<PartialState<P, T>> {
        None
    }

    /// Called after a current-generation failure has been written to state.
    fn on_error(&self, _error: &ServiceError, _params: &P) -> Option<PartialState<P, T>> {
        None
    }

    /// Called after success or failure while the run is still current.
    fn on_finally(&self, _params: &P, _data: Option<&T>, _error: Option<&ServiceError>) {}

    /// Called on explicit cancellation.
    fn on_cancel(&self) {}

    /// Called when data is replaced directly.
    fn on_mutate(&self, _data: &T) {}

    /// Called once when the controller is torn down.
    fn on_teardown(&self) {}
}
