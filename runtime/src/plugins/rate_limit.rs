//! Debounce and throttle layers of the run chain.
//!
//! Unlike the other plugins these are not driven by hooks: each wraps the
//! next layer of the run chain. A run submitted to an active limiter
//! resolves once the deferred call has executed, or with
//! [`RunError::Cancelled`] when the window drops it.

use crate::controller::{RunFuture, Runner};
use crate::rate_limit::{DebounceSettings, Debouncer};
use futures::FutureExt;
use reqflow_core::config::RequestConfig;
use reqflow_core::error::RunError;
use reqflow_core::plugin::Plugin;
use reqflow_core::sync::lock;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Debounce settings from the plain-data options.
#[must_use]
pub fn debounce_settings(config: &RequestConfig) -> Option<DebounceSettings> {
    let mut settings = DebounceSettings::debounce(config.debounce_wait?);
    if let Some(leading) = config.debounce_leading {
        settings.leading = leading;
    }
    if let Some(trailing) = config.debounce_trailing {
        settings.trailing = trailing;
    }
    if let Some(max_wait) = config.debounce_max_wait {
        settings.max_wait = Some(max_wait);
    }
    Some(settings)
}

/// Throttle settings from the plain-data options.
#[must_use]
pub fn throttle_settings(config: &RequestConfig) -> Option<DebounceSettings> {
    let mut settings = DebounceSettings::throttle(config.throttle_wait?);
    if let Some(leading) = config.throttle_leading {
        settings.leading = leading;
    }
    if let Some(trailing) = config.throttle_trailing {
        settings.trailing = trailing;
    }
    Some(settings)
}

/// Which limiter a [`RateLimitPlugin`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    /// Trailing-edge debounce by default.
    Debounce,
    /// Leading and trailing edges, one run per window.
    Throttle,
}

/// A reconfigurable limiter in the run chain.
pub struct RateLimitPlugin<P, T> {
    kind: RateLimitKind,
    limiter: Mutex<Option<Arc<Debouncer>>>,
    _marker: PhantomData<fn(P) -> T>,
}

impl<P, T> RateLimitPlugin<P, T>
where
    P: Send + 'static,
    T: Send + 'static,
{
    fn with_kind(kind: RateLimitKind, settings: Option<DebounceSettings>) -> Self {
        Self {
            kind,
            limiter: Mutex::new(settings.map(|settings| Arc::new(Debouncer::new(settings)))),
            _marker: PhantomData,
        }
    }

    /// A debounce layer; pass-through while `settings` is `None`.
    #[must_use]
    pub fn debounce(settings: Option<DebounceSettings>) -> Self {
        Self::with_kind(RateLimitKind::Debounce, settings)
    }

    /// A throttle layer; pass-through while `settings` is `None`.
    #[must_use]
    pub fn throttle(settings: Option<DebounceSettings>) -> Self {
        Self::with_kind(RateLimitKind::Throttle, settings)
    }

    /// Which limiter this is.
    #[must_use]
    pub const fn kind(&self) -> RateLimitKind {
        self.kind
    }

    /// Replace the limiter. Runs waiting in the old window are dropped.
    pub fn reconfigure(&self, settings: Option<DebounceSettings>) {
        let next = settings.map(|settings| Arc::new(Debouncer::new(settings)));
        let previous = std::mem::replace(&mut *lock(&self.limiter), next);
        if let Some(previous) = previous {
            previous.cancel();
        }
        tracing::debug!(kind = ?self.kind, enabled = settings.is_some(), "Rate limiter reconfigured");
    }

    /// `true` while a limiter is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        lock(&self.limiter).is_some()
    }

    fn cancel_pending(&self) {
        let limiter = lock(&self.limiter).clone();
        if let Some(limiter) = limiter {
            limiter.cancel();
        }
    }

    /// Wrap the next layer of the run chain.
    pub fn wrap(self: &Arc<Self>, next: Runner<P, T>) -> Runner<P, T> {
        let layer = Arc::clone(self);
        Arc::new(move |params: P| -> RunFuture<T> {
            let limiter = lock(&layer.limiter).clone();
            let Some(limiter) = limiter else {
                return next(params);
            };

            let (sender, receiver) = oneshot::channel();
            let next = Arc::clone(&next);
            limiter.call(Box::new(move || {
                let run = next(params);
                tokio::spawn(async move {
                    let _ = sender.send(run.await);
                });
            }));

            async move { receiver.await.unwrap_or(Err(RunError::Cancelled)) }.boxed()
        })
    }
}

impl<P, T> Plugin<P, T> for RateLimitPlugin<P, T>
where
    P: Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &'static str {
        match self.kind {
            RateLimitKind::Debounce => "debounce",
            RateLimitKind::Throttle => "throttle",
        }
    }

    fn on_cancel(&self) {
        self.cancel_pending();
    }

    fn on_teardown(&self) {
        self.cancel_pending();
    }
}
