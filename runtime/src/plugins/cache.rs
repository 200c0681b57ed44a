//! Caching, stale-while-revalidate and request deduplication.
//!
//! - Construction seeds `data`/`params` from an existing entry (and clears
//!   `loading` when it is fresh), then subscribes to the key so results
//!   written by other controllers flow in.
//! - `on_before`: a fresh entry answers the run directly; a stale one is
//!   shown while the request proceeds.
//! - `on_request`: joins a request already in flight for the key unless this
//!   controller issued it, otherwise issues and registers a new one.
//! - `on_success` / `on_mutate`: writes the entry and notifies the other
//!   subscribers. The own subscription is dropped around the write so the
//!   writer does not hear itself.

use crate::cache::{CacheEntry, CacheScope, CacheStorage, DedupTicket};
use crate::controller::ControllerHandle;
use crate::metrics::RequestMetrics;
use futures::FutureExt;
use reqflow_core::config::{CacheKey, Expiry, RequestConfig};
use reqflow_core::plugin::{HookOutcome, Plugin, ServiceFn, ServiceFuture};
use reqflow_core::state::PartialState;
use reqflow_core::subscription::Subscription;
use reqflow_core::sync::lock;
use std::sync::{Arc, Mutex};

/// Cache policy for one controller.
pub struct CachePlugin<P, T> {
    handle: ControllerHandle<P, T>,
    key: CacheKey,
    cache_time: Expiry,
    stale_time: Expiry,
    scope: Arc<CacheScope<P, T>>,
    storage: Option<Arc<dyn CacheStorage<P, T>>>,
    subscription: Mutex<Option<Subscription>>,
    issued: Mutex<Option<DedupTicket>>,
}

impl<P, T> CachePlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Build the plugin and subscribe to `key`.
    #[must_use]
    pub fn new(
        handle: ControllerHandle<P, T>,
        key: CacheKey,
        config: &RequestConfig,
        scope: Arc<CacheScope<P, T>>,
        storage: Option<Arc<dyn CacheStorage<P, T>>>,
    ) -> Self {
        let plugin = Self {
            handle,
            key,
            cache_time: config.cache_time,
            stale_time: config.stale_time,
            scope,
            storage,
            subscription: Mutex::new(None),
            issued: Mutex::new(None),
        };
        plugin.resubscribe();
        plugin
    }

    fn lookup(&self, params: Option<&P>) -> Option<CacheEntry<P, T>> {
        match &self.storage {
            Some(storage) => storage.get(params),
            None => self.scope.entries().get(&self.key),
        }
    }

    fn unsubscribe(&self) {
        let previous = lock(&self.subscription).take();
        drop(previous);
    }

    fn resubscribe(&self) {
        let handle = self.handle.clone();
        let subscription = self.scope.bus().subscribe(&self.key, move |data: &T| {
            handle.set_state(PartialState::new().with_data(data.clone()));
        });
        let previous = lock(&self.subscription).replace(subscription);
        drop(previous);
    }

    fn write(&self, data: &T, params: Option<P>) {
        self.unsubscribe();

        let entry = CacheEntry::new(data.clone(), params);
        match &self.storage {
            Some(storage) => storage.set(entry),
            None => self.scope.entries().set(self.key.clone(), self.cache_time, entry),
        }
        let notified = self.scope.bus().trigger(&self.key, data);
        tracing::trace!(key = %self.key, notified, "Cache entry written");

        self.resubscribe();
    }
}

impl<P, T> Plugin<P, T> for CachePlugin<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "cache"
    }

    fn on_init(&self) -> Option<PartialState<P, T>> {
        let entry = self.lookup(None)?;
        let fresh = entry.is_fresh(self.stale_time);

        let mut seed = PartialState::new().with_data(entry.data);
        if let Some(params) = entry.params {
            seed = seed.with_params(params);
        }
        if fresh {
            seed = seed.with_loading(false);
        }
        Some(seed)
    }

    fn on_before(&self, params: &P) -> Option<HookOutcome<P, T>> {
        let entry = self.lookup(Some(params))?;

        if entry.is_fresh(self.stale_time) {
            RequestMetrics::record_cache_hit();
            tracing::debug!(key = %self.key, "Fresh cache hit");
            Some(HookOutcome::return_now(
                PartialState::new()
                    .with_loading(false)
                    .with_data(entry.data)
                    .without_error(),
            ))
        } else {
            RequestMetrics::record_stale_hit();
            tracing::debug!(key = %self.key, "Stale cache hit; revalidating");
            Some(HookOutcome::state(
                PartialState::new().with_data(entry.data).without_error(),
            ))
        }
    }

    fn on_request(&self, service: &ServiceFn<P, T>, params: &P) -> Option<ServiceFuture<T>> {
        let issued = *lock(&self.issued);
        if let Some((ticket, shared)) = self.scope.in_flight().get(&self.key) {
            if Some(ticket) != issued {
                RequestMetrics::record_dedup_reuse();
                tracing::debug!(key = %self.key, "Joining request already in flight");
                return Some(shared.boxed());
            }
        }

        let (ticket, shared) = self
            .scope
            .in_flight()
            .share(self.key.clone(), service(params.clone()));
        *lock(&self.issued) = Some(ticket);
        Some(shared.boxed())
    }

    fn on_success(&self, data: &T, params: &P) -> Option<PartialState<P, T>> {
        self.write(data, Some(params.clone()));
        None
    }

    fn on_mutate(&self, data: &T) {
        self.write(data, self.handle.params());
    }

    fn on_teardown(&self) {
        self.unsubscribe();
    }
}
