use futures::future::{FutureExt, Shared};
use reqflow_core::config::CacheKey;
use reqflow_core::plugin::ServiceFuture;
use reqflow_core::sync::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An in-flight request that any number of waiters can await.
pub type SharedRequest<T> = Shared<ServiceFuture<T>>;

/// Identifies one registration in a [`PromiseDedupStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupTicket(u64);

struct Slots<T> {
    requests: HashMap<CacheKey, (DedupTicket, SharedRequest<T>)>,
    next_ticket: u64,
}

/// Requests in flight, at most one per key.
pub struct PromiseDedupStore<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> PromiseDedupStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                requests: HashMap::new(),
                next_ticket: 0,
            })),
        }
    }

    /// The request currently registered for `key`.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<(DedupTicket, SharedRequest<T>)> {
        lock(&self.slots).requests.get(key).cloned()
    }

    /// Register `request` under `key`.
    ///
    /// A background task drives the request to completion and then removes
    /// the registration, but only while it is still this one: a newer
    /// registration for the same key is never undone. Must be called from
    /// within a Tokio runtime.
    pub fn set(&self, key: CacheKey, request: SharedRequest<T>) -> DedupTicket {
        let ticket = {
            let mut slots = lock(&self.slots);
            let ticket = DedupTicket(slots.next_ticket);
            slots.next_ticket += 1;
            slots
                .requests
                .insert(key.clone(), (ticket, request.clone()));
            ticket
        };

        let slots = Arc::downgrade(&self.slots);
        tokio::spawn(async move {
            let _settled = request.await;
            if let Some(slots) = slots.upgrade() {
                let mut slots = lock(&slots);
                if slots.requests.get(&key).is_some_and(|(t, _)| *t == ticket) {
                    slots.requests.remove(&key);
                }
            }
        });

        ticket
    }

    /// Convenience: share `request` and register it.
    pub fn share(&self, key: CacheKey, request: ServiceFuture<T>) -> (DedupTicket, SharedRequest<T>) {
        let shared = request.shared();
        let ticket = self.set(key, shared.clone());
        (ticket, shared)
    }

    /// Number of keys with a request in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots).requests.len()
    }

    /// `true` when nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PromiseDedupStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
