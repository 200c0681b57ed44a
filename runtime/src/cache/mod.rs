//! Shared cache subsystem.
//!
//! Three stores back the cache plugin, all keyed by [`CacheKey`]:
//!
//! - [`KeyedTimerCache`]: resolved results with per-key eviction timers.
//! - [`PromiseDedupStore`]: requests currently in flight, so concurrent runs
//!   for one key share a single service call.
//! - [`KeySubscriptionBus`]: pushes a new result to every controller
//!   watching the same key.
//!
//! They are bundled in a [`CacheScope`], which is constructed explicitly and
//! handed to every controller that should share cached data. Tests build a
//! fresh scope each, so nothing leaks between them.

mod bus;
mod dedup;
mod ttl;

pub use bus::KeySubscriptionBus;
pub use dedup::{DedupTicket, PromiseDedupStore, SharedRequest};
pub use ttl::KeyedTimerCache;

use reqflow_core::config::{CacheKey, Expiry};
use std::time::Duration;
use tokio::time::Instant;

/// A cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry<P, T> {
    /// The resolved data.
    pub data: T,
    /// The params that produced it.
    pub params: Option<P>,
    /// When it was written.
    pub cached_at: Instant,
}

impl<P, T> CacheEntry<P, T> {
    /// An entry stamped with the current time.
    pub fn new(data: T, params: Option<P>) -> Self {
        Self {
            data,
            params,
            cached_at: Instant::now(),
        }
    }

    /// Time since the entry was written.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.cached_at.elapsed()
    }

    /// `true` while the entry is within `stale_time`.
    #[must_use]
    pub fn is_fresh(&self, stale_time: Expiry) -> bool {
        stale_time.covers(self.age())
    }
}

/// Which entries to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// Every entry.
    All,
    /// One key.
    Key(CacheKey),
    /// Several keys.
    Keys(Vec<CacheKey>),
}

impl From<CacheKey> for ClearScope {
    fn from(key: CacheKey) -> Self {
        Self::Key(key)
    }
}

impl From<Vec<CacheKey>> for ClearScope {
    fn from(keys: Vec<CacheKey>) -> Self {
        Self::Keys(keys)
    }
}

/// Custom persistence for cached results.
///
/// Replaces the built-in TTL store for one controller. The key bus and the
/// dedup store are still used.
pub trait CacheStorage<P, T>: Send + Sync {
    /// Look up an entry. `params` are those of the upcoming run, or `None`
    /// when seeding at construction.
    fn get(&self, params: Option<&P>) -> Option<CacheEntry<P, T>>;

    /// Persist an entry.
    fn set(&self, entry: CacheEntry<P, T>);
}

/// The three shared cache stores.
pub struct CacheScope<P, T> {
    entries: KeyedTimerCache<P, T>,
    in_flight: PromiseDedupStore<T>,
    bus: KeySubscriptionBus<T>,
}

impl<P, T> CacheScope<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// An empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: KeyedTimerCache::new(),
            in_flight: PromiseDedupStore::new(),
            bus: KeySubscriptionBus::new(),
        }
    }

    /// The TTL store.
    #[must_use]
    pub const fn entries(&self) -> &KeyedTimerCache<P, T> {
        &self.entries
    }

    /// The in-flight request store.
    #[must_use]
    pub const fn in_flight(&self) -> &PromiseDedupStore<T> {
        &self.in_flight
    }

    /// The per-key update bus.
    #[must_use]
    pub const fn bus(&self) -> &KeySubscriptionBus<T> {
        &self.bus
    }

    /// Remove cached results. In-flight requests and subscriptions are kept.
    pub fn clear(&self, scope: impl Into<ClearScope>) {
        self.entries.clear(&scope.into());
    }
}

impl<P, T> Default for CacheScope<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, T> std::fmt::Debug for CacheScope<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheScope")
            .field("entries", &self.entries.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
