use super::{CacheEntry, ClearScope};
use reqflow_core::config::{CacheKey, Expiry};
use reqflow_core::sync::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

struct Record<P, T> {
    entry: CacheEntry<P, T>,
    version: u64,
    eviction: Option<JoinHandle<()>>,
}

impl<P, T> Record<P, T> {
    fn abort_eviction(&self) {
        if let Some(eviction) = &self.eviction {
            eviction.abort();
        }
    }
}

struct Table<P, T> {
    records: HashMap<CacheKey, Record<P, T>>,
    next_version: u64,
}

/// Resolved results with per-key eviction timers.
pub struct KeyedTimerCache<P, T> {
    table: Arc<Mutex<Table<P, T>>>,
}

impl<P, T> KeyedTimerCache<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                records: HashMap::new(),
                next_version: 0,
            })),
        }
    }

    /// Store `entry` under `key`, replacing the previous entry and its timer.
    ///
    /// With [`Expiry::After`] the entry is evicted once the duration has
    /// passed; [`Expiry::Never`] keeps it until cleared. Finite expiries
    /// must be set from within a Tokio runtime.
    pub fn set(&self, key: CacheKey, cache_time: Expiry, entry: CacheEntry<P, T>) {
        let mut table = lock(&self.table);
        let version = table.next_version;
        table.next_version += 1;

        let eviction = cache_time.duration().map(|ttl| {
            let shared = Arc::downgrade(&self.table);
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(shared) = shared.upgrade() {
                    let mut table = lock(&shared);
                    if table.records.get(&key).is_some_and(|r| r.version == version) {
                        table.records.remove(&key);
                        tracing::trace!(%key, "Cache entry evicted");
                    }
                }
            })
        });

        let previous = table.records.insert(
            key,
            Record {
                entry,
                version,
                eviction,
            },
        );
        if let Some(previous) = previous {
            previous.abort_eviction();
        }
    }

    /// The entry for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<P, T>> {
        lock(&self.table)
            .records
            .get(key)
            .map(|record| record.entry.clone())
    }

    /// Remove entries and abort their timers.
    pub fn clear(&self, scope: &ClearScope) {
        let mut table = lock(&self.table);
        let removed: Vec<Record<P, T>> = match scope {
            ClearScope::All => table.records.drain().map(|(_, record)| record).collect(),
            ClearScope::Key(key) => table.records.remove(key).into_iter().collect(),
            ClearScope::Keys(keys) => keys
                .iter()
                .filter_map(|key| table.records.remove(key))
                .collect(),
        };
        drop(table);

        for record in &removed {
            record.abort_eviction();
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.table).records.len()
    }

    /// `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P, T> Default for KeyedTimerCache<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, T> Drop for KeyedTimerCache<P, T> {
    fn drop(&mut self) {
        for record in lock(&self.table).records.values() {
            record.abort_eviction();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn key() -> CacheKey {
        CacheKey::from("todos")
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_after_cache_time() {
        let cache = KeyedTimerCache::<(), &str>::new();
        cache.set(
            key(),
            Expiry::After(Duration::from_millis(50)),
            CacheEntry::new("cached", None),
        );

        sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&key()).map(|e| e.data), Some("cached"));

        sleep(Duration::from_millis(20)).await;
        assert!(cache.get(&key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn never_expiring_entries_stay_until_cleared() {
        let cache = KeyedTimerCache::<(), &str>::new();
        cache.set(key(), Expiry::Never, CacheEntry::new("kept", None));

        sleep(Duration::from_secs(3600)).await;
        assert!(cache.get(&key()).is_some());

        cache.clear(&ClearScope::Key(key()));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_restarts_the_timer() {
        let cache = KeyedTimerCache::<(), u32>::new();
        let ttl = Expiry::After(Duration::from_millis(50));

        cache.set(key(), ttl, CacheEntry::new(1, None));
        sleep(Duration::from_millis(40)).await;
        cache.set(key(), ttl, CacheEntry::new(2, None));

        // the first timer would have fired at 50ms
        sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get(&key()).map(|e| e.data), Some(2));

        sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&key()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_all_aborts_timers() {
        let cache = KeyedTimerCache::<(), u32>::new();
        cache.set(key(), Expiry::After(Duration::from_millis(10)), CacheEntry::new(1, None));
        cache.clear(&ClearScope::All);

        cache.set(key(), Expiry::Never, CacheEntry::new(2, None));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get(&key()).map(|e| e.data), Some(2));
    }
}
