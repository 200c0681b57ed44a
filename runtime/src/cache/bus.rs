use reqflow_core::config::CacheKey;
use reqflow_core::subscription::{ListenerSet, Subscription};
use reqflow_core::sync::lock;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-key publish/subscribe for freshly written results.
pub struct KeySubscriptionBus<T> {
    channels: Mutex<HashMap<CacheKey, ListenerSet<T>>>,
}

impl<T: 'static> KeySubscriptionBus<T> {
    /// An empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Listen for results written under `key`.
    pub fn subscribe(
        &self,
        key: &CacheKey,
        listener: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        let channel = lock(&self.channels).entry(key.clone()).or_default().clone();
        channel.subscribe(listener)
    }

    /// Deliver `data` to every listener of `key`. Returns how many were called.
    pub fn trigger(&self, key: &CacheKey, data: &T) -> usize {
        let channel = lock(&self.channels).get(key).cloned();
        channel.map_or(0, |channel| channel.emit(data))
    }

    /// Listeners currently attached to `key`.
    #[must_use]
    pub fn listener_count(&self, key: &CacheKey) -> usize {
        lock(&self.channels).get(key).map_or(0, ListenerSet::len)
    }
}

impl<T: 'static> Default for KeySubscriptionBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn triggers_only_the_matching_key() {
        let bus = KeySubscriptionBus::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _a = {
            let seen = Arc::clone(&seen);
            bus.subscribe(&"a".into(), move |v| lock(&seen).push(("a", *v)))
        };
        let _b = {
            let seen = Arc::clone(&seen);
            bus.subscribe(&"b".into(), move |v| lock(&seen).push(("b", *v)))
        };

        assert_eq!(bus.trigger(&"a".into(), &1), 1);
        assert_eq!(bus.trigger(&"missing".into(), &2), 0);
        assert_eq!(*lock(&seen), vec![("a", 1)]);
    }

    #[test]
    fn unsubscribed_listeners_are_skipped() {
        let bus = KeySubscriptionBus::<u32>::new();
        let key = CacheKey::from("k");

        let subscription = bus.subscribe(&key, |_| {});
        assert_eq!(bus.listener_count(&key), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(bus.trigger(&key, &1), 0);
    }
}
