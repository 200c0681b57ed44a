//! Listener registration with idempotent, RAII teardown.
//!
//! [`ListenerSet`] is the building block for every pub/sub channel in
//! reqflow: the per-key cache bus, the focus and visibility signals.
//! Subscribing returns a [`Subscription`]; dropping it or calling
//! [`Subscription::unsubscribe`] detaches the listener, and doing so more
//! than once is harmless.

use crate::sync::lock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A registered callback.
pub type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

type Detach = Box<dyn FnOnce() + Send>;

/// Handle to an attached listener.
#[must_use = "dropping a Subscription detaches its listener"]
pub struct Subscription {
    detach: Mutex<Option<Detach>>,
}

impl Subscription {
    /// Wrap a detach action.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    /// A subscription that is not attached to anything.
    pub fn detached() -> Self {
        Self {
            detach: Mutex::new(None),
        }
    }

    /// Detach the listener. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let detach = lock(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// `true` until the listener has been detached.
    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.detach).is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

struct ListenerTable<A> {
    next_id: u64,
    listeners: Vec<(u64, Listener<A>)>,
}

/// An ordered set of listeners for values of type `A`.
pub struct ListenerSet<A> {
    table: Arc<Mutex<ListenerTable<A>>>,
}

impl<A> Clone for ListenerSet<A> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<A> Default for ListenerSet<A> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(ListenerTable {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }
}

impl<A: 'static> ListenerSet<A> {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener.
    pub fn subscribe(&self, listener: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut table = lock(&self.table);
            let id = table.next_id;
            table.next_id += 1;
            table.listeners.push((id, Arc::new(listener)));
            id
        };

        let table = Arc::downgrade(&self.table);
        Subscription::new(move || {
            if let Some(table) = table.upgrade() {
                lock(&table).listeners.retain(|(existing, _)| *existing != id);
            }
        })
    }

    /// Call every listener with `value`, in subscription order.
    ///
    /// Listeners run outside the internal lock, so they may subscribe or
    /// unsubscribe. Returns how many listeners were called.
    pub fn emit(&self, value: &A) -> usize {
        let snapshot: SmallVec<[Listener<A>; 4]> = lock(&self.table)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &snapshot {
            listener(value);
        }
        snapshot.len()
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.table).listeners.len()
    }

    /// `true` when no listener is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> fmt::Debug for ListenerSet<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &lock(&self.table).listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_in_subscription_order() {
        let set = ListenerSet::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            set.subscribe(move |v| lock(&seen).push(("first", *v)))
        };
        let second = {
            let seen = Arc::clone(&seen);
            set.subscribe(move |v| lock(&seen).push(("second", *v)))
        };

        assert_eq!(set.emit(&7), 2);
        assert_eq!(*lock(&seen), vec![("first", 7), ("second", 7)]);
        drop((first, second));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let set = ListenerSet::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let keep = {
            let calls = Arc::clone(&calls);
            set.subscribe(move |()| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let gone = set.subscribe(|()| {});

        gone.unsubscribe();
        gone.unsubscribe();
        assert!(!gone.is_active());
        assert_eq!(set.len(), 1);

        set.emit(&());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(keep.is_active());
    }

    #[test]
    fn dropping_the_handle_detaches() {
        let set = ListenerSet::<()>::new();
        {
            let _subscription = set.subscribe(|()| {});
            assert_eq!(set.len(), 1);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn listeners_may_unsubscribe_while_emitting() {
        let set = ListenerSet::<()>::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let subscription = {
            let slot = Arc::clone(&slot);
            set.subscribe(move |()| {
                if let Some(own) = lock(&slot).take() {
                    own.unsubscribe();
                }
            })
        };
        *lock(&slot) = Some(subscription);

        assert_eq!(set.emit(&()), 1);
        assert!(set.is_empty());
        assert_eq!(set.emit(&()), 0);
    }

    #[test]
    fn outliving_the_set_is_harmless() {
        let set = ListenerSet::<()>::new();
        let subscription = set.subscribe(|()| {});
        drop(set);
        subscription.unsubscribe();
    }
}
