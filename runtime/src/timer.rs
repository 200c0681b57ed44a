//! A single cancellable timer slot.
//!
//! Every policy that schedules something (retry, polling, loading delay)
//! owns one [`TimerSlot`]. Scheduling replaces whatever was pending, and the
//! slot aborts its task when cleared or dropped.

use reqflow_core::sync::lock;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Holds at most one pending timer.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    /// An empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    /// Run `callback` after `delay`, replacing any pending timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        let previous = lock(&self.handle).replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Abort the pending timer, if any.
    pub fn clear(&self) {
        let previous = lock(&self.handle).take();
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// `true` while a scheduled callback has not run yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        lock(&self.handle)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let slot = TimerSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        slot.schedule(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(slot.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_pending_timer() {
        let slot = TimerSlot::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let fired = Arc::clone(&fired);
            slot.schedule(Duration::from_millis(50), move || lock(&fired).push(label));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*lock(&fired), vec!["second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_drop_abort() {
        let fired = Arc::new(AtomicUsize::new(0));

        let cleared = TimerSlot::new();
        let counter = Arc::clone(&fired);
        cleared.schedule(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cleared.clear();

        let dropped = TimerSlot::new();
        let counter = Arc::clone(&fired);
        dropped.schedule(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(dropped);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
