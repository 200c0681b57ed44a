//! Rate limiters for deferred invocations.
//!
//! - [`Debouncer`]: the classic leading/trailing/max-wait debounce state
//!   machine. Throttling is the same machine with `leading = trailing = true`
//!   and `max_wait = wait` (see [`DebounceSettings::throttle`]).
//! - [`Cooldown`]: a "pending" latch. The first trigger passes, further
//!   triggers are dropped until the timespan has elapsed.
//!
//! Both work on boxed jobs. A job that is superseded inside a window is
//! dropped without running; callers that need to learn about that hold
//! the sending half of a channel inside the job.

use reqflow_core::sync::lock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A deferred invocation.
pub type Job = Box<dyn FnOnce() + Send>;

/// Debounce window configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    /// Quiet period before the trailing invocation.
    pub wait: Duration,
    /// Invoke at the start of a window.
    pub leading: bool,
    /// Invoke at the end of a window with the latest job.
    pub trailing: bool,
    /// Longest a job may be deferred.
    pub max_wait: Option<Duration>,
}

impl DebounceSettings {
    /// Trailing-edge debounce.
    #[must_use]
    pub const fn debounce(wait: Duration) -> Self {
        Self {
            wait,
            leading: false,
            trailing: true,
            max_wait: None,
        }
    }

    /// Throttle: at most one invocation per `wait`, on both edges.
    #[must_use]
    pub const fn throttle(wait: Duration) -> Self {
        Self {
            wait,
            leading: true,
            trailing: true,
            max_wait: Some(wait),
        }
    }

    /// Set the leading flag.
    #[must_use]
    pub const fn with_leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    /// Set the trailing flag.
    #[must_use]
    pub const fn with_trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }

    /// Set the maximum deferral.
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

#[derive(Default)]
struct DebounceState {
    pending: Option<Job>,
    last_call: Option<Instant>,
    last_invoke: Option<Instant>,
    timer: Option<(u64, JoinHandle<()>)>,
    next_timer: u64,
}

impl DebounceState {
    fn should_invoke(&self, settings: &DebounceSettings, now: Instant) -> bool {
        let Some(last_call) = self.last_call else {
            return true;
        };
        if now.saturating_duration_since(last_call) >= settings.wait {
            return true;
        }
        settings.max_wait.is_some_and(|max_wait| {
            self.last_invoke
                .is_none_or(|last_invoke| now.saturating_duration_since(last_invoke) >= max_wait)
        })
    }

    fn remaining_wait(&self, settings: &DebounceSettings, now: Instant) -> Duration {
        let since_call = self
            .last_call
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        let waiting = settings.wait.saturating_sub(since_call);

        match (settings.max_wait, self.last_invoke) {
            (Some(max_wait), Some(last_invoke)) => {
                let since_invoke = now.saturating_duration_since(last_invoke);
                waiting.min(max_wait.saturating_sub(since_invoke))
            },
            _ => waiting,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some((_, handle)) = self.timer.take() {
            handle.abort();
        }
    }
}

/// Debounce state machine over boxed jobs.
pub struct Debouncer {
    settings: DebounceSettings,
    state: Arc<Mutex<DebounceState>>,
}

impl Debouncer {
    /// Create a debouncer. `max_wait` is raised to at least `wait`.
    #[must_use]
    pub fn new(mut settings: DebounceSettings) -> Self {
        settings.max_wait = settings.max_wait.map(|max_wait| max_wait.max(settings.wait));
        Self {
            settings,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    /// The effective settings.
    #[must_use]
    pub const fn settings(&self) -> DebounceSettings {
        self.settings
    }

    /// Submit a job.
    ///
    /// The job replaces any job still waiting for the trailing edge; the
    /// replaced job is dropped. A leading-edge job runs before this returns.
    /// Must be called from within a Tokio runtime.
    pub fn call(&self, job: Job) {
        let now = Instant::now();
        let (ready, replaced) = {
            let mut state = lock(&self.state);
            let invoking = state.should_invoke(&self.settings, now);
            state.last_call = Some(now);
            let replaced = state.pending.replace(job);

            let mut ready = None;
            if invoking && state.timer.is_none() {
                // leading edge
                state.last_invoke = Some(now);
                self.start_timer(&mut state, self.settings.wait);
                if self.settings.leading {
                    ready = state.pending.take();
                }
            } else if invoking && self.settings.max_wait.is_some() {
                // max wait reached inside a busy window
                self.start_timer(&mut state, self.settings.wait);
                state.last_invoke = Some(now);
                ready = state.pending.take();
            } else if state.timer.is_none() {
                self.start_timer(&mut state, self.settings.wait);
            }
            (ready, replaced)
        };

        drop(replaced);
        if let Some(job) = ready {
            job();
        }
    }

    /// Drop the waiting job and reset the window.
    pub fn cancel(&self) {
        let dropped = {
            let mut state = lock(&self.state);
            state.cancel_timer();
            state.last_call = None;
            state.last_invoke = None;
            state.pending.take()
        };
        drop(dropped);
    }

    /// `true` while a window is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.state).timer.is_some()
    }

    fn start_timer(&self, state: &mut DebounceState, delay: Duration) {
        state.cancel_timer();
        let id = state.next_timer;
        state.next_timer += 1;

        let shared = Arc::downgrade(&self.state);
        let settings = self.settings;
        let handle = tokio::spawn(run_timer(shared, settings, id, delay));
        state.timer = Some((id, handle));
    }
}

async fn run_timer(
    shared: Weak<Mutex<DebounceState>>,
    settings: DebounceSettings,
    id: u64,
    mut delay: Duration,
) {
    loop {
        tokio::time::sleep(delay).await;

        let Some(shared) = shared.upgrade() else {
            return;
        };
        let (job, dropped) = {
            let mut state = lock(&shared);
            if state.timer.as_ref().is_none_or(|(current, _)| *current != id) {
                return;
            }

            let now = Instant::now();
            if !state.should_invoke(&settings, now) {
                delay = state.remaining_wait(&settings, now);
                continue;
            }

            // trailing edge
            state.timer = None;
            if settings.trailing && state.pending.is_some() {
                state.last_invoke = Some(now);
                (state.pending.take(), None)
            } else {
                (None, state.pending.take())
            }
        };

        drop(dropped);
        if let Some(job) = job {
            job();
        }
        return;
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("settings", &self.settings)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        lock(&self.state).cancel_timer();
    }
}

/// Lets one trigger through per timespan.
#[derive(Debug, Clone)]
pub struct Cooldown {
    timespan: Duration,
    pending: Arc<AtomicBool>,
}

impl Cooldown {
    /// Create a cooldown latch.
    #[must_use]
    pub fn new(timespan: Duration) -> Self {
        Self {
            timespan,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` if the caller may proceed; the latch then stays closed
    /// for the timespan. Must be called from within a Tokio runtime.
    pub fn try_acquire(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }

        let pending = Arc::clone(&self.pending);
        let timespan = self.timespan;
        tokio::spawn(async move {
            tokio::time::sleep(timespan).await;
            pending.store(false, Ordering::Release);
        });
        true
    }

    /// `true` while triggers are being dropped.
    #[must_use]
    pub fn is_cooling_down(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Job) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |value: u32| -> Job {
            let sink = Arc::clone(&sink);
            Box::new(move || lock(&sink).push(value))
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_debounce_runs_only_the_last_job() {
        let debouncer = Debouncer::new(DebounceSettings::debounce(Duration::from_millis(100)));
        let (log, job) = recorder();

        debouncer.call(job(1));
        sleep(Duration::from_millis(50)).await;
        debouncer.call(job(2));
        sleep(Duration::from_millis(50)).await;
        debouncer.call(job(3));

        sleep(Duration::from_millis(99)).await;
        assert!(lock(&log).is_empty());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(*lock(&log), vec![3]);
        assert!(!debouncer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn leading_debounce_runs_immediately_and_skips_trailing_without_new_calls() {
        let debouncer = Debouncer::new(
            DebounceSettings::debounce(Duration::from_millis(100)).with_leading(true),
        );
        let (log, job) = recorder();

        debouncer.call(job(1));
        assert_eq!(*lock(&log), vec![1]);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(*lock(&log), vec![1]);

        debouncer.call(job(2));
        debouncer.call(job(3));
        sleep(Duration::from_millis(150)).await;
        assert_eq!(*lock(&log), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn max_wait_bounds_the_deferral() {
        let debouncer = Debouncer::new(
            DebounceSettings::debounce(Duration::from_millis(100))
                .with_max_wait(Duration::from_millis(250)),
        );
        let (log, job) = recorder();

        // a call every 60ms keeps the quiet period from ever elapsing
        for value in 0..6 {
            debouncer.call(job(value));
            sleep(Duration::from_millis(60)).await;
        }

        assert!(!lock(&log).is_empty(), "max wait must force an invocation");
        assert_eq!(lock(&log)[0], 4);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_runs_on_both_edges() {
        let throttle = Debouncer::new(DebounceSettings::throttle(Duration::from_millis(100)));
        let (log, job) = recorder();

        throttle.call(job(1));
        throttle.call(job(2));
        throttle.call(job(3));
        assert_eq!(*lock(&log), vec![1]);

        sleep(Duration::from_millis(101)).await;
        assert_eq!(*lock(&log), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_without_trailing_drops_the_tail() {
        let throttle = Debouncer::new(
            DebounceSettings::throttle(Duration::from_millis(100)).with_trailing(false),
        );
        let (log, job) = recorder();

        throttle.call(job(1));
        throttle.call(job(2));
        sleep(Duration::from_millis(150)).await;
        throttle.call(job(3));

        assert_eq!(*lock(&log), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_the_waiting_job() {
        let debouncer = Debouncer::new(DebounceSettings::debounce(Duration::from_millis(100)));
        let (log, job) = recorder();

        debouncer.call(job(1));
        debouncer.cancel();
        sleep(Duration::from_millis(200)).await;

        assert!(lock(&log).is_empty());
        assert!(!debouncer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_latches_for_the_timespan() {
        let cooldown = Cooldown::new(Duration::from_millis(500));

        assert!(cooldown.try_acquire());
        assert!(!cooldown.try_acquire());
        assert!(cooldown.is_cooling_down());

        sleep(Duration::from_millis(499)).await;
        assert!(!cooldown.try_acquire());

        sleep(Duration::from_millis(2)).await;
        assert!(cooldown.try_acquire());
    }
}
