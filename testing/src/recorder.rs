//! Waiting on a controller's published state.

use reqflow_core::state::RequestState;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};

/// Default bound for [`StateRecorder::wait_for`].
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a wait ended without a matching state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderError {
    /// No matching state was published in time.
    #[error("State did not match within {0:?}")]
    TimedOut(Duration),
    /// The controller was dropped.
    #[error("State channel closed")]
    Closed,
}

/// Follows a controller's state channel and keeps every snapshot it saw.
///
/// The channel only holds the latest state, so rapid intermediate states may
/// be skipped. Assert on the final shape, not on every transition.
pub struct StateRecorder<P, T> {
    receiver: watch::Receiver<RequestState<P, T>>,
    timeout: Duration,
    history: Vec<RequestState<P, T>>,
}

impl<P, T> StateRecorder<P, T>
where
    P: Clone,
    T: Clone,
{
    /// Follow `receiver`.
    #[must_use]
    pub fn new(receiver: watch::Receiver<RequestState<P, T>>) -> Self {
        Self {
            receiver,
            timeout: DEFAULT_TIMEOUT,
            history: Vec::new(),
        }
    }

    /// Bound every wait by `timeout` on the Tokio clock.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The latest state.
    #[must_use]
    pub fn current(&self) -> RequestState<P, T> {
        self.receiver.borrow().clone()
    }

    /// Wait until the state satisfies `predicate` and return it.
    ///
    /// # Errors
    ///
    /// [`RecorderError::TimedOut`] when no matching state arrives in time,
    /// [`RecorderError::Closed`] when the controller is dropped first.
    pub async fn wait_for(
        &mut self,
        predicate: impl Fn(&RequestState<P, T>) -> bool,
    ) -> Result<RequestState<P, T>, RecorderError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let state = self.receiver.borrow_and_update().clone();
            let matched = predicate(&state);
            self.history.push(state.clone());
            if matched {
                return Ok(state);
            }

            match timeout_at(deadline, self.receiver.changed()).await {
                Ok(Ok(())) => {},
                Ok(Err(_)) => return Err(RecorderError::Closed),
                Err(_) => return Err(RecorderError::TimedOut(self.timeout)),
            }
        }
    }

    /// Every snapshot observed so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RequestState<P, T>] {
        &self.history
    }
}
