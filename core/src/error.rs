//! Error types shared by every reqflow crate.
//!
//! There are two layers:
//!
//! - [`ServiceError`]: whatever the underlying service failed with. It is
//!   cheap to clone because a single failure is fanned out to every caller
//!   that shares a deduplicated request, and it is also kept in
//!   [`RequestState::error`](crate::state::RequestState::error).
//! - [`RunError`]: the outcome of a `run_async` call that did not produce data.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised by a service.
///
/// Wraps the original error behind an `Arc` so that it can be handed to the
/// state, the user callbacks and every deduplicated waiter without copying.
#[derive(Clone)]
pub struct ServiceError {
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl ServiceError {
    /// Wrap any error type.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self {
            inner: Arc::from(error.into()),
        }
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(message.to_string())
    }

    /// Borrow the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Check whether two handles point at the same failure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServiceError").field(&self.inner).finish()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl From<String> for ServiceError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ServiceError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Why a `run_async` call finished without data.
#[derive(Error, Debug, Clone)]
pub enum RunError {
    /// The service failed.
    ///
    /// The same error is recorded in the request state.
    #[error("Service failed: {0}")]
    Service(#[source] ServiceError),

    /// The call lost its turn.
    ///
    /// A newer run or an explicit cancel bumped the generation before this
    /// call settled, a debounce/throttle window dropped it, or the
    /// controller was torn down. Its result never reaches the state.
    #[error("Request was cancelled or superseded")]
    Cancelled,

    /// A plugin vetoed the request before it started (`stop_now`).
    #[error("Request is not ready")]
    NotReady,

    /// `refresh` was asked to re-run but no params were ever recorded and no
    /// default params are configured.
    #[error("No params recorded to refresh with")]
    MissingParams,
}

impl RunError {
    /// The service error, if this is one.
    #[must_use]
    pub const fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(error) => Some(error),
            _ => None,
        }
    }

    /// `true` for [`RunError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ServiceError> for RunError {
    fn from(error: ServiceError) -> Self {
        Self::Service(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_clones_share_the_same_failure() {
        let error = ServiceError::msg("boom");
        let clone = error.clone();

        assert!(error.ptr_eq(&clone));
        assert_eq!(clone.to_string(), "boom");
    }

    #[test]
    fn anyhow_errors_convert() {
        let error: ServiceError = anyhow::anyhow!("upstream unavailable").into();
        assert_eq!(error.to_string(), "upstream unavailable");
    }

    #[test]
    fn run_error_exposes_service_error() {
        let error = RunError::from(ServiceError::msg("bad gateway"));

        assert_eq!(
            error.service_error().map(ToString::to_string).as_deref(),
            Some("bad gateway")
        );
        assert!(!error.is_cancelled());
        assert!(RunError::Cancelled.is_cancelled());
        assert!(RunError::NotReady.service_error().is_none());
    }
}
