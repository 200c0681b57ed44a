//! A scripted service.

use futures::FutureExt;
use reqflow_core::error::ServiceError;
use reqflow_core::plugin::ServiceFn;
use reqflow_core::sync::lock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder<P, T> = Box<dyn FnMut(&P, usize) -> Result<T, ServiceError> + Send>;

struct MockInner<P, T> {
    calls: AtomicUsize,
    seen: Mutex<Vec<P>>,
    latency: Mutex<Duration>,
    responder: Mutex<Responder<P, T>>,
}

/// A service whose answers are scripted by the test.
///
/// The response is decided when the service is invoked and delivered after
/// the configured latency, measured on the Tokio clock so paused-time tests
/// stay deterministic.
///
/// # Example
///
/// ```
/// use reqflow_testing::MockService;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mock = MockService::new(|id: &u32| id * 10);
/// let service = mock.service();
///
/// assert_eq!(service(4).await.ok(), Some(40));
/// assert_eq!(mock.calls(), 1);
/// assert_eq!(mock.params_seen(), vec![4]);
/// # }
/// ```
pub struct MockService<P, T> {
    inner: Arc<MockInner<P, T>>,
}

impl<P, T> Clone for MockService<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, T> MockService<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    /// A service that answers with the full responder, which also receives
    /// the zero-based call index.
    #[must_use]
    pub fn responding(
        responder: impl FnMut(&P, usize) -> Result<T, ServiceError> + Send + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(MockInner {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                latency: Mutex::new(Duration::ZERO),
                responder: Mutex::new(Box::new(responder)),
            }),
        }
    }

    /// A service that always succeeds with `f(params)`.
    #[must_use]
    pub fn new(f: impl Fn(&P) -> T + Send + 'static) -> Self {
        Self::responding(move |params, _| Ok(f(params)))
    }

    /// A service that always fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::responding(move |_, _| Err(ServiceError::msg(&message)))
    }

    /// A service that plays `responses` in order and repeats the last one.
    ///
    /// With no responses every call fails.
    #[must_use]
    pub fn sequence(responses: Vec<Result<T, ServiceError>>) -> Self
    where
        T: Clone,
    {
        let mut queue: VecDeque<_> = responses.into();
        Self::responding(move |_, _| {
            let response = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            response.unwrap_or_else(|| Err(ServiceError::msg("no scripted response")))
        })
    }

    /// Delay every answer by `latency`.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Change the latency of later calls.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.inner.latency) = latency;
    }

    /// The service to hand to a controller.
    #[must_use]
    pub fn service(&self) -> ServiceFn<P, T> {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |params: P| {
            let index = inner.calls.fetch_add(1, Ordering::SeqCst);
            let response = {
                let mut responder = lock(&inner.responder);
                (*responder)(&params, index)
            };
            lock(&inner.seen).push(params);
            let latency = *lock(&inner.latency);

            async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                response
            }
            .boxed()
        })
    }

    /// How many times the service was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Params of every invocation, oldest first.
    #[must_use]
    pub fn params_seen(&self) -> Vec<P> {
        lock(&self.inner.seen).clone()
    }
}

impl<P, T> std::fmt::Debug for MockService<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockService")
            .field("calls", &self.inner.calls.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_repeats_the_last_response() {
        let mock = MockService::<(), u8>::sequence(vec![Err(ServiceError::msg("boom")), Ok(2)]);
        let service = mock.service();

        assert!(service(()).await.is_err());
        assert_eq!(service(()).await.unwrap(), 2);
        assert_eq!(service(()).await.unwrap(), 2);
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_follows_the_tokio_clock() {
        let mock = MockService::new(|n: &u8| *n).with_latency(Duration::from_millis(100));
        let started = tokio::time::Instant::now();

        assert_eq!(mock.service()(7).await.unwrap(), 7);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn failing_service_reports_its_message() {
        let mock = MockService::<u8, u8>::failing("offline");
        let error = mock.service()(1).await.unwrap_err();
        assert_eq!(error.to_string(), "offline");
    }
}
