//! Deadline middleware.
//!
//! Each operation carries its own `call_timeout_ms`; zero falls back to the
//! layer's default. Expiry drops the inner future and fails the call with
//! [`OperationError::Timeout`].

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};
use tracing::warn;

use crate::service::domain::OperationFuture;
use crate::service::operation::{Operation, OperationError, OperationResponse};

#[derive(Debug, Clone)]
pub struct TimeoutLayer {
    default_timeout_ms: u64,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(default_timeout_ms: u64) -> Self {
        Self { default_timeout_ms }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            default_timeout_ms: self.default_timeout_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    default_timeout_ms: u64,
}

impl<S> Service<Operation> for TimeoutService<S>
where
    S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let timeout_ms = match op.ctx().call_timeout_ms {
            0 => self.default_timeout_ms,
            ms => ms,
        };
        let name = op.name();
        let fut = self.inner.call(op);
        Box::pin(async move {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    warn!(operation = name, timeout_ms, "operation deadline exceeded");
                    Err(OperationError::Timeout { timeout_ms })
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::{service_names, OperationContext};

    /// Sleeps for `delay_ms` before answering.
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<Operation> for SlowService {
        type Response = OperationResponse;
        type Error = OperationError;
        type Future = OperationFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _op: Operation) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(OperationResponse::Empty)
            })
        }
    }

    fn op(timeout_ms: u64) -> Operation {
        Operation::GetTenant {
            ctx: OperationContext::new(1, service_names::TENANT, timeout_ms),
            tenant_id: "t-1".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_deadline() {
        let svc = TimeoutLayer::new(1000).layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(op(100)).await.unwrap();
        assert!(matches!(resp, OperationResponse::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_deadline_wins() {
        let svc = TimeoutLayer::new(1000).layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(op(50)).await.unwrap_err();
        assert!(matches!(err, OperationError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_uses_layer_default() {
        let svc = TimeoutLayer::new(30).layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(op(0)).await.unwrap_err();
        assert!(matches!(err, OperationError::Timeout { timeout_ms: 30 }));
    }
}
