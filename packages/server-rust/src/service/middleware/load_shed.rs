//! Concurrency limit middleware.
//!
//! Operations beyond `max_concurrent_operations` fail immediately with
//! [`OperationError::Overloaded`] instead of queueing.

use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tower::{Layer, Service};
use tracing::debug;

use crate::service::domain::OperationFuture;
use crate::service::operation::{Operation, OperationError, OperationResponse};

/// All services built from one layer share its permits.
#[derive(Debug, Clone)]
pub struct LoadShedLayer {
    permits: Arc<Semaphore>,
}

impl LoadShedLayer {
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent as usize)),
        }
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl<S> Layer<S> for LoadShedLayer {
    type Service = LoadShedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoadShedService {
            inner,
            permits: self.permits.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadShedService<S> {
    inner: S,
    permits: Arc<Semaphore>,
}

impl<S> Service<Operation> for LoadShedService<S>
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
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            debug!(operation = op.name(), "shedding operation");
            return Box::pin(async { Err(OperationError::Overloaded) });
        };

        let fut = self.inner.call(op);
        Box::pin(async move {
            let _permit = permit;
            fut.await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::service::operation::{service_names, OperationContext};

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

    fn op() -> Operation {
        Operation::GetAuth {
            ctx: OperationContext::new(1, service_names::AUTH, 5000),
            external_id: "auth-1".into(),
        }
    }

    #[tokio::test]
    async fn allows_operations_under_limit() {
        let layer = LoadShedLayer::new(2);
        let resp = layer
            .layer(SlowService { delay_ms: 1 })
            .oneshot(op())
            .await
            .unwrap();
        assert!(matches!(resp, OperationResponse::Empty));
        assert_eq!(layer.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_when_saturated_and_recovers() {
        let layer = LoadShedLayer::new(1);
        let mut svc = layer.layer(SlowService { delay_ms: 500 });

        ServiceExt::ready(&mut svc).await.unwrap();
        let in_flight = tokio::spawn(svc.call(op()));
        assert_eq!(layer.available(), 0);

        let err = svc.call(op()).await.unwrap_err();
        assert!(matches!(err, OperationError::Overloaded));

        in_flight.await.unwrap().unwrap();
        assert_eq!(layer.available(), 1);
        assert!(svc.call(op()).await.is_ok());
    }
}
