//! Tracing middleware.
//!
//! Wraps each call in an `operation` span and logs its duration and outcome
//! once it completes. Failures also record the status-code family.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::domain::OperationFuture;
use crate::service::operation::{Operation, OperationError, OperationResponse};

#[derive(Debug, Clone)]
pub struct InstrumentLayer;

impl<S> Layer<S> for InstrumentLayer {
    type Service = InstrumentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentService<S> {
    inner: S,
}

impl<S> Service<Operation> for InstrumentService<S>
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
        let ctx = op.ctx();
        let service = ctx.service_name;
        let call_id = ctx.call_id;
        let operation = op.name();
        let span = info_span!(
            "operation",
            service,
            operation,
            call_id,
            caller = ctx.caller_id.as_deref().unwrap_or("-"),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(op);
        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                match &result {
                    Ok(_) => {
                        span.record("outcome", "ok");
                        tracing::info!(duration_ms, "operation complete");
                    }
                    Err(err) => {
                        span.record("outcome", "error");
                        tracing::info!(
                            duration_ms,
                            code = %err.code(),
                            error = %err,
                            "operation failed"
                        );
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}
