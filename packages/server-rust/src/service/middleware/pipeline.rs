//! Composes the middleware layers around the router.

use tower::util::BoxService;
use tower::ServiceBuilder;

use super::instrument::InstrumentLayer;
use super::load_shed::LoadShedLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::RegistryConfig;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::router::OperationRouter;

/// The fully layered operation service.
pub type OperationPipeline = BoxService<Operation, OperationResponse, OperationError>;

/// Wraps `router` with, outermost first: load shedding (fail fast before any
/// work), the per-operation deadline, then tracing closest to the handler.
#[must_use]
pub fn build_operation_pipeline(router: OperationRouter, config: &RegistryConfig) -> OperationPipeline {
    let svc = ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer::new(config.default_operation_timeout_ms))
        .layer(InstrumentLayer)
        .service(router);
    BoxService::new(svc)
}
