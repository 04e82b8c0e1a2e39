//! Domain services.
//!
//! Each service implements both `ManagedService` (lifecycle) and
//! `tower::Service<Operation>` (request handling) on top of one manager.
//! Services that own job types register their handlers during `init`.

pub mod auth;
pub mod system;
pub mod tenant;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use registry_core::JobType;

use crate::orchestrator::JobHandler;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::registry::ServiceContext;

pub use auth::AuthService;
pub use system::SystemService;
pub use tenant::TenantService;

pub(crate) type OperationFuture =
    Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

/// Error for an operation that reached a service it does not belong to.
pub(crate) fn wrong_service(service: &'static str, op: &Operation) -> OperationError {
    OperationError::WrongService {
        service,
        operation: op.name(),
    }
}

/// Registers `handler` for every type in `job_types`.
pub(crate) fn register_handlers(
    ctx: &ServiceContext,
    job_types: &[JobType],
    handler: &Arc<dyn JobHandler>,
) -> anyhow::Result<()> {
    for job_type in job_types {
        ctx.orchestrator
            .register_job_handler(*job_type, handler.clone())
            .map_err(|err| anyhow::anyhow!("registering {job_type} handler: {err}"))?;
    }
    Ok(())
}
