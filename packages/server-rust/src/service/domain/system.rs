//! System domain service.

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tower::Service;

use super::{wrong_service, OperationFuture};
use crate::manager::SystemManager;
use crate::service::operation::{service_names, Operation, OperationError, OperationResponse};
use crate::service::registry::{ManagedService, ServiceContext};

/// Routes system and linkage operations to [`SystemManager`]. System changes
/// enqueue no jobs, so no handler is registered.
pub struct SystemService {
    manager: SystemManager,
}

impl SystemService {
    #[must_use]
    pub fn new(manager: SystemManager) -> Self {
        Self { manager }
    }

    async fn handle(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let manager = &self.manager;
        let response = match op {
            Operation::RegisterSystem { request, .. } => {
                OperationResponse::System(manager.register_system(request).await?)
            }
            Operation::MapSystemToTenant { request, .. } => {
                OperationResponse::SystemIdentity(manager.map_system_to_tenant(request).await?)
            }
            Operation::UnmapSystemFromTenant { request, .. } => {
                OperationResponse::SystemIdentity(manager.unmap_system_from_tenant(request).await?)
            }
            Operation::DeleteSystem { target, .. } => {
                manager.delete_system(target).await?;
                OperationResponse::Empty
            }
            Operation::UpdateL1KeyClaim { request, .. } => {
                OperationResponse::System(manager.update_l1_key_claim(request).await?)
            }
            Operation::UpdateSystemStatus { request, .. } => {
                OperationResponse::System(manager.update_system_status(request).await?)
            }
            Operation::SetSystemLabels { target, labels, .. } => {
                OperationResponse::System(manager.set_system_labels(target, labels).await?)
            }
            Operation::RemoveSystemLabels { target, keys, .. } => {
                OperationResponse::System(manager.remove_system_labels(target, keys).await?)
            }
            Operation::GetSystem { target, .. } => {
                OperationResponse::System(manager.get_system(target).await?)
            }
            Operation::ListSystems { request, .. } => {
                OperationResponse::Systems(manager.list_systems(request).await?)
            }
            other => return Err(wrong_service(service_names::SYSTEM, &other)),
        };
        Ok(response)
    }
}

#[async_trait]
impl ManagedService for SystemService {
    fn name(&self) -> &'static str {
        service_names::SYSTEM
    }

    async fn init(&self, _ctx: &ServiceContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Service<Operation> for Arc<SystemService> {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = OperationFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let svc = Arc::clone(self);
        Box::pin(async move { svc.handle(op).await })
    }
}
