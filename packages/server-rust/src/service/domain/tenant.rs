//! Tenant domain service.

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use registry_core::JobType;
use tower::Service;

use super::{register_handlers, wrong_service, OperationFuture};
use crate::jobs::TenantJobHandler;
use crate::manager::TenantManager;
use crate::orchestrator::JobHandler;
use crate::service::operation::{service_names, Operation, OperationError, OperationResponse};
use crate::service::registry::{ManagedService, ServiceContext};

/// Routes tenant operations to [`TenantManager`] and owns the tenant job
/// handler.
pub struct TenantService {
    manager: TenantManager,
    jobs: Arc<TenantJobHandler>,
}

impl TenantService {
    #[must_use]
    pub fn new(manager: TenantManager, jobs: Arc<TenantJobHandler>) -> Self {
        Self { manager, jobs }
    }

    async fn handle(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let response = match op {
            Operation::RegisterTenant { request, .. } => {
                OperationResponse::Tenant(self.manager.register_tenant(request).await?)
            }
            Operation::BlockTenant { tenant_id, .. } => {
                OperationResponse::Tenant(self.manager.block_tenant(&tenant_id).await?)
            }
            Operation::UnblockTenant { tenant_id, .. } => {
                OperationResponse::Tenant(self.manager.unblock_tenant(&tenant_id).await?)
            }
            Operation::TerminateTenant { tenant_id, .. } => {
                OperationResponse::Tenant(self.manager.terminate_tenant(&tenant_id).await?)
            }
            Operation::SetTenantLabels {
                tenant_id, labels, ..
            } => OperationResponse::Tenant(
                self.manager.set_tenant_labels(&tenant_id, labels).await?,
            ),
            Operation::RemoveTenantLabels {
                tenant_id, keys, ..
            } => OperationResponse::Tenant(
                self.manager.remove_tenant_labels(&tenant_id, keys).await?,
            ),
            Operation::SetTenantUserGroups {
                tenant_id,
                user_groups,
                ..
            } => OperationResponse::Tenant(
                self.manager
                    .set_tenant_user_groups(&tenant_id, user_groups)
                    .await?,
            ),
            Operation::GetTenant { tenant_id, .. } => {
                OperationResponse::Tenant(self.manager.get_tenant(&tenant_id).await?)
            }
            Operation::ListTenants { request, .. } => {
                OperationResponse::Tenants(self.manager.list_tenants(request).await?)
            }
            other => return Err(wrong_service(service_names::TENANT, &other)),
        };
        Ok(response)
    }
}

#[async_trait]
impl ManagedService for TenantService {
    fn name(&self) -> &'static str {
        service_names::TENANT
    }

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let handler: Arc<dyn JobHandler> = self.jobs.clone();
        register_handlers(ctx, JobType::TENANT, &handler)
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Service<Operation> for Arc<TenantService> {
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
