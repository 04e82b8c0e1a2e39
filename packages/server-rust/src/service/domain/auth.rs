//! Auth domain service.

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use registry_core::JobType;
use tower::Service;

use super::{register_handlers, wrong_service, OperationFuture};
use crate::jobs::AuthJobHandler;
use crate::manager::AuthManager;
use crate::orchestrator::JobHandler;
use crate::service::operation::{service_names, Operation, OperationError, OperationResponse};
use crate::service::registry::{ManagedService, ServiceContext};

pub struct AuthService {
    manager: AuthManager,
    jobs: Arc<AuthJobHandler>,
}

impl AuthService {
    #[must_use]
    pub fn new(manager: AuthManager, jobs: Arc<AuthJobHandler>) -> Self {
        Self { manager, jobs }
    }

    async fn handle(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let response = match op {
            Operation::ApplyAuth { request, .. } => {
                OperationResponse::Auth(self.manager.apply_auth(request).await?)
            }
            Operation::RemoveAuth { external_id, .. } => {
                OperationResponse::Auth(self.manager.remove_auth(&external_id).await?)
            }
            Operation::GetAuth { external_id, .. } => {
                OperationResponse::Auth(self.manager.get_auth(&external_id).await?)
            }
            Operation::ListAuths { request, .. } => {
                OperationResponse::Auths(self.manager.list_auths(request).await?)
            }
            other => return Err(wrong_service(service_names::AUTH, &other)),
        };
        Ok(response)
    }
}

#[async_trait]
impl ManagedService for AuthService {
    fn name(&self) -> &'static str {
        service_names::AUTH
    }

    async fn init(&self, ctx: &ServiceContext) -> anyhow::Result<()> {
        let handler: Arc<dyn JobHandler> = self.jobs.clone();
        register_handlers(ctx, JobType::AUTH, &handler)
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Service<Operation> for Arc<AuthService> {
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

#[cfg(test)]
mod tests {
    use registry_core::{ApplyAuth, AuthStatus, ErrorKind};
    use tower::ServiceExt;

    use super::*;
    use crate::manager::fixtures::*;
    use crate::orchestrator::LogExecutor;
    use crate::service::operation::OperationContext;

    fn service(fixture: &Fixture) -> Arc<AuthService> {
        Arc::new(AuthService::new(
            AuthManager::new(fixture.ctx.clone()),
            Arc::new(AuthJobHandler::new(fixture.ctx.clone())),
        ))
    }

    fn ctx() -> OperationContext {
        OperationContext::new(3, service_names::AUTH, 5000)
    }

    fn apply(external_id: &str) -> Operation {
        Operation::ApplyAuth {
            ctx: ctx(),
            request: ApplyAuth {
                external_id: external_id.into(),
                tenant_id: "t-1".into(),
                auth_type: "oidc".into(),
                ..ApplyAuth::default()
            },
        }
    }

    #[tokio::test]
    async fn apply_runs_job_after_init() {
        let fixture = fixture();
        seed_active_tenant(&fixture, "t-1").await;
        let svc = service(&fixture);
        svc.init(&ServiceContext {
            config: fixture.ctx.config.clone(),
            orchestrator: fixture.orchestrator.clone(),
        })
        .await
        .unwrap();

        let resp = svc.clone().oneshot(apply("auth-1")).await.unwrap();
        assert!(matches!(
            resp,
            OperationResponse::Auth(a) if a.status == AuthStatus::Applying
        ));

        assert_eq!(fixture.orchestrator.dispatch_pending(&LogExecutor).await, 1);
        let resp = svc
            .oneshot(Operation::GetAuth {
                ctx: ctx(),
                external_id: "auth-1".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            resp,
            OperationResponse::Auth(a) if a.status == AuthStatus::Applied
        ));
    }

    #[tokio::test]
    async fn remove_before_applied_fails() {
        let fixture = fixture();
        seed_active_tenant(&fixture, "t-1").await;
        let svc = service(&fixture);
        svc.clone().oneshot(apply("auth-1")).await.unwrap();

        let err = svc
            .oneshot(Operation::RemoveAuth {
                ctx: ctx(),
                external_id: "auth-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Domain(e) if e.kind() == ErrorKind::AuthNotApplied
        ));
    }

    #[tokio::test]
    async fn rejects_foreign_operations() {
        let fixture = fixture();
        let err = service(&fixture)
            .oneshot(Operation::GetTenant {
                ctx: ctx(),
                tenant_id: "t-1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::WrongService { service: "auth", .. }));
    }
}
