//! Auth binding manager.

use registry_core::types::now_millis;
use registry_core::{
    ApplyAuth, Auth, AuthStatus, ErrorKind, JobType, ListAuths, Page, RegistryError, Result,
};
use tracing::{debug, info};

use super::{decode_cursor, into_page, load_active_tenant, ManagerContext};
use crate::jobs::auth::auth_job;
use crate::repository::{Query, Transaction};

#[derive(Debug, Clone)]
pub struct AuthManager {
    ctx: ManagerContext,
}

async fn load_auth(tx: &mut Transaction, external_id: &str) -> Result<Auth> {
    tx.find::<Auth>(&[external_id]).await?.ok_or_else(|| {
        RegistryError::new(ErrorKind::AuthNotFound).with("external_id", external_id)
    })
}

impl AuthManager {
    #[must_use]
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    /// Creates an auth in `APPLYING` and enqueues its apply job.
    ///
    /// A repeated request for an existing external id succeeds with the
    /// stored auth and enqueues nothing.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TenantNotFound`] or [`ErrorKind::TenantNotActive`].
    pub async fn apply_auth(&self, request: ApplyAuth) -> Result<Auth> {
        self.ctx.validator.apply_auth(&request)?;
        self.ctx
            .transact("apply_auth", async {
                let mut tx = self.ctx.begin().await?;
                load_active_tenant(&mut tx, &request.tenant_id).await?;
                let auth = Auth::applying(&request, now_millis());
                match tx.create(&auth).await {
                    Ok(()) => {}
                    Err(err) if err.is_unique_violation() => {
                        debug!(external_id = %auth.external_id, "auth already exists");
                        return load_auth(&mut tx, &auth.external_id).await;
                    }
                    Err(err) => return Err(err.into()),
                }
                let spec = auth_job(JobType::AuthApply, &auth)?;
                let job = self.ctx.orchestrator.prepare_job(&mut tx, spec).await?;
                tx.commit().await?;
                info!(
                    external_id = %auth.external_id,
                    tenant_id = %auth.tenant_id,
                    job_id = %job.id,
                    "auth applying"
                );
                Ok(auth)
            })
            .await
    }

    /// Moves an `APPLIED` auth to `REMOVING` and enqueues its remove job.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::AuthNotFound`] if absent.
    /// - [`ErrorKind::AuthNotApplied`] unless the auth is `APPLIED`.
    /// - [`ErrorKind::TenantNotActive`] if its tenant is not `ACTIVE`.
    pub async fn remove_auth(&self, external_id: &str) -> Result<Auth> {
        self.ctx.validator.auth_external_id(external_id)?;
        self.ctx
            .transact("remove_auth", async {
                let mut tx = self.ctx.begin().await?;
                let mut auth = load_auth(&mut tx, external_id).await?;
                auth.ensure_applied()?;
                load_active_tenant(&mut tx, &auth.tenant_id).await?;
                auth.set_status(AuthStatus::Removing, None, now_millis());
                tx.patch(&auth).await?;
                let spec = auth_job(JobType::AuthRemove, &auth)?;
                let job = self.ctx.orchestrator.prepare_job(&mut tx, spec).await?;
                tx.commit().await?;
                info!(external_id, job_id = %job.id, "auth removing");
                Ok(auth)
            })
            .await
    }

    /// # Errors
    ///
    /// [`ErrorKind::AuthNotFound`] if absent.
    pub async fn get_auth(&self, external_id: &str) -> Result<Auth> {
        self.ctx.validator.auth_external_id(external_id)?;
        self.ctx
            .transact("get_auth", async {
                let mut tx = self.ctx.begin().await?;
                load_auth(&mut tx, external_id).await
            })
            .await
    }

    /// One page of a tenant's auths ordered by `(created_at, external_id)`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidPaginationToken`] for a bad token.
    /// - [`ErrorKind::NoResourcesFound`] if the page is empty.
    pub async fn list_auths(&self, request: ListAuths) -> Result<Page<Auth>> {
        self.ctx.validator.auth_tenant_id(&request.tenant_id)?;
        let cursor = decode_cursor::<Auth>(request.page_token.as_deref())?;
        let limit = self.ctx.page_limit(request.limit);
        let query = Query::new()
            .filter("tenant_id", request.tenant_id.as_str())
            .after(cursor)
            .limit(limit + 1);
        self.ctx
            .transact("list_auths", async {
                let mut tx = self.ctx.begin().await?;
                let rows = tx.list::<Auth>(&query).await?;
                into_page(rows, limit)
            })
            .await
    }
}
