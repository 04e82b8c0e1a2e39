//! Tenant lifecycle manager.

use registry_core::tenant::validate_transition;
use registry_core::types::{merge_labels, now_millis, remove_labels};
use registry_core::{
    ErrorKind, JobType, Labels, ListTenants, Page, RegisterTenant, RegistryError, Result, System,
    Tenant, TenantStatus,
};
use tracing::info;

use super::{decode_cursor, into_page, load_active_tenant, load_tenant, ManagerContext};
use crate::jobs::tenant::tenant_job;
use crate::repository::Query;

#[derive(Debug, Clone)]
pub struct TenantManager {
    ctx: ManagerContext,
}

impl TenantManager {
    #[must_use]
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    /// Stores a new tenant in `PROVISIONING` and enqueues its provisioning job.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Validation`] for missing or malformed fields.
    /// - [`ErrorKind::TenantAlreadyExists`] if the id is taken.
    pub async fn register_tenant(&self, request: RegisterTenant) -> Result<Tenant> {
        self.ctx.validator.register_tenant(&request)?;
        self.ctx
            .transact("register_tenant", async {
                let mut tx = self.ctx.begin().await?;
                let tenant = Tenant::provisioning(&request, now_millis());
                if let Err(err) = tx.create(&tenant).await {
                    if err.is_unique_violation() {
                        return Err(RegistryError::new(ErrorKind::TenantAlreadyExists)
                            .with("tenant_id", &tenant.id));
                    }
                    return Err(err.into());
                }
                let spec = tenant_job(JobType::TenantProvisioning, &tenant)?;
                let job = self.ctx.orchestrator.prepare_job(&mut tx, spec).await?;
                tx.commit().await?;
                info!(
                    tenant_id = %tenant.id,
                    region = %tenant.region,
                    job_id = %job.id,
                    "tenant registered"
                );
                Ok(tenant)
            })
            .await
    }

    /// # Errors
    ///
    /// [`ErrorKind::InvalidTransition`] unless the tenant is `ACTIVE` or
    /// `BLOCKING_ERROR`.
    pub async fn block_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.begin_transition(
            "block_tenant",
            tenant_id,
            TenantStatus::Blocking,
            JobType::TenantBlock,
        )
        .await
    }

    /// # Errors
    ///
    /// [`ErrorKind::InvalidTransition`] unless the tenant is `BLOCKED` or
    /// `UNBLOCKING_ERROR`.
    pub async fn unblock_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.begin_transition(
            "unblock_tenant",
            tenant_id,
            TenantStatus::Unblocking,
            JobType::TenantUnblock,
        )
        .await
    }

    /// # Errors
    ///
    /// - [`ErrorKind::InvalidTransition`] unless the tenant is `BLOCKED` or
    ///   `TERMINATION_ERROR`.
    /// - [`ErrorKind::TenantHasLinkedSystems`] while any system is linked.
    pub async fn terminate_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.begin_transition(
            "terminate_tenant",
            tenant_id,
            TenantStatus::Terminating,
            JobType::TenantTerminate,
        )
        .await
    }

    /// Re-reads the tenant, moves it into the in-flight `status` and enqueues
    /// `job_type`, all in one transaction.
    async fn begin_transition(
        &self,
        operation: &'static str,
        tenant_id: &str,
        status: TenantStatus,
        job_type: JobType,
    ) -> Result<Tenant> {
        self.ctx.validator.tenant_id(tenant_id)?;
        self.ctx
            .transact(operation, async {
                let mut tx = self.ctx.begin().await?;
                let mut tenant = load_tenant(&mut tx, tenant_id).await?;
                validate_transition(tenant.status, status)
                    .map_err(|e| e.with("tenant_id", tenant_id))?;
                if job_type == JobType::TenantTerminate {
                    let linked = tx
                        .list::<System>(&Query::new().filter("tenant_id", tenant_id).limit(1))
                        .await?;
                    if !linked.is_empty() {
                        return Err(RegistryError::new(ErrorKind::TenantHasLinkedSystems)
                            .with("tenant_id", tenant_id));
                    }
                }
                let from = tenant.status;
                tenant.transition(status, now_millis())?;
                tx.patch(&tenant).await?;
                let spec = tenant_job(job_type, &tenant)?;
                let job = self.ctx.orchestrator.prepare_job(&mut tx, spec).await?;
                tx.commit().await?;
                info!(
                    tenant_id,
                    from = %from,
                    to = %status,
                    job_id = %job.id,
                    "tenant transition started"
                );
                Ok(tenant)
            })
            .await
    }

    /// Merges `labels` into the tenant's labels.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TenantNotActive`] unless the tenant is `ACTIVE`.
    pub async fn set_tenant_labels(&self, tenant_id: &str, labels: Labels) -> Result<Tenant> {
        self.ctx.validator.set_tenant_labels(tenant_id, &labels)?;
        self.update_active("set_tenant_labels", tenant_id, |tenant| {
            merge_labels(&mut tenant.labels, &labels);
        })
        .await
    }

    /// Deletes `keys` from the tenant's labels. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TenantNotActive`] unless the tenant is `ACTIVE`.
    pub async fn remove_tenant_labels(
        &self,
        tenant_id: &str,
        keys: Vec<String>,
    ) -> Result<Tenant> {
        self.ctx.validator.remove_tenant_labels(tenant_id, &keys)?;
        self.update_active("remove_tenant_labels", tenant_id, |tenant| {
            remove_labels(&mut tenant.labels, &keys);
        })
        .await
    }

    /// Replaces the tenant's user-group list.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::TenantNotActive`] unless the tenant is `ACTIVE`.
    pub async fn set_tenant_user_groups(
        &self,
        tenant_id: &str,
        user_groups: Vec<String>,
    ) -> Result<Tenant> {
        self.ctx
            .validator
            .set_tenant_user_groups(tenant_id, &user_groups)?;
        self.update_active("set_tenant_user_groups", tenant_id, move |tenant| {
            tenant.user_groups = user_groups;
        })
        .await
    }

    async fn update_active<F>(
        &self,
        operation: &'static str,
        tenant_id: &str,
        apply: F,
    ) -> Result<Tenant>
    where
        F: FnOnce(&mut Tenant) + Send,
    {
        self.ctx
            .transact(operation, async {
                let mut tx = self.ctx.begin().await?;
                let mut tenant = load_active_tenant(&mut tx, tenant_id).await?;
                apply(&mut tenant);
                tenant.updated_at = now_millis();
                tx.patch(&tenant).await?;
                tx.commit().await?;
                info!(tenant_id, operation, "tenant updated");
                Ok(tenant)
            })
            .await
    }

    /// # Errors
    ///
    /// [`ErrorKind::TenantNotFound`] if absent.
    pub async fn get_tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.ctx.validator.tenant_id(tenant_id)?;
        self.ctx
            .transact("get_tenant", async {
                let mut tx = self.ctx.begin().await?;
                load_tenant(&mut tx, tenant_id).await
            })
            .await
    }

    /// One page of tenants ordered by `(created_at, id)`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidPaginationToken`] for a bad token.
    /// - [`ErrorKind::NoResourcesFound`] if the page is empty.
    pub async fn list_tenants(&self, request: ListTenants) -> Result<Page<Tenant>> {
        let cursor = decode_cursor::<Tenant>(request.page_token.as_deref())?;
        let limit = self.ctx.page_limit(request.limit);
        let query = Query::new()
            .filter_opt("region", request.region.as_deref())
            .filter_opt("owner.id", request.owner_id.as_deref())
            .filter_opt("owner.owner_type", request.owner_type.as_deref())
            .after(cursor)
            .limit(limit + 1);
        self.ctx
            .transact("list_tenants", async {
                let mut tx = self.ctx.begin().await?;
                let rows = tx.list::<Tenant>(&query).await?;
                into_page(rows, limit)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use registry_core::{
        JobStatus, MapSystemToTenant, RegionalSystemStatus, RegisterSystem, Target, Task,
    };

    use super::*;
    use crate::jobs::TenantJobHandler;
    use crate::manager::fixtures::*;
    use crate::manager::SystemManager;
    use crate::orchestrator::{LogExecutor, TaskExecutor};

    /// Every task fails as if the region were unreachable.
    struct DownExecutor;

    #[async_trait]
    impl TaskExecutor for DownExecutor {
        async fn execute(&self, target: &Target, _task: &Task) -> std::result::Result<(), String> {
            Err(format!("region {} unreachable", target.region))
        }
    }

    fn manager(fixture: &Fixture) -> TenantManager {
        TenantManager::new(fixture.ctx.clone())
    }

    fn register_handlers(fixture: &Fixture) {
        register_handler(
            fixture,
            JobType::TENANT,
            Arc::new(TenantJobHandler::new(fixture.ctx.clone())),
        );
    }

    async fn status_of(manager: &TenantManager, id: &str) -> TenantStatus {
        manager.get_tenant(id).await.unwrap().status
    }

    #[tokio::test]
    async fn register_stores_provisioning_and_enqueues_job() {
        let fixture = fixture();
        let tenant = manager(&fixture)
            .register_tenant(tenant_request("t-1"))
            .await
            .unwrap();
        assert_eq!(tenant.status, TenantStatus::Provisioning);

        let jobs = fixture.orchestrator.jobs_for("t-1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::TenantProvisioning);
        assert_eq!(jobs[0].status, JobStatus::Created);
    }

    #[tokio::test]
    async fn duplicate_register_is_already_exists_without_second_job() {
        let fixture = fixture();
        let manager = manager(&fixture);
        manager.register_tenant(tenant_request("t-1")).await.unwrap();

        let err = manager
            .register_tenant(tenant_request("t-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantAlreadyExists);
        assert_eq!(err.code(), registry_core::Code::AlreadyExists);
        assert_eq!(fixture.orchestrator.jobs_for("t-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_rejects_missing_fields_before_storage() {
        let fixture = fixture();
        let mut request = tenant_request("t-1");
        request.name.clear();
        request.role = registry_core::TenantRole::Unspecified;

        let err = manager(&fixture).register_tenant(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(fixture.orchestrator.jobs_for("t-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_provision_block_unblock() {
        let fixture = fixture();
        register_handlers(&fixture);
        let manager = manager(&fixture);
        let executor = LogExecutor;

        manager.register_tenant(tenant_request("t-1")).await.unwrap();
        let job = fixture.orchestrator.jobs_for("t-1").await.unwrap().remove(0);
        let status = fixture.orchestrator.run_job(&job.id, &executor).await.unwrap();
        assert_eq!(status, JobStatus::Done);
        assert_eq!(
            manager.get_tenant("t-1").await.unwrap().status,
            TenantStatus::Active
        );

        let blocking = manager.block_tenant("t-1").await.unwrap();
        assert_eq!(blocking.status, TenantStatus::Blocking);
        assert_eq!(fixture.orchestrator.dispatch_pending(&executor).await, 1);
        assert_eq!(
            manager.get_tenant("t-1").await.unwrap().status,
            TenantStatus::Blocked
        );

        manager.unblock_tenant("t-1").await.unwrap();
        assert_eq!(fixture.orchestrator.dispatch_pending(&executor).await, 1);
        assert_eq!(
            manager.get_tenant("t-1").await.unwrap().status,
            TenantStatus::Active
        );
        let jobs = fixture.orchestrator.jobs_for("t-1").await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Done));
    }

    #[tokio::test]
    async fn block_checks_stored_status() {
        let fixture = fixture();
        let manager = manager(&fixture);
        manager.register_tenant(tenant_request("t-1")).await.unwrap();

        let err = manager.block_tenant("t-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(err.context("from"), Some("PROVISIONING"));
        assert_eq!(err.context("to"), Some("BLOCKING"));
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let fixture = fixture();
        let err = manager(&fixture).block_tenant("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantNotFound);
    }

    #[tokio::test]
    async fn terminate_requires_no_linked_systems() {
        let fixture = fixture();
        let mut tenant = seed_active_tenant(&fixture, "t-1").await;
        let systems = SystemManager::new(fixture.ctx.clone());
        systems
            .register_system(RegisterSystem {
                external_id: "sys-1".into(),
                system_type: "erp".into(),
                region: "eu10".into(),
                l2_key_id: "l2".into(),
                has_l1_key_claim: None,
                status: RegionalSystemStatus::Available,
                labels: BTreeMap::new(),
            })
            .await
            .unwrap();
        systems
            .map_system_to_tenant(MapSystemToTenant {
                external_id: "sys-1".into(),
                system_type: "erp".into(),
                tenant_id: "t-1".into(),
            })
            .await
            .unwrap();

        tenant.status = TenantStatus::Blocked;
        let mut tx = fixture.ctx.begin().await.unwrap();
        tx.patch(&tenant).await.unwrap();
        tx.commit().await.unwrap();

        let err = manager(&fixture).terminate_tenant("t-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantHasLinkedSystems);
        assert_eq!(
            manager(&fixture).get_tenant("t-1").await.unwrap().status,
            TenantStatus::Blocked
        );
    }

    #[tokio::test]
    async fn labels_and_groups_require_active() {
        let fixture = fixture();
        let manager = manager(&fixture);
        seed_active_tenant(&fixture, "t-1").await;

        let labels = BTreeMap::from([
            ("env".to_string(), "prod".to_string()),
            ("tier".to_string(), "gold".to_string()),
        ]);
        manager.set_tenant_labels("t-1", labels).await.unwrap();
        let tenant = manager
            .remove_tenant_labels("t-1", vec!["tier".into(), "absent".into()])
            .await
            .unwrap();
        assert_eq!(
            tenant.labels,
            BTreeMap::from([("env".to_string(), "prod".to_string())])
        );

        let tenant = manager
            .set_tenant_user_groups("t-1", vec!["admins".into()])
            .await
            .unwrap();
        assert_eq!(tenant.user_groups, vec!["admins".to_string()]);

        manager.block_tenant("t-1").await.unwrap();
        let err = manager
            .set_tenant_user_groups("t-1", vec!["ops".into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TenantNotActive);
    }

    #[tokio::test]
    async fn list_pages_without_overlap_or_gap() {
        let fixture = fixture();
        let manager = manager(&fixture);
        for i in 0..5 {
            manager
                .register_tenant(tenant_request(&format!("t-{i}")))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = manager
                .list_tenants(ListTenants {
                    limit: 2,
                    page_token: token.clone(),
                    ..ListTenants::default()
                })
                .await
                .unwrap();
            assert!(page.items.len() <= 2);
            seen.extend(page.items.into_iter().map(|t| t.id));
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["t-0", "t-1", "t-2", "t-3", "t-4"]);
    }

    #[tokio::test]
    async fn list_filters_and_reports_empty_as_not_found() {
        let fixture = fixture();
        let manager = manager(&fixture);
        manager.register_tenant(tenant_request("t-1")).await.unwrap();
        let mut other = tenant_request("t-2");
        other.region = "us10".into();
        other.owner.owner_type = "partner".into();
        manager.register_tenant(other).await.unwrap();

        let page = manager
            .list_tenants(ListTenants {
                owner_type: Some("partner".into()),
                ..ListTenants::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "t-2");
        assert!(page.next_page_token.is_none());

        let err = manager
            .list_tenants(ListTenants {
                region: Some("ap10".into()),
                ..ListTenants::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResourcesFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_register_has_one_winner() {
        let fixture = fixture();
        let first = manager(&fixture);
        let second = first.clone();

        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.register_tenant(tenant_request("t-1")).await }),
            tokio::spawn(async move { second.register_tenant(tenant_request("t-1")).await }),
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.kind(), ErrorKind::TenantAlreadyExists);
        assert_eq!(fixture.orchestrator.jobs_for("t-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_provisioning_records_error() {
        let fixture = fixture();
        register_handlers(&fixture);
        let manager = manager(&fixture);

        manager.register_tenant(tenant_request("t-1")).await.unwrap();
        assert_eq!(fixture.orchestrator.dispatch_pending(&DownExecutor).await, 1);
        assert_eq!(status_of(&manager, "t-1").await, TenantStatus::ProvisioningError);

        let jobs = fixture.orchestrator.jobs_for("t-1").await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].error_message.as_deref(), Some("region eu10 unreachable"));
    }

    #[tokio::test]
    async fn failed_block_records_error() {
        let fixture = fixture();
        register_handlers(&fixture);
        let manager = manager(&fixture);
        seed_active_tenant(&fixture, "t-1").await;

        manager.block_tenant("t-1").await.unwrap();
        assert_eq!(fixture.orchestrator.dispatch_pending(&DownExecutor).await, 1);
        assert_eq!(status_of(&manager, "t-1").await, TenantStatus::BlockingError);

        // BLOCKING_ERROR may retry the block.
        manager.block_tenant("t-1").await.unwrap();
        assert_eq!(fixture.orchestrator.dispatch_pending(&LogExecutor).await, 1);
        assert_eq!(status_of(&manager, "t-1").await, TenantStatus::Blocked);
    }

    #[tokio::test]
    async fn terminate_runs_to_terminated() {
        let fixture = fixture();
        register_handlers(&fixture);
        let manager = manager(&fixture);
        seed_active_tenant(&fixture, "t-1").await;

        manager.block_tenant("t-1").await.unwrap();
        fixture.orchestrator.dispatch_pending(&LogExecutor).await;
        let terminating = manager.terminate_tenant("t-1").await.unwrap();
        assert_eq!(terminating.status, TenantStatus::Terminating);

        assert_eq!(fixture.orchestrator.dispatch_pending(&LogExecutor).await, 1);
        assert_eq!(status_of(&manager, "t-1").await, TenantStatus::Terminated);
        let err = manager.terminate_tenant("t-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn failed_terminate_records_error() {
        let fixture = fixture();
        register_handlers(&fixture);
        let manager = manager(&fixture);
        seed_active_tenant(&fixture, "t-1").await;

        manager.block_tenant("t-1").await.unwrap();
        fixture.orchestrator.dispatch_pending(&LogExecutor).await;
        manager.terminate_tenant("t-1").await.unwrap();
        assert_eq!(fixture.orchestrator.dispatch_pending(&DownExecutor).await, 1);
        assert_eq!(status_of(&manager, "t-1").await, TenantStatus::TerminationError);
    }
}
