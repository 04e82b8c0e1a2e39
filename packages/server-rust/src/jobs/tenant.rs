//! Tenant job adapter.

use async_trait::async_trait;
use registry_core::types::now_millis;
use registry_core::{
    ConfirmOutcome, Job, JobSpec, JobType, Result, TargetsByRegion, Task, TaskResolution, Tenant,
    TenantJobPayload, TenantStatus,
};
use tracing::{debug, error, info, warn};

use crate::manager::ManagerContext;
use crate::orchestrator::JobHandler;

/// Builds the [`JobSpec`] for a tenant job.
///
/// # Errors
///
/// [`registry_core::ErrorKind::PayloadEncoding`] if the payload cannot be encoded.
pub fn tenant_job(job_type: JobType, tenant: &Tenant) -> Result<JobSpec> {
    JobSpec::new(job_type, &tenant.id, &TenantJobPayload::from(tenant))
}

/// Status a tenant must hold while a job of this type is in flight.
/// Provisioning has none: its confirm always succeeds.
const fn in_flight_status(job_type: JobType) -> Option<TenantStatus> {
    match job_type {
        JobType::TenantBlock => Some(TenantStatus::Blocking),
        JobType::TenantUnblock => Some(TenantStatus::Unblocking),
        JobType::TenantTerminate => Some(TenantStatus::Terminating),
        _ => None,
    }
}

const fn done_status(job_type: JobType) -> Option<TenantStatus> {
    match job_type {
        JobType::TenantProvisioning | JobType::TenantUnblock => Some(TenantStatus::Active),
        JobType::TenantBlock => Some(TenantStatus::Blocked),
        JobType::TenantTerminate => Some(TenantStatus::Terminated),
        JobType::AuthApply | JobType::AuthRemove => None,
    }
}

const fn error_status(job_type: JobType) -> Option<TenantStatus> {
    match job_type {
        JobType::TenantProvisioning => Some(TenantStatus::ProvisioningError),
        JobType::TenantBlock => Some(TenantStatus::BlockingError),
        JobType::TenantUnblock => Some(TenantStatus::UnblockingError),
        JobType::TenantTerminate => Some(TenantStatus::TerminationError),
        JobType::AuthApply | JobType::AuthRemove => None,
    }
}

/// Drives tenant status from job outcomes.
#[derive(Debug, Clone)]
pub struct TenantJobHandler {
    ctx: ManagerContext,
}

impl TenantJobHandler {
    #[must_use]
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        self.ctx
            .transact("tenant_job_lookup", async {
                let mut tx = self.ctx.begin().await?;
                Ok(tx.find::<Tenant>(&[tenant_id]).await?)
            })
            .await
    }

    async fn apply_outcome(&self, job: &Job, target: Option<TenantStatus>) -> Result<()> {
        let Some(target) = target else {
            warn!(job_id = %job.id, job_type = %job.job_type, "job type not handled by tenants");
            return Ok(());
        };
        self.ctx
            .transact("tenant_job_outcome", async {
                let mut tx = self.ctx.begin().await?;
                let found = tx.find::<Tenant>(&[job.external_id.as_str()]).await?;
                let Some(mut tenant) = found else {
                    warn!(
                        tenant_id = %job.external_id,
                        job_id = %job.id,
                        "tenant missing for job outcome"
                    );
                    return Ok(());
                };
                if tenant.status == target {
                    debug!(tenant_id = %tenant.id, status = %target, "job outcome already applied");
                    return Ok(());
                }
                let from = tenant.status;
                if !from.can_transition_to(target) {
                    warn!(
                        tenant_id = %tenant.id,
                        job_id = %job.id,
                        status = %from,
                        outcome = %target,
                        "stale tenant job outcome dropped"
                    );
                    return Ok(());
                }
                tenant.transition(target, now_millis())?;
                tx.patch(&tenant).await?;
                tx.commit().await?;
                info!(tenant_id = %tenant.id, from = %from, to = %target, "tenant status updated");
                Ok(())
            })
            .await
    }

    async fn apply_failure(&self, job: &Job, outcome: &'static str) -> Result<()> {
        error!(
            tenant_id = %job.external_id,
            job_id = %job.id,
            job_type = %job.job_type,
            outcome,
            error_message = job.error_message.as_deref().unwrap_or(""),
            "tenant job did not complete"
        );
        self.apply_outcome(job, error_status(job.job_type)).await
    }
}

#[async_trait]
impl JobHandler for TenantJobHandler {
    async fn confirm_job(&self, job: &Job) -> Result<ConfirmOutcome> {
        if matches!(job.job_type, JobType::TenantProvisioning | JobType::AuthApply) {
            return Ok(ConfirmOutcome::Done);
        }
        let Some(expected) = in_flight_status(job.job_type) else {
            return Ok(ConfirmOutcome::Canceled {
                reason: format!("job type {} is not a tenant job", job.job_type),
            });
        };
        Ok(match self.find_tenant(&job.external_id).await? {
            None => ConfirmOutcome::Canceled {
                reason: format!("tenant {} not found", job.external_id),
            },
            Some(tenant) if tenant.status != expected => ConfirmOutcome::Canceled {
                reason: format!(
                    "tenant {} is {}, expected {}",
                    tenant.id, tenant.status, expected
                ),
            },
            Some(_) => ConfirmOutcome::Done,
        })
    }

    async fn resolve_tasks(&self, job: &Job, targets: &TargetsByRegion) -> Result<TaskResolution> {
        let payload: TenantJobPayload = match job.decode_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(TaskResolution::Canceled {
                    reason: format!("malformed tenant job payload: {err}"),
                })
            }
        };
        if !targets.contains_key(&payload.region) {
            return Ok(TaskResolution::Canceled {
                reason: format!("no target configured for region {}", payload.region),
            });
        }
        Ok(TaskResolution::Tasks {
            tasks: vec![Task {
                data: job.payload.clone(),
                task_type: job.job_type,
                target: payload.region,
            }],
            done: true,
        })
    }

    async fn handle_job_done(&self, job: &Job) -> Result<()> {
        self.apply_outcome(job, done_status(job.job_type)).await
    }

    async fn handle_job_failed(&self, job: &Job) -> Result<()> {
        self.apply_failure(job, "failed").await
    }

    async fn handle_job_canceled(&self, job: &Job) -> Result<()> {
        self.apply_failure(job, "canceled").await
    }
}
