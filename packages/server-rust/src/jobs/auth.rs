//! Auth job adapter.

use async_trait::async_trait;
use registry_core::types::now_millis;
use registry_core::{
    Auth, AuthJobPayload, AuthStatus, ConfirmOutcome, Job, JobSpec, JobType, Result,
    TargetsByRegion, Task, TaskResolution, Tenant,
};
use tracing::{error, info, warn};

use crate::manager::ManagerContext;
use crate::orchestrator::JobHandler;

/// Builds the [`JobSpec`] for an auth job.
///
/// # Errors
///
/// [`registry_core::ErrorKind::PayloadEncoding`] if the payload cannot be encoded.
pub fn auth_job(job_type: JobType, auth: &Auth) -> Result<JobSpec> {
    JobSpec::new(job_type, &auth.external_id, &AuthJobPayload::from(auth))
}

/// Status an auth holds while a job of this type is in flight. Outcomes
/// only land on an auth still in that status.
const fn in_flight_status(job_type: JobType) -> Option<AuthStatus> {
    match job_type {
        JobType::AuthApply => Some(AuthStatus::Applying),
        JobType::AuthRemove => Some(AuthStatus::Removing),
        _ => None,
    }
}

/// Drives auth status from job outcomes.
#[derive(Debug, Clone)]
pub struct AuthJobHandler {
    ctx: ManagerContext,
}

impl AuthJobHandler {
    #[must_use]
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    async fn find_auth(&self, external_id: &str) -> Result<Option<Auth>> {
        self.ctx
            .transact("auth_job_lookup", async {
                let mut tx = self.ctx.begin().await?;
                Ok(tx.find::<Auth>(&[external_id]).await?)
            })
            .await
    }

    async fn find_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        self.ctx
            .transact("auth_job_tenant_lookup", async {
                let mut tx = self.ctx.begin().await?;
                Ok(tx.find::<Tenant>(&[tenant_id]).await?)
            })
            .await
    }

    async fn apply_outcome(&self, job: &Job, status: AuthStatus) -> Result<()> {
        let Some(expected) = in_flight_status(job.job_type) else {
            warn!(job_id = %job.id, job_type = %job.job_type, "job type not handled by auths");
            return Ok(());
        };
        let message = if status == AuthStatus::Applied || status == AuthStatus::Removed {
            None
        } else {
            job.error_message.clone()
        };
        self.ctx
            .transact("auth_job_outcome", async {
                let mut tx = self.ctx.begin().await?;
                let found = tx.find::<Auth>(&[job.external_id.as_str()]).await?;
                let Some(mut auth) = found else {
                    warn!(
                        external_id = %job.external_id,
                        job_id = %job.id,
                        "auth missing for job outcome"
                    );
                    return Ok(());
                };
                if !auth.status.is_updatable() {
                    warn!(
                        external_id = %auth.external_id,
                        job_id = %job.id,
                        status = %auth.status,
                        outcome = %status,
                        "auth no longer accepts updates, outcome dropped"
                    );
                    return Ok(());
                }
                if auth.status != expected {
                    warn!(
                        external_id = %auth.external_id,
                        job_id = %job.id,
                        status = %auth.status,
                        expected = %expected,
                        outcome = %status,
                        "stale auth job outcome dropped"
                    );
                    return Ok(());
                }
                let from = auth.status;
                auth.set_status(status, message, now_millis());
                tx.patch(&auth).await?;
                tx.commit().await?;
                info!(external_id = %auth.external_id, from = %from, to = %status, "auth status updated");
                Ok(())
            })
            .await
    }

    async fn apply_failure(&self, job: &Job, outcome: &'static str) -> Result<()> {
        let status = match job.job_type {
            JobType::AuthApply => AuthStatus::ApplyingError,
            JobType::AuthRemove => AuthStatus::RemovingError,
            other => {
                warn!(job_id = %job.id, job_type = %other, "job type not handled by auths");
                return Ok(());
            }
        };
        error!(
            external_id = %job.external_id,
            job_id = %job.id,
            job_type = %job.job_type,
            outcome,
            error_message = job.error_message.as_deref().unwrap_or(""),
            "auth job did not complete"
        );
        self.apply_outcome(job, status).await
    }
}

#[async_trait]
impl JobHandler for AuthJobHandler {
    async fn confirm_job(&self, job: &Job) -> Result<ConfirmOutcome> {
        match job.job_type {
            JobType::AuthApply => Ok(ConfirmOutcome::Done),
            JobType::AuthRemove => Ok(match self.find_auth(&job.external_id).await? {
                None => ConfirmOutcome::Canceled {
                    reason: format!("auth {} not found", job.external_id),
                },
                Some(auth) if auth.status != AuthStatus::Removing => ConfirmOutcome::Canceled {
                    reason: format!(
                        "auth {} is {}, expected {}",
                        auth.external_id,
                        auth.status,
                        AuthStatus::Removing
                    ),
                },
                Some(_) => ConfirmOutcome::Done,
            }),
            other => Ok(ConfirmOutcome::Canceled {
                reason: format!("job type {other} is not an auth job"),
            }),
        }
    }

    async fn resolve_tasks(&self, job: &Job, targets: &TargetsByRegion) -> Result<TaskResolution> {
        let payload: AuthJobPayload = match job.decode_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return Ok(TaskResolution::Canceled {
                    reason: format!("malformed auth job payload: {err}"),
                })
            }
        };
        let Some(tenant) = self.find_tenant(&payload.tenant_id).await? else {
            return Ok(TaskResolution::Canceled {
                reason: format!("tenant {} not found", payload.tenant_id),
            });
        };
        if !targets.contains_key(&tenant.region) {
            return Ok(TaskResolution::Canceled {
                reason: format!("no target configured for region {}", tenant.region),
            });
        }
        Ok(TaskResolution::Tasks {
            tasks: vec![Task {
                data: job.payload.clone(),
                task_type: job.job_type,
                target: tenant.region,
            }],
            done: true,
        })
    }

    async fn handle_job_done(&self, job: &Job) -> Result<()> {
        match job.job_type {
            JobType::AuthApply => self.apply_outcome(job, AuthStatus::Applied).await,
            JobType::AuthRemove => self.apply_outcome(job, AuthStatus::Removed).await,
            other => {
                warn!(job_id = %job.id, job_type = %other, "job type not handled by auths");
                Ok(())
            }
        }
    }

    async fn handle_job_failed(&self, job: &Job) -> Result<()> {
        self.apply_failure(job, "failed").await
    }

    async fn handle_job_canceled(&self, job: &Job) -> Result<()> {
        self.apply_failure(job, "canceled").await
    }
}
