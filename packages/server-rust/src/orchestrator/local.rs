//! In-process orchestrator.
//!
//! Jobs live in the registry's own repository. [`LocalOrchestrator::run_job`]
//! drives one job through the handler protocol, persisting each status change
//! in a transaction of its own; no transaction is held while a handler runs.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use registry_core::types::now_millis;
use registry_core::{
    ConfirmOutcome, ErrorKind, Job, JobSpec, JobStatus, JobType, RegistryError, Result, Target,
    TargetsByRegion, Task, TaskResolution,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{JobHandler, Orchestrator, TaskExecutor};
use crate::repository::{Query, Repository, Transaction};

/// Upper bound on resolve/execute rounds for handlers that report `done: false`.
const MAX_RESOLVE_ROUNDS: usize = 16;

// ---------------------------------------------------------------------------
// LocalOrchestrator
// ---------------------------------------------------------------------------

pub struct LocalOrchestrator {
    repo: Arc<dyn Repository>,
    handlers: DashMap<JobType, Arc<dyn JobHandler>>,
    targets: TargetsByRegion,
}

impl LocalOrchestrator {
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>, targets: TargetsByRegion) -> Self {
        Self {
            repo,
            handlers: DashMap::new(),
            targets,
        }
    }

    #[must_use]
    pub fn targets(&self) -> &TargetsByRegion {
        &self.targets
    }

    fn handler(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).map(|h| Arc::clone(h.value()))
    }

    /// # Errors
    ///
    /// [`ErrorKind::JobNotFound`] for an unknown id.
    pub async fn job(&self, job_id: &str) -> Result<Job> {
        let mut tx = self.repo.begin().await?;
        tx.find::<Job>(&[job_id])
            .await?
            .ok_or_else(|| RegistryError::new(ErrorKind::JobNotFound).with("job_id", job_id))
    }

    /// Jobs enqueued for one entity, oldest first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn jobs_for(&self, external_id: &str) -> Result<Vec<Job>> {
        let mut tx = self.repo.begin().await?;
        Ok(tx
            .list::<Job>(&Query::new().filter("external_id", external_id))
            .await?)
    }

    /// Non-terminal jobs, oldest first.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn pending_jobs(&self) -> Result<Vec<Job>> {
        let mut tx = self.repo.begin().await?;
        let jobs = tx.list::<Job>(&Query::new()).await?;
        Ok(jobs.into_iter().filter(|j| !j.status.is_terminal()).collect())
    }

    async fn store(&self, job: &Job) -> Result<()> {
        let mut tx = self.repo.begin().await?;
        tx.patch(job).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Runs the terminal callback, then records the terminal status. A failed
    /// callback leaves the stored job untouched so a later run retries it.
    async fn finish(
        &self,
        handler: &dyn JobHandler,
        mut job: Job,
        status: JobStatus,
        message: Option<String>,
    ) -> Result<JobStatus> {
        job.status = status;
        job.error_message = message;
        job.updated_at = now_millis();

        let outcome = match status {
            JobStatus::Done => handler.handle_job_done(&job).await,
            JobStatus::Failed => handler.handle_job_failed(&job).await,
            JobStatus::Canceled => handler.handle_job_canceled(&job).await,
            JobStatus::Created | JobStatus::Confirmed => Ok(()),
        };
        if let Err(err) = outcome {
            warn!(
                job_id = %job.id,
                job_type = %job.job_type,
                status = %status,
                error = %err,
                "terminal callback failed"
            );
            return Err(err);
        }

        self.store(&job).await?;
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            external_id = %job.external_id,
            status = %status,
            "job finished"
        );
        Ok(status)
    }

    async fn execute_all(
        &self,
        tasks: &[Task],
        executor: &dyn TaskExecutor,
    ) -> std::result::Result<(), String> {
        for task in tasks {
            let target = self
                .targets
                .get(&task.target)
                .ok_or_else(|| format!("no target configured for region {}", task.target))?;
            executor.execute(target, task).await?;
        }
        Ok(())
    }

    /// Drives one job to a terminal status.
    ///
    /// Returns the job's status afterwards. A job whose type has no handler
    /// is left pending.
    ///
    /// # Errors
    ///
    /// Lookup and repository failures, and handler errors. After a handler
    /// error the job keeps its last stored status.
    pub async fn run_job(&self, job_id: &str, executor: &dyn TaskExecutor) -> Result<JobStatus> {
        let mut job = self.job(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job.status);
        }
        let Some(handler) = self.handler(job.job_type) else {
            warn!(job_id, job_type = %job.job_type, "no handler registered, job left pending");
            return Ok(job.status);
        };

        if job.status == JobStatus::Created {
            match handler.confirm_job(&job).await? {
                ConfirmOutcome::Done => {
                    job.status = JobStatus::Confirmed;
                    job.updated_at = now_millis();
                    self.store(&job).await?;
                    debug!(job_id, job_type = %job.job_type, "job confirmed");
                }
                ConfirmOutcome::Canceled { reason } => {
                    return self
                        .finish(handler.as_ref(), job, JobStatus::Canceled, Some(reason))
                        .await;
                }
            }
        }

        for _ in 0..MAX_RESOLVE_ROUNDS {
            match handler.resolve_tasks(&job, &self.targets).await? {
                TaskResolution::Canceled { reason } => {
                    return self
                        .finish(handler.as_ref(), job, JobStatus::Canceled, Some(reason))
                        .await;
                }
                TaskResolution::Tasks { tasks, done } => {
                    if let Err(reason) = self.execute_all(&tasks, executor).await {
                        return self
                            .finish(handler.as_ref(), job, JobStatus::Failed, Some(reason))
                            .await;
                    }
                    if done {
                        return self
                            .finish(handler.as_ref(), job, JobStatus::Done, None)
                            .await;
                    }
                }
            }
        }

        let reason = format!("tasks not resolved within {MAX_RESOLVE_ROUNDS} rounds");
        self.finish(handler.as_ref(), job, JobStatus::Failed, Some(reason))
            .await
    }

    /// Cancels a pending job and fires its cancel callback.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidTransition`] if the job already finished.
    pub async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<()> {
        let mut job = self.job(job_id).await?;
        if job.status.is_terminal() {
            return Err(RegistryError::new(ErrorKind::InvalidTransition)
                .with("job_id", job_id)
                .with("from", job.status)
                .with("to", JobStatus::Canceled));
        }
        match self.handler(job.job_type) {
            Some(handler) => {
                self.finish(
                    handler.as_ref(),
                    job,
                    JobStatus::Canceled,
                    Some(reason.to_string()),
                )
                .await?;
            }
            None => {
                job.status = JobStatus::Canceled;
                job.error_message = Some(reason.to_string());
                job.updated_at = now_millis();
                self.store(&job).await?;
            }
        }
        Ok(())
    }

    /// Runs every pending job once. Returns how many reached a terminal status.
    pub async fn dispatch_pending(&self, executor: &dyn TaskExecutor) -> usize {
        let jobs = match self.pending_jobs().await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(error = %err, "failed to load pending jobs");
                return 0;
            }
        };
        let mut finished = 0;
        for job in jobs {
            match self.run_job(&job.id, executor).await {
                Ok(status) if status.is_terminal() => finished += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(job_id = %job.id, job_type = %job.job_type, error = %err, "job run failed");
                }
            }
        }
        finished
    }
}

#[async_trait]
impl Orchestrator for LocalOrchestrator {
    fn register_job_handler(&self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Result<()> {
        match self.handlers.entry(job_type) {
            Entry::Occupied(_) => {
                Err(RegistryError::new(ErrorKind::AlreadyExists).with("job_type", job_type))
            }
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    async fn prepare_job(&self, tx: &mut Transaction, spec: JobSpec) -> Result<Job> {
        let now = now_millis();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            external_id: spec.external_id,
            job_type: spec.job_type,
            payload: spec.payload,
            status: JobStatus::Created,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        tx.create(&job).await?;
        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            external_id = %job.external_id,
            "job prepared"
        );
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// LogExecutor
// ---------------------------------------------------------------------------

/// Executor that only logs each task. Used when no regional transport is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExecutor;

#[async_trait]
impl TaskExecutor for LogExecutor {
    async fn execute(&self, target: &Target, task: &Task) -> std::result::Result<(), String> {
        info!(
            region = %target.region,
            endpoint = %target.endpoint,
            task_type = %task.task_type,
            "executing task"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::repository::MemoryRepository;

    /// Handler with scripted answers that records every callback.
    struct ScriptedHandler {
        confirm: ConfirmOutcome,
        region: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedHandler {
        fn new(confirm: ConfirmOutcome, region: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                confirm,
                region,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn confirm_job(&self, _job: &Job) -> Result<ConfirmOutcome> {
            self.calls.lock().push("confirm".into());
            Ok(self.confirm.clone())
        }

        async fn resolve_tasks(
            &self,
            job: &Job,
            _targets: &TargetsByRegion,
        ) -> Result<TaskResolution> {
            self.calls.lock().push("resolve".into());
            Ok(match self.region {
                Some(region) => TaskResolution::Tasks {
                    tasks: vec![Task {
                        data: job.payload.clone(),
                        task_type: job.job_type,
                        target: region.to_string(),
                    }],
                    done: true,
                },
                None => TaskResolution::Canceled {
                    reason: "no region".into(),
                },
            })
        }

        async fn handle_job_done(&self, _job: &Job) -> Result<()> {
            self.calls.lock().push("done".into());
            Ok(())
        }

        async fn handle_job_failed(&self, job: &Job) -> Result<()> {
            let message = job.error_message.clone().unwrap_or_default();
            self.calls.lock().push(format!("failed:{message}"));
            Ok(())
        }

        async fn handle_job_canceled(&self, job: &Job) -> Result<()> {
            let message = job.error_message.clone().unwrap_or_default();
            self.calls.lock().push(format!("canceled:{message}"));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingExecutor {
        fail_with: Option<String>,
        executed: Mutex<Vec<(String, JobType)>>,
    }

    #[async_trait]
    impl TaskExecutor for RecordingExecutor {
        async fn execute(&self, target: &Target, task: &Task) -> std::result::Result<(), String> {
            self.executed
                .lock()
                .push((target.region.clone(), task.task_type));
            match &self.fail_with {
                Some(reason) => Err(reason.clone()),
                None => Ok(()),
            }
        }
    }

    fn setup() -> (Arc<MemoryRepository>, LocalOrchestrator) {
        let repo = Arc::new(MemoryRepository::new());
        let targets = TargetsByRegion::from([(
            "eu10".to_string(),
            Target {
                region: "eu10".into(),
                endpoint: "https://eu10.example".into(),
            },
        )]);
        let orchestrator = LocalOrchestrator::new(repo.clone(), targets);
        (repo, orchestrator)
    }

    async fn enqueue(repo: &MemoryRepository, orchestrator: &LocalOrchestrator) -> Job {
        let mut tx = repo.begin().await.unwrap();
        let spec = JobSpec::new(JobType::TenantBlock, "t-1", &"payload").unwrap();
        let job = orchestrator.prepare_job(&mut tx, spec).await.unwrap();
        tx.commit().await.unwrap();
        job
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (_repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(ConfirmOutcome::Done, Some("eu10"));
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler.clone())
            .unwrap();
        let err = orchestrator
            .register_job_handler(JobType::TenantBlock, handler)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn job_exists_only_if_transaction_commits() {
        let (repo, orchestrator) = setup();
        {
            let mut tx = repo.begin().await.unwrap();
            let spec = JobSpec::new(JobType::TenantBlock, "t-1", &"payload").unwrap();
            orchestrator.prepare_job(&mut tx, spec).await.unwrap();
        }
        assert!(orchestrator.pending_jobs().await.unwrap().is_empty());

        let job = enqueue(&repo, &orchestrator).await;
        let stored = orchestrator.job(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Created);
    }

    #[tokio::test]
    async fn successful_run_calls_done() {
        let (repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(ConfirmOutcome::Done, Some("eu10"));
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler.clone())
            .unwrap();
        let job = enqueue(&repo, &orchestrator).await;

        let executor = RecordingExecutor::default();
        let status = orchestrator.run_job(&job.id, &executor).await.unwrap();

        assert_eq!(status, JobStatus::Done);
        assert_eq!(handler.calls(), ["confirm", "resolve", "done"]);
        assert_eq!(
            executor.executed.lock().clone(),
            [("eu10".to_string(), JobType::TenantBlock)]
        );
        assert_eq!(orchestrator.job(&job.id).await.unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn canceled_confirm_skips_tasks() {
        let (repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(
            ConfirmOutcome::Canceled {
                reason: "wrong status".into(),
            },
            Some("eu10"),
        );
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler.clone())
            .unwrap();
        let job = enqueue(&repo, &orchestrator).await;

        let status = orchestrator
            .run_job(&job.id, &RecordingExecutor::default())
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Canceled);
        assert_eq!(handler.calls(), ["confirm", "canceled:wrong status"]);
        let stored = orchestrator.job(&job.id).await.unwrap();
        assert_eq!(stored.error_message.as_deref(), Some("wrong status"));
    }

    #[tokio::test]
    async fn executor_failure_fails_job() {
        let (repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(ConfirmOutcome::Done, Some("eu10"));
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler.clone())
            .unwrap();
        let job = enqueue(&repo, &orchestrator).await;

        let executor = RecordingExecutor {
            fail_with: Some("target unreachable".into()),
            ..RecordingExecutor::default()
        };
        let status = orchestrator.run_job(&job.id, &executor).await.unwrap();

        assert_eq!(status, JobStatus::Failed);
        assert_eq!(
            handler.calls(),
            ["confirm", "resolve", "failed:target unreachable"]
        );
    }

    #[tokio::test]
    async fn task_for_unknown_region_fails_job() {
        let (repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(ConfirmOutcome::Done, Some("ap20"));
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler.clone())
            .unwrap();
        let job = enqueue(&repo, &orchestrator).await;

        let status = orchestrator
            .run_job(&job.id, &RecordingExecutor::default())
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Failed);
        let stored = orchestrator.job(&job.id).await.unwrap();
        assert_eq!(
            stored.error_message.as_deref(),
            Some("no target configured for region ap20")
        );
    }

    #[tokio::test]
    async fn job_without_handler_stays_pending() {
        let (repo, orchestrator) = setup();
        let job = enqueue(&repo, &orchestrator).await;
        let status = orchestrator
            .run_job(&job.id, &RecordingExecutor::default())
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Created);
        assert_eq!(orchestrator.pending_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_pending_then_reject_second_cancel() {
        let (repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(ConfirmOutcome::Done, Some("eu10"));
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler.clone())
            .unwrap();
        let job = enqueue(&repo, &orchestrator).await;

        orchestrator.cancel_job(&job.id, "operator").await.unwrap();
        assert_eq!(handler.calls(), ["canceled:operator"]);

        let err = orchestrator.cancel_job(&job.id, "again").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn dispatch_pending_finishes_every_job() {
        let (repo, orchestrator) = setup();
        let handler = ScriptedHandler::new(ConfirmOutcome::Done, Some("eu10"));
        orchestrator
            .register_job_handler(JobType::TenantBlock, handler)
            .unwrap();
        enqueue(&repo, &orchestrator).await;
        enqueue(&repo, &orchestrator).await;

        let finished = orchestrator.dispatch_pending(&LogExecutor).await;
        assert_eq!(finished, 2);
        assert!(orchestrator.pending_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_job_id_is_not_found() {
        let (_repo, orchestrator) = setup();
        let err = orchestrator.job("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::JobNotFound);
    }
}
