//! Job orchestration contract.
//!
//! Managers enqueue work with [`Orchestrator::prepare_job`] inside their own
//! transaction, so a job exists exactly when the triggering change commits.
//! The orchestrator later drives each job through the registered
//! [`JobHandler`]: confirm, resolve tasks, execute them against regional
//! targets, then one terminal callback.

pub mod dispatch;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use registry_core::{
    ConfirmOutcome, Job, JobSpec, JobType, Result, Target, TargetsByRegion, Task, TaskResolution,
};

use crate::repository::Transaction;

pub use dispatch::{DispatchTask, JobDispatcher};
pub use local::{LocalOrchestrator, LogExecutor};

/// Per-manager callbacks invoked while a job runs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Decides whether the job may proceed.
    async fn confirm_job(&self, job: &Job) -> Result<ConfirmOutcome>;

    /// Splits the job into tasks for regional targets.
    async fn resolve_tasks(&self, job: &Job, targets: &TargetsByRegion) -> Result<TaskResolution>;

    async fn handle_job_done(&self, job: &Job) -> Result<()>;

    /// `job.error_message` carries the failure reason.
    async fn handle_job_failed(&self, job: &Job) -> Result<()>;

    /// `job.error_message` carries the cancellation reason.
    async fn handle_job_canceled(&self, job: &Job) -> Result<()>;
}

/// The orchestrator as seen by managers.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// # Errors
    ///
    /// [`registry_core::ErrorKind::AlreadyExists`] if `job_type` already has a
    /// handler.
    fn register_job_handler(&self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Result<()>;

    /// Persists a new job through the caller's transaction.
    ///
    /// # Errors
    ///
    /// Repository failures.
    async fn prepare_job(&self, tx: &mut Transaction, spec: JobSpec) -> Result<Job>;
}

/// Executes one task against a regional target.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// # Errors
    ///
    /// A human-readable failure reason, recorded on the job.
    async fn execute(&self, target: &Target, task: &Task) -> std::result::Result<(), String>;
}
