//! Background dispatch of pending jobs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::local::LocalOrchestrator;
use super::TaskExecutor;
use crate::service::worker::BackgroundRunnable;

/// Work accepted by [`JobDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchTask {
    /// Run one job now.
    RunJob { job_id: String },
    /// Sweep every pending job.
    RunPending,
}

/// Runs jobs through the [`LocalOrchestrator`] on demand and on every tick.
pub struct JobDispatcher {
    orchestrator: Arc<LocalOrchestrator>,
    executor: Arc<dyn TaskExecutor>,
}

impl JobDispatcher {
    #[must_use]
    pub fn new(orchestrator: Arc<LocalOrchestrator>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            orchestrator,
            executor,
        }
    }

    async fn sweep(&self) {
        let finished = self
            .orchestrator
            .dispatch_pending(self.executor.as_ref())
            .await;
        if finished > 0 {
            debug!(finished, "dispatched pending jobs");
        }
    }
}

#[async_trait]
impl BackgroundRunnable for JobDispatcher {
    type Task = DispatchTask;

    async fn run(&mut self, task: DispatchTask) {
        match task {
            DispatchTask::RunJob { job_id } => {
                if let Err(err) = self
                    .orchestrator
                    .run_job(&job_id, self.executor.as_ref())
                    .await
                {
                    warn!(job_id = %job_id, error = %err, "job run failed");
                }
            }
            DispatchTask::RunPending => self.sweep().await,
        }
    }

    async fn on_tick(&mut self) {
        self.sweep().await;
    }
}
