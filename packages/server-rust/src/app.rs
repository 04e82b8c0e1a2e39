//! Registry assembly.
//!
//! [`RegistryApp`] builds the repository, orchestrator, managers and domain
//! services, initializes them in order, and exposes the layered operation
//! pipeline through [`RegistryApp::call`]. A background [`JobDispatcher`]
//! drives enqueued jobs until shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use registry_core::Validator;
use tokio::sync::Mutex;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use crate::jobs::{AuthJobHandler, TenantJobHandler};
use crate::lifecycle::{HealthState, Lifecycle};
use crate::manager::{AuthManager, ManagerContext, SystemManager, TenantManager};
use crate::orchestrator::{DispatchTask, JobDispatcher, LocalOrchestrator, TaskExecutor};
use crate::repository::{MemoryRepository, Repository};
use crate::service::{
    build_operation_pipeline, service_names, AuthService, BackgroundWorker, Operation,
    OperationContext, OperationError, OperationPipeline, OperationResponse, OperationRouter,
    RegistryConfig, ServiceContext, ServiceRegistry, SystemService, TenantService,
};
use crate::telemetry;

pub struct RegistryApp {
    config: Arc<RegistryConfig>,
    orchestrator: Arc<LocalOrchestrator>,
    services: ServiceRegistry,
    pipeline: Mutex<OperationPipeline>,
    dispatcher: Mutex<Option<BackgroundWorker<JobDispatcher>>>,
    lifecycle: Lifecycle,
    next_call_id: AtomicU64,
}

impl RegistryApp {
    /// Installs tracing, builds and initializes every component, then starts
    /// job dispatch.
    ///
    /// # Errors
    ///
    /// Fails if the log filter does not parse, the validation rule table is
    /// inconsistent, or a service fails to initialize.
    pub async fn start(
        config: RegistryConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> anyhow::Result<Self> {
        if !telemetry::init_tracing(&config)? {
            debug!("tracing subscriber already installed");
        }
        let config = Arc::new(config);
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let orchestrator = Arc::new(LocalOrchestrator::new(
            repo.clone(),
            config.targets.clone(),
        ));
        let validator = Arc::new(Validator::standard()?);
        let ctx = ManagerContext::new(repo, orchestrator.clone(), validator, config.clone());

        let services = ServiceRegistry::new();
        let tenant = services.register(TenantService::new(
            TenantManager::new(ctx.clone()),
            Arc::new(TenantJobHandler::new(ctx.clone())),
        ));
        let system = services.register(SystemService::new(SystemManager::new(ctx.clone())));
        let auth = services.register(AuthService::new(
            AuthManager::new(ctx.clone()),
            Arc::new(AuthJobHandler::new(ctx)),
        ));
        services
            .init_all(&ServiceContext {
                config: config.clone(),
                orchestrator: orchestrator.clone(),
            })
            .await?;

        let mut router = OperationRouter::new();
        router.register(service_names::TENANT, tenant);
        router.register(service_names::SYSTEM, system);
        router.register(service_names::AUTH, auth);
        let pipeline = build_operation_pipeline(router, &config);

        let dispatcher = BackgroundWorker::start(
            JobDispatcher::new(orchestrator.clone(), executor),
            config.dispatch_interval_ms,
        );

        let lifecycle = Lifecycle::new();
        lifecycle.set_ready();
        info!(
            node_id = %config.node_id,
            services = ?services.names(),
            regions = config.targets.len(),
            "registry started"
        );

        Ok(Self {
            config,
            orchestrator,
            services,
            pipeline: Mutex::new(pipeline),
            dispatcher: Mutex::new(Some(dispatcher)),
            lifecycle,
            next_call_id: AtomicU64::new(1),
        })
    }

    /// A fresh context for `service_name` with the default deadline.
    #[must_use]
    pub fn context(&self, service_name: &'static str) -> OperationContext {
        OperationContext::new(
            self.next_call_id.fetch_add(1, Ordering::Relaxed),
            service_name,
            self.config.default_operation_timeout_ms,
        )
    }

    /// Runs one operation through the pipeline.
    ///
    /// # Errors
    ///
    /// [`OperationError::ShuttingDown`] once draining has begun, otherwise
    /// whatever the pipeline returns.
    pub async fn call(&self, op: Operation) -> Result<OperationResponse, OperationError> {
        let _guard = self.lifecycle.admit()?;
        let fut = {
            let mut pipeline = self.pipeline.lock().await;
            pipeline.ready().await?.call(op)
        };
        fut.await
    }

    /// Asks the dispatcher to sweep pending jobs now instead of on its next
    /// tick.
    ///
    /// # Errors
    ///
    /// Fails once the dispatcher has stopped.
    pub async fn dispatch_now(&self) -> anyhow::Result<()> {
        match self.dispatcher.lock().await.as_ref() {
            Some(worker) => worker.submit(DispatchTask::RunPending).await,
            None => anyhow::bail!("dispatcher stopped"),
        }
    }

    #[must_use]
    pub fn health(&self) -> HealthState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<LocalOrchestrator> {
        &self.orchestrator
    }

    /// Stops admitting calls, waits up to `drain_timeout` for in-flight calls,
    /// stops job dispatch and shuts services down in reverse order. Services
    /// are told to terminate when the drain timed out.
    ///
    /// Returns whether the drain completed.
    ///
    /// # Errors
    ///
    /// The first service shutdown failure.
    pub async fn shutdown(&self, drain_timeout: Duration) -> anyhow::Result<bool> {
        self.lifecycle.begin_drain();
        let drained = self.lifecycle.wait_for_drain(drain_timeout).await;
        if !drained {
            warn!(
                in_flight = self.lifecycle.in_flight(),
                "drain timed out, terminating"
            );
        }
        if let Some(mut worker) = self.dispatcher.lock().await.take() {
            worker.stop().await;
        }
        self.services.shutdown_all(!drained).await?;
        info!(drained, "registry stopped");
        Ok(drained)
    }
}
