//! Operation routing and execution framework.
//!
//! 1. **Middleware** (`middleware`): tower layers (load shedding, deadlines, tracing)
//! 2. **Routing** (`router`): dispatch to domain services by `service_name`
//! 3. **Domain services** (`domain`): tenant, system and auth operations
//! 4. **Background workers** (`worker`): periodic tasks such as job dispatch

pub mod config;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod worker;

pub use config::RegistryConfig;
pub use domain::{AuthService, SystemService, TenantService};
pub use middleware::{build_operation_pipeline, OperationPipeline};
pub use operation::{
    service_names, Operation, OperationContext, OperationError, OperationResponse,
};
pub use registry::{ManagedService, ServiceContext, ServiceRegistry};
pub use router::OperationRouter;
pub use worker::{BackgroundRunnable, BackgroundWorker};
