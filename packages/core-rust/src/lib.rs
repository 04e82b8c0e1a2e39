//! Registry core: tenant, system and auth domain model, status graphs,
//! request validation, job descriptors, and page tokens.

pub mod auth;
pub mod error;
pub mod job;
pub mod pagination;
pub mod system;
pub mod tenant;
pub mod types;
pub mod validation;

pub use auth::{ApplyAuth, Auth, AuthStatus, ListAuths};
pub use error::{Code, ErrorKind, RegistryError, Result};
pub use job::{
    AuthJobPayload, ConfirmOutcome, Job, JobSpec, JobStatus, JobType, Target, TargetsByRegion,
    Task, TaskResolution, TenantJobPayload,
};
pub use pagination::{Page, PageToken, PageTokenError};
pub use system::{
    ListSystems, MapSystemToTenant, RegionalLocator, RegionalSystem, RegionalSystemStatus,
    RegisterSystem, System, SystemLocator, SystemView, UnmapSystemFromTenant, UpdateL1KeyClaim,
    UpdateSystemStatus,
};
pub use tenant::{ListTenants, RegisterTenant, Tenant, TenantRole, TenantStatus};
pub use types::{Labels, Owner};
pub use validation::{ValidationErrors, Validator};
