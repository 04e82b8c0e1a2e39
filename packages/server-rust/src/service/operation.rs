//! Operation, response and error types of the service pipeline.

use registry_core::{
    ApplyAuth, Auth, Code, Labels, ListAuths, ListSystems, ListTenants, MapSystemToTenant, Page,
    RegionalLocator, RegisterSystem, RegisterTenant, RegistryError, System, SystemView, Tenant,
    UnmapSystemFromTenant, UpdateL1KeyClaim, UpdateSystemStatus,
};

/// Names under which domain services are routed.
pub mod service_names {
    pub const TENANT: &str = "tenant";
    pub const SYSTEM: &str = "system";
    pub const AUTH: &str = "auth";
}

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub service_name: &'static str,
    /// Identity of the caller, when the transport knows it.
    pub caller_id: Option<String>,
    pub call_timeout_ms: u64,
}

impl OperationContext {
    #[must_use]
    pub fn new(call_id: u64, service_name: &'static str, call_timeout_ms: u64) -> Self {
        Self {
            call_id,
            service_name,
            caller_id: None,
            call_timeout_ms,
        }
    }
}

/// One variant per manager method.
#[derive(Debug)]
pub enum Operation {
    // ----- tenant -----
    RegisterTenant {
        ctx: OperationContext,
        request: RegisterTenant,
    },
    BlockTenant {
        ctx: OperationContext,
        tenant_id: String,
    },
    UnblockTenant {
        ctx: OperationContext,
        tenant_id: String,
    },
    TerminateTenant {
        ctx: OperationContext,
        tenant_id: String,
    },
    SetTenantLabels {
        ctx: OperationContext,
        tenant_id: String,
        labels: Labels,
    },
    RemoveTenantLabels {
        ctx: OperationContext,
        tenant_id: String,
        keys: Vec<String>,
    },
    SetTenantUserGroups {
        ctx: OperationContext,
        tenant_id: String,
        user_groups: Vec<String>,
    },
    GetTenant {
        ctx: OperationContext,
        tenant_id: String,
    },
    ListTenants {
        ctx: OperationContext,
        request: ListTenants,
    },

    // ----- system -----
    RegisterSystem {
        ctx: OperationContext,
        request: RegisterSystem,
    },
    MapSystemToTenant {
        ctx: OperationContext,
        request: MapSystemToTenant,
    },
    UnmapSystemFromTenant {
        ctx: OperationContext,
        request: UnmapSystemFromTenant,
    },
    DeleteSystem {
        ctx: OperationContext,
        target: RegionalLocator,
    },
    UpdateL1KeyClaim {
        ctx: OperationContext,
        request: UpdateL1KeyClaim,
    },
    UpdateSystemStatus {
        ctx: OperationContext,
        request: UpdateSystemStatus,
    },
    SetSystemLabels {
        ctx: OperationContext,
        target: RegionalLocator,
        labels: Labels,
    },
    RemoveSystemLabels {
        ctx: OperationContext,
        target: RegionalLocator,
        keys: Vec<String>,
    },
    GetSystem {
        ctx: OperationContext,
        target: RegionalLocator,
    },
    ListSystems {
        ctx: OperationContext,
        request: ListSystems,
    },

    // ----- auth -----
    ApplyAuth {
        ctx: OperationContext,
        request: ApplyAuth,
    },
    RemoveAuth {
        ctx: OperationContext,
        external_id: String,
    },
    GetAuth {
        ctx: OperationContext,
        external_id: String,
    },
    ListAuths {
        ctx: OperationContext,
        request: ListAuths,
    },
}

impl Operation {
    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::RegisterTenant { ctx, .. }
            | Self::BlockTenant { ctx, .. }
            | Self::UnblockTenant { ctx, .. }
            | Self::TerminateTenant { ctx, .. }
            | Self::SetTenantLabels { ctx, .. }
            | Self::RemoveTenantLabels { ctx, .. }
            | Self::SetTenantUserGroups { ctx, .. }
            | Self::GetTenant { ctx, .. }
            | Self::ListTenants { ctx, .. }
            | Self::RegisterSystem { ctx, .. }
            | Self::MapSystemToTenant { ctx, .. }
            | Self::UnmapSystemFromTenant { ctx, .. }
            | Self::DeleteSystem { ctx, .. }
            | Self::UpdateL1KeyClaim { ctx, .. }
            | Self::UpdateSystemStatus { ctx, .. }
            | Self::SetSystemLabels { ctx, .. }
            | Self::RemoveSystemLabels { ctx, .. }
            | Self::GetSystem { ctx, .. }
            | Self::ListSystems { ctx, .. }
            | Self::ApplyAuth { ctx, .. }
            | Self::RemoveAuth { ctx, .. }
            | Self::GetAuth { ctx, .. }
            | Self::ListAuths { ctx, .. } => ctx,
        }
    }

    /// Snake-case operation name, used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterTenant { .. } => "register_tenant",
            Self::BlockTenant { .. } => "block_tenant",
            Self::UnblockTenant { .. } => "unblock_tenant",
            Self::TerminateTenant { .. } => "terminate_tenant",
            Self::SetTenantLabels { .. } => "set_tenant_labels",
            Self::RemoveTenantLabels { .. } => "remove_tenant_labels",
            Self::SetTenantUserGroups { .. } => "set_tenant_user_groups",
            Self::GetTenant { .. } => "get_tenant",
            Self::ListTenants { .. } => "list_tenants",
            Self::RegisterSystem { .. } => "register_system",
            Self::MapSystemToTenant { .. } => "map_system_to_tenant",
            Self::UnmapSystemFromTenant { .. } => "unmap_system_from_tenant",
            Self::DeleteSystem { .. } => "delete_system",
            Self::UpdateL1KeyClaim { .. } => "update_l1_key_claim",
            Self::UpdateSystemStatus { .. } => "update_system_status",
            Self::SetSystemLabels { .. } => "set_system_labels",
            Self::RemoveSystemLabels { .. } => "remove_system_labels",
            Self::GetSystem { .. } => "get_system",
            Self::ListSystems { .. } => "list_systems",
            Self::ApplyAuth { .. } => "apply_auth",
            Self::RemoveAuth { .. } => "remove_auth",
            Self::GetAuth { .. } => "get_auth",
            Self::ListAuths { .. } => "list_auths",
        }
    }
}

/// Successful response from an operation handler.
#[derive(Debug)]
pub enum OperationResponse {
    Tenant(Tenant),
    Tenants(Page<Tenant>),
    /// A regional row with its identity.
    System(SystemView),
    Systems(Page<SystemView>),
    /// The global identity alone, returned by map and unmap.
    SystemIdentity(System),
    Auth(Auth),
    Auths(Page<Auth>),
    Empty,
}

/// Errors returned by operation handlers.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    Domain(#[from] RegistryError),
    #[error("unknown service: {name}")]
    UnknownService { name: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("server overloaded, try again later")]
    Overloaded,
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("operation {operation} routed to service {service}")]
    WrongService {
        service: &'static str,
        operation: &'static str,
    },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Status-code family reported to the caller.
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            Self::Domain(err) => err.code(),
            Self::UnknownService { .. } => Code::InvalidArgument,
            Self::Timeout { .. } | Self::Overloaded | Self::ShuttingDown => Code::Aborted,
            Self::WrongService { .. } | Self::Internal(_) => Code::Internal,
        }
    }
}
