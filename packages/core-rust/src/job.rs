//! Job descriptors exchanged with the orchestrator.
//!
//! Managers emit a [`JobSpec`] inside their transaction; the orchestrator
//! turns it into a persisted [`Job`] and later drives the handler protocol:
//! confirm ([`ConfirmOutcome`]), resolve tasks ([`TaskResolution`]), and one
//! terminal callback.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::Auth;
use crate::error::{ErrorKind, RegistryError, Result};
use crate::tenant::Tenant;

/// Kind of remote effect a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    TenantProvisioning,
    TenantBlock,
    TenantUnblock,
    TenantTerminate,
    AuthApply,
    AuthRemove,
}

impl JobType {
    pub const TENANT: &'static [Self] = &[
        Self::TenantProvisioning,
        Self::TenantBlock,
        Self::TenantUnblock,
        Self::TenantTerminate,
    ];

    pub const AUTH: &'static [Self] = &[Self::AuthApply, Self::AuthRemove];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TenantProvisioning => "TENANT_PROVISIONING",
            Self::TenantBlock => "TENANT_BLOCK",
            Self::TenantUnblock => "TENANT_UNBLOCK",
            Self::TenantTerminate => "TENANT_TERMINATE",
            Self::AuthApply => "AUTH_APPLY",
            Self::AuthRemove => "AUTH_REMOVE",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator-side progress of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Confirmed,
    Done,
    Failed,
    Canceled,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Confirmed => "CONFIRMED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a manager asks the orchestrator to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub job_type: JobType,
    /// Id of the entity the job acts on (tenant id, auth external id).
    pub external_id: String,
    /// JSON-encoded payload.
    pub payload: String,
}

impl JobSpec {
    /// Encodes `payload` as JSON.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::PayloadEncoding`] if serialization fails.
    pub fn new<P: Serialize>(
        job_type: JobType,
        external_id: impl Into<String>,
        payload: &P,
    ) -> Result<Self> {
        let payload = serde_json::to_string(payload).map_err(|e| {
            RegistryError::new(ErrorKind::PayloadEncoding)
                .with("job_type", job_type)
                .with_source(e)
        })?;
        Ok(Self {
            job_type,
            external_id: external_id.into(),
            payload,
        })
    }
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub external_id: String,
    pub job_type: JobType,
    pub payload: String,
    pub status: JobStatus,
    /// Failure or cancellation reason reported by the orchestrator.
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    /// Decodes the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the decoder error for malformed payloads; such jobs can never
    /// succeed and callers cancel them.
    pub fn decode_payload<P: DeserializeOwned>(&self) -> std::result::Result<P, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

/// Payload of every tenant job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantJobPayload {
    pub id: String,
    pub name: String,
    pub region: String,
    pub owner_id: String,
    pub owner_type: String,
}

impl From<&Tenant> for TenantJobPayload {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id.clone(),
            name: tenant.name.clone(),
            region: tenant.region.clone(),
            owner_id: tenant.owner.id.clone(),
            owner_type: tenant.owner.owner_type.clone(),
        }
    }
}

/// Payload of every auth job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthJobPayload {
    pub external_id: String,
    pub tenant_id: String,
    pub auth_type: String,
    pub properties: BTreeMap<String, String>,
}

impl From<&Auth> for AuthJobPayload {
    fn from(auth: &Auth) -> Self {
        Self {
            external_id: auth.external_id.clone(),
            tenant_id: auth.tenant_id.clone(),
            auth_type: auth.auth_type.clone(),
            properties: auth.properties.clone(),
        }
    }
}

/// Regional execution target a task is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub region: String,
    pub endpoint: String,
}

/// Execution targets keyed by region.
pub type TargetsByRegion = HashMap<String, Target>;

/// One unit of work sent to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub data: String,
    pub task_type: JobType,
    /// Region key into [`TargetsByRegion`].
    pub target: String,
}

/// Answer to a confirm callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Done,
    /// The job can never proceed; the orchestrator cancels it.
    Canceled { reason: String },
}

/// Answer to a resolve-tasks callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResolution {
    Tasks { tasks: Vec<Task>, done: bool },
    Canceled { reason: String },
}
