//! Tenant entity, status state machine, and tenant requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RegistryError, Result};
use crate::types::{Labels, Owner};

/// Lifecycle status of a tenant.
///
/// Changes only along the edges returned by [`TenantStatus::valid_transitions`].
/// `Unspecified` stands for an unset status and has no outgoing edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    #[default]
    Unspecified,
    Requested,
    Provisioning,
    ProvisioningError,
    Active,
    Blocking,
    BlockingError,
    Blocked,
    Unblocking,
    UnblockingError,
    Terminating,
    TerminationError,
    Terminated,
}

impl TenantStatus {
    /// Every defined status, `Unspecified` included.
    pub const ALL: &'static [Self] = &[
        Self::Unspecified,
        Self::Requested,
        Self::Provisioning,
        Self::ProvisioningError,
        Self::Active,
        Self::Blocking,
        Self::BlockingError,
        Self::Blocked,
        Self::Unblocking,
        Self::UnblockingError,
        Self::Terminating,
        Self::TerminationError,
        Self::Terminated,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Requested => "REQUESTED",
            Self::Provisioning => "PROVISIONING",
            Self::ProvisioningError => "PROVISIONING_ERROR",
            Self::Active => "ACTIVE",
            Self::Blocking => "BLOCKING",
            Self::BlockingError => "BLOCKING_ERROR",
            Self::Blocked => "BLOCKED",
            Self::Unblocking => "UNBLOCKING",
            Self::UnblockingError => "UNBLOCKING_ERROR",
            Self::Terminating => "TERMINATING",
            Self::TerminationError => "TERMINATION_ERROR",
            Self::Terminated => "TERMINATED",
        }
    }

    /// Statuses reachable in one step from `self`.
    #[must_use]
    pub const fn valid_transitions(self) -> &'static [Self] {
        match self {
            Self::Requested | Self::ProvisioningError => &[Self::Provisioning],
            Self::Provisioning => &[Self::Active, Self::ProvisioningError],
            Self::Active | Self::BlockingError => &[Self::Blocking],
            Self::Blocking => &[Self::Blocked, Self::BlockingError],
            Self::Blocked => &[Self::Terminating, Self::Unblocking],
            Self::Unblocking => &[Self::Active, Self::UnblockingError],
            Self::UnblockingError => &[Self::Unblocking],
            Self::Terminating => &[Self::Terminated, Self::TerminationError],
            Self::TerminationError => &[Self::Terminating],
            Self::Unspecified | Self::Terminated => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.valid_transitions().contains(&target)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = RegistryError;

    /// Parses the wire name. The empty string is the implicit `UNSPECIFIED`.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::Unspecified);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                RegistryError::new(ErrorKind::Validation)
                    .with("tenant.status", format!("unknown status {s:?}"))
            })
    }
}

/// Validates a tenant status change against the transition graph.
///
/// # Errors
///
/// Returns [`ErrorKind::InvalidTransition`] carrying `from` and `to` when the
/// edge is absent from the graph.
pub fn validate_transition(from: TenantStatus, to: TenantStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(RegistryError::new(ErrorKind::InvalidTransition)
            .with("from", from)
            .with("to", to))
    }
}

/// Role of a tenant within the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantRole {
    #[default]
    Unspecified,
    Live,
    Test,
    Trial,
}

impl TenantRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Live => "LIVE",
            Self::Test => "TEST",
            Self::Trial => "TRIAL",
        }
    }
}

/// Top-level customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub region: String,
    pub owner: Owner,
    pub status: TenantStatus,
    pub status_updated_at: i64,
    pub role: TenantRole,
    pub labels: Labels,
    pub user_groups: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tenant {
    /// Builds the stored form of a freshly registered tenant.
    ///
    /// Registration skips the explicit `REQUESTED` state and starts in
    /// `PROVISIONING`, the status the provisioning job confirms.
    #[must_use]
    pub fn provisioning(request: &RegisterTenant, now: i64) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            region: request.region.clone(),
            owner: request.owner.clone(),
            status: TenantStatus::Provisioning,
            status_updated_at: now,
            role: request.role,
            labels: request.labels.clone(),
            user_groups: request.user_groups.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the tenant to `to`, enforcing the transition graph.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidTransition`] (with the tenant id attached)
    /// if `to` is not reachable from the current status.
    pub fn transition(&mut self, to: TenantStatus, now: i64) -> Result<()> {
        validate_transition(self.status, to).map_err(|e| e.with("tenant_id", &self.id))?;
        self.status = to;
        self.status_updated_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Fails with [`ErrorKind::TenantNotActive`] unless the tenant is `ACTIVE`.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn ensure_active(&self) -> Result<()> {
        if self.status == TenantStatus::Active {
            Ok(())
        } else {
            Err(RegistryError::new(ErrorKind::TenantNotActive)
                .with("tenant_id", &self.id)
                .with("status", self.status))
        }
    }
}

/// Request to register a new tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTenant {
    pub id: String,
    pub name: String,
    pub region: String,
    pub owner: Owner,
    pub role: TenantRole,
    pub labels: Labels,
    pub user_groups: Vec<String>,
}

/// Filters and paging for tenant listings. Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTenants {
    pub region: Option<String>,
    pub owner_id: Option<String>,
    pub owner_type: Option<String>,
    /// Page size; 0 selects the configured default.
    pub limit: usize,
    pub page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const EDGES: &[(TenantStatus, TenantStatus)] = &[
        (TenantStatus::Requested, TenantStatus::Provisioning),
        (TenantStatus::Provisioning, TenantStatus::Active),
        (TenantStatus::Provisioning, TenantStatus::ProvisioningError),
        (TenantStatus::ProvisioningError, TenantStatus::Provisioning),
        (TenantStatus::Active, TenantStatus::Blocking),
        (TenantStatus::Blocking, TenantStatus::Blocked),
        (TenantStatus::Blocking, TenantStatus::BlockingError),
        (TenantStatus::BlockingError, TenantStatus::Blocking),
        (TenantStatus::Blocked, TenantStatus::Terminating),
        (TenantStatus::Blocked, TenantStatus::Unblocking),
        (TenantStatus::Unblocking, TenantStatus::Active),
        (TenantStatus::Unblocking, TenantStatus::UnblockingError),
        (TenantStatus::UnblockingError, TenantStatus::Unblocking),
        (TenantStatus::Terminating, TenantStatus::Terminated),
        (TenantStatus::Terminating, TenantStatus::TerminationError),
        (TenantStatus::TerminationError, TenantStatus::Terminating),
    ];

    fn any_status() -> impl Strategy<Value = TenantStatus> {
        proptest::sample::select(TenantStatus::ALL)
    }

    proptest! {
        #[test]
        fn transition_accepted_iff_edge_listed(from in any_status(), to in any_status()) {
            let listed = EDGES.contains(&(from, to));
            prop_assert_eq!(validate_transition(from, to).is_ok(), listed);
        }
    }

    #[test]
    fn requested_to_provisioning_is_valid() {
        assert!(validate_transition(TenantStatus::Requested, TenantStatus::Provisioning).is_ok());
    }

    #[test]
    fn active_to_blocked_reports_source_and_target() {
        let err = validate_transition(TenantStatus::Active, TenantStatus::Blocked).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(err.context("from"), Some("ACTIVE"));
        assert_eq!(err.context("to"), Some("BLOCKED"));
    }

    #[test]
    fn empty_status_is_unspecified_and_cannot_move() {
        let from: TenantStatus = "".parse().unwrap();
        assert_eq!(from, TenantStatus::Unspecified);
        let err = validate_transition(from, TenantStatus::Active).unwrap_err();
        assert_eq!(err.context("from"), Some("UNSPECIFIED"));
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        let err = "PAUSED".parse::<TenantStatus>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn terminated_has_no_exits() {
        assert!(TenantStatus::Terminated.is_terminal());
        assert!(TenantStatus::Terminated.valid_transitions().is_empty());
    }

    #[test]
    fn transition_updates_timestamps() {
        let request = RegisterTenant {
            id: "t-1".into(),
            name: "Acme".into(),
            region: "eu10".into(),
            ..RegisterTenant::default()
        };
        let mut tenant = Tenant::provisioning(&request, 10);
        tenant.transition(TenantStatus::Active, 20).unwrap();
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.status_updated_at, 20);
        assert_eq!(tenant.created_at, 10);

        let err = tenant.transition(TenantStatus::Terminated, 30).unwrap_err();
        assert_eq!(err.context("tenant_id"), Some("t-1"));
        assert_eq!(tenant.status, TenantStatus::Active);
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&TenantStatus::ProvisioningError).unwrap();
        assert_eq!(json, "\"PROVISIONING_ERROR\"");
    }
}
