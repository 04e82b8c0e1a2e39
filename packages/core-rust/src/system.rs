//! Global `System` identity, its per-region `RegionalSystem` projection, and
//! the requests that address them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RegistryError, Result};
use crate::types::Labels;

/// Availability of a system in one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegionalSystemStatus {
    #[default]
    Unspecified,
    Available,
    Processing,
    Failed,
}

impl RegionalSystemStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Available => "AVAILABLE",
            Self::Processing => "PROCESSING",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RegionalSystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global identity of a customer system, keyed by `(external_id, system_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Generated surrogate id referenced by regional rows.
    pub id: String,
    pub external_id: String,
    pub system_type: String,
    /// Linked tenant. `None` is the only unlinked representation.
    pub tenant_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl System {
    /// # Errors
    ///
    /// [`ErrorKind::SystemIsLinkedToTenant`] if a tenant link exists.
    pub fn ensure_unlinked(&self) -> Result<()> {
        match &self.tenant_id {
            None => Ok(()),
            Some(tenant_id) => Err(RegistryError::new(ErrorKind::SystemIsLinkedToTenant)
                .with("external_id", &self.external_id)
                .with("tenant_id", tenant_id)),
        }
    }

    /// # Errors
    ///
    /// [`ErrorKind::SystemIsNotLinkedToTenant`] unless linked to exactly `tenant_id`.
    pub fn ensure_linked_to(&self, tenant_id: &str) -> Result<()> {
        if self.tenant_id.as_deref() == Some(tenant_id) {
            Ok(())
        } else {
            Err(RegistryError::new(ErrorKind::SystemIsNotLinkedToTenant)
                .with("external_id", &self.external_id)
                .with("tenant_id", tenant_id))
        }
    }
}

/// Region-scoped projection of a [`System`], keyed by `(system_id, region)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalSystem {
    pub system_id: String,
    pub region: String,
    pub status: RegionalSystemStatus,
    pub l2_key_id: String,
    /// Tri-state: `None` means the claim was never reported.
    pub has_l1_key_claim: Option<bool>,
    pub labels: Labels,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RegionalSystem {
    #[must_use]
    pub fn has_claim(&self) -> bool {
        self.has_l1_key_claim == Some(true)
    }

    /// # Errors
    ///
    /// [`ErrorKind::RegionalSystemNotAvailable`] unless status is `AVAILABLE`.
    pub fn ensure_available(&self) -> Result<()> {
        if self.status == RegionalSystemStatus::Available {
            Ok(())
        } else {
            Err(RegistryError::new(ErrorKind::RegionalSystemNotAvailable)
                .with("system_id", &self.system_id)
                .with("region", &self.region)
                .with("status", self.status))
        }
    }

    /// # Errors
    ///
    /// [`ErrorKind::SystemHasL1KeyClaim`] if the claim flag is set.
    pub fn ensure_claim_free(&self) -> Result<()> {
        if self.has_claim() {
            Err(RegistryError::new(ErrorKind::SystemHasL1KeyClaim)
                .with("system_id", &self.system_id)
                .with("region", &self.region))
        } else {
            Ok(())
        }
    }
}

/// A regional row together with its global identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemView {
    pub system: System,
    pub regional: RegionalSystem,
}

/// Addresses a global system. Without a type, the lookup succeeds only when
/// exactly one system carries the external id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLocator {
    pub external_id: String,
    pub system_type: Option<String>,
}

impl SystemLocator {
    #[must_use]
    pub fn new(external_id: impl Into<String>, system_type: Option<&str>) -> Self {
        Self {
            external_id: external_id.into(),
            system_type: system_type.map(str::to_string),
        }
    }
}

/// Addresses one regional row of a system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalLocator {
    pub system: SystemLocator,
    pub region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSystem {
    pub external_id: String,
    pub system_type: String,
    pub region: String,
    pub l2_key_id: String,
    pub has_l1_key_claim: Option<bool>,
    /// Initial regional status; `UNSPECIFIED` registers as `AVAILABLE`.
    pub status: RegionalSystemStatus,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSystemToTenant {
    pub external_id: String,
    /// Required: an unknown system is created with this type.
    pub system_type: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmapSystemFromTenant {
    pub system: SystemLocator,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateL1KeyClaim {
    pub target: RegionalLocator,
    pub tenant_id: String,
    pub l1_key_claim: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSystemStatus {
    pub target: RegionalLocator,
    pub status: RegionalSystemStatus,
}

/// Filters and paging for system listings. Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSystems {
    pub region: Option<String>,
    pub external_id: Option<String>,
    pub system_type: Option<String>,
    pub tenant_id: Option<String>,
    /// Page size; 0 selects the configured default.
    pub limit: usize,
    pub page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regional(status: RegionalSystemStatus, claim: Option<bool>) -> RegionalSystem {
        RegionalSystem {
            system_id: "sys-1".into(),
            region: "eu10".into(),
            status,
            l2_key_id: "l2".into(),
            has_l1_key_claim: claim,
            labels: Labels::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn system(tenant_id: Option<&str>) -> System {
        System {
            id: "sys-1".into(),
            external_id: "ext-1".into(),
            system_type: "erp".into(),
            tenant_id: tenant_id.map(str::to_string),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn unset_claim_counts_as_claim_free() {
        assert!(regional(RegionalSystemStatus::Available, None)
            .ensure_claim_free()
            .is_ok());
        assert!(regional(RegionalSystemStatus::Available, Some(false))
            .ensure_claim_free()
            .is_ok());
        let err = regional(RegionalSystemStatus::Available, Some(true))
            .ensure_claim_free()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemHasL1KeyClaim);
    }

    #[test]
    fn processing_row_is_not_available() {
        let err = regional(RegionalSystemStatus::Processing, None)
            .ensure_available()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RegionalSystemNotAvailable);
        assert_eq!(err.context("status"), Some("PROCESSING"));
    }

    #[test]
    fn link_checks() {
        assert!(system(None).ensure_unlinked().is_ok());
        assert_eq!(
            system(Some("t-1")).ensure_unlinked().unwrap_err().kind(),
            ErrorKind::SystemIsLinkedToTenant
        );
        assert!(system(Some("t-1")).ensure_linked_to("t-1").is_ok());
        assert_eq!(
            system(Some("t-1")).ensure_linked_to("t-2").unwrap_err().kind(),
            ErrorKind::SystemIsNotLinkedToTenant
        );
        assert_eq!(
            system(None).ensure_linked_to("t-1").unwrap_err().kind(),
            ErrorKind::SystemIsNotLinkedToTenant
        );
    }
}
