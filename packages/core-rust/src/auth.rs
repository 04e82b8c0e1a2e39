//! Per-tenant auth bindings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, RegistryError, Result};

/// Lifecycle status of an auth binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    Applying,
    Applied,
    ApplyingError,
    Removing,
    Removed,
    RemovingError,
    Blocking,
    Unblocking,
}

impl AuthStatus {
    /// Statuses with a job in flight.
    pub const TRANSIENT: &'static [Self] =
        &[Self::Applying, Self::Removing, Self::Blocking, Self::Unblocking];

    /// Statuses that no longer accept updates.
    pub const NON_UPDATABLE: &'static [Self] = &[Self::Removed, Self::ApplyingError];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applying => "APPLYING",
            Self::Applied => "APPLIED",
            Self::ApplyingError => "APPLYING_ERROR",
            Self::Removing => "REMOVING",
            Self::Removed => "REMOVED",
            Self::RemovingError => "REMOVING_ERROR",
            Self::Blocking => "BLOCKING",
            Self::Unblocking => "UNBLOCKING",
        }
    }

    #[must_use]
    pub fn is_transient(self) -> bool {
        Self::TRANSIENT.contains(&self)
    }

    #[must_use]
    pub fn is_updatable(self) -> bool {
        !Self::NON_UPDATABLE.contains(&self)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auth binding of a tenant, keyed by `external_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub external_id: String,
    pub tenant_id: String,
    pub auth_type: String,
    pub properties: BTreeMap<String, String>,
    pub status: AuthStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Auth {
    #[must_use]
    pub fn applying(request: &ApplyAuth, now: i64) -> Self {
        Self {
            external_id: request.external_id.clone(),
            tenant_id: request.tenant_id.clone(),
            auth_type: request.auth_type.clone(),
            properties: request.properties.clone(),
            status: AuthStatus::Applying,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// # Errors
    ///
    /// [`ErrorKind::AuthNotApplied`] unless the status is `APPLIED`.
    pub fn ensure_applied(&self) -> Result<()> {
        if self.status == AuthStatus::Applied {
            Ok(())
        } else {
            Err(RegistryError::new(ErrorKind::AuthNotApplied)
                .with("external_id", &self.external_id)
                .with("status", self.status))
        }
    }

    /// Records a new status; `error_message` is replaced, not merged.
    pub fn set_status(&mut self, status: AuthStatus, error_message: Option<String>, now: i64) {
        self.status = status;
        self.error_message = error_message;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyAuth {
    pub external_id: String,
    pub tenant_id: String,
    pub auth_type: String,
    pub properties: BTreeMap<String, String>,
}

/// Paging for auth listings of one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListAuths {
    pub tenant_id: String,
    /// Page size; 0 selects the configured default.
    pub limit: usize,
    pub page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_sets() {
        for status in [
            AuthStatus::Applying,
            AuthStatus::Removing,
            AuthStatus::Blocking,
            AuthStatus::Unblocking,
        ] {
            assert!(status.is_transient(), "{status} should be transient");
        }
        assert!(!AuthStatus::Applied.is_transient());
        assert!(!AuthStatus::Removed.is_updatable());
        assert!(!AuthStatus::ApplyingError.is_updatable());
        assert!(AuthStatus::RemovingError.is_updatable());
    }

    #[test]
    fn ensure_applied_reports_status() {
        let mut auth = Auth::applying(
            &ApplyAuth {
                external_id: "auth-1".into(),
                tenant_id: "t-1".into(),
                auth_type: "oidc".into(),
                properties: BTreeMap::new(),
            },
            5,
        );
        let err = auth.ensure_applied().unwrap_err();
        assert_eq!(err.context("status"), Some("APPLYING"));

        auth.set_status(AuthStatus::Applied, None, 6);
        assert!(auth.ensure_applied().is_ok());
        assert_eq!(auth.updated_at, 6);
    }
}
