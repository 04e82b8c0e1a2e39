//! Domain error taxonomy and status-code mapping.
//!
//! Every failure surfaced by a manager is a [`RegistryError`]: a stable
//! [`ErrorKind`] (whose `Display` is the base message) plus ordered
//! `key=value` context such as ids or the attempted status. Callers match on
//! [`RegistryError::kind`] or [`RegistryError::code`], never on the rendered
//! string.

use std::fmt;

use crate::pagination::PageTokenError;
use crate::validation::ValidationErrors;

/// Status-code family an error maps to at the operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    /// Invariant or transition violation; the caller must change approach.
    FailedPrecondition,
    Internal,
    /// Transaction timed out or the server shed load; safe to retry.
    Aborted,
}

impl Code {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Internal => "INTERNAL",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error kinds. The `Display` output is the base message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    // ----- invalid argument -----
    #[error("validation failed")]
    Validation,
    #[error("invalid pagination token")]
    InvalidPaginationToken,
    #[error("system type is required: more than one system shares this external id")]
    TooManyTypes,

    // ----- not found -----
    #[error("tenant not found")]
    TenantNotFound,
    #[error("system not found")]
    SystemNotFound,
    #[error("regional system not found")]
    RegionalSystemNotFound,
    #[error("auth not found")]
    AuthNotFound,
    #[error("job not found")]
    JobNotFound,
    #[error("no resources found")]
    NoResourcesFound,

    // ----- already exists -----
    #[error("tenant already exists")]
    TenantAlreadyExists,
    #[error("regional system already exists")]
    RegionalSystemAlreadyExists,
    #[error("resource already exists")]
    AlreadyExists,

    // ----- failed precondition -----
    #[error("invalid status transition")]
    InvalidTransition,
    #[error("tenant is not active")]
    TenantNotActive,
    #[error("tenant still has linked systems")]
    TenantHasLinkedSystems,
    #[error("system is linked to a tenant")]
    SystemIsLinkedToTenant,
    #[error("system is not linked to the tenant")]
    SystemIsNotLinkedToTenant,
    #[error("system has an active L1 key claim")]
    SystemHasL1KeyClaim,
    #[error("regional system is not available")]
    RegionalSystemNotAvailable,
    #[error("L1 key claim is already active")]
    KeyClaimAlreadyActive,
    #[error("L1 key claim is already inactive")]
    KeyClaimAlreadyInactive,
    #[error("auth is not applied")]
    AuthNotApplied,

    // ----- internal -----
    #[error("internal error")]
    Internal,
    #[error("job payload could not be encoded")]
    PayloadEncoding,

    // ----- aborted -----
    #[error("transaction aborted, retry")]
    TransactionAborted,
}

impl ErrorKind {
    /// Maps the kind onto its status-code family.
    #[must_use]
    pub const fn code(self) -> Code {
        match self {
            Self::Validation | Self::InvalidPaginationToken | Self::TooManyTypes => {
                Code::InvalidArgument
            }
            Self::TenantNotFound
            | Self::SystemNotFound
            | Self::RegionalSystemNotFound
            | Self::AuthNotFound
            | Self::JobNotFound
            | Self::NoResourcesFound => Code::NotFound,
            Self::TenantAlreadyExists | Self::RegionalSystemAlreadyExists | Self::AlreadyExists => {
                Code::AlreadyExists
            }
            Self::InvalidTransition
            | Self::TenantNotActive
            | Self::TenantHasLinkedSystems
            | Self::SystemIsLinkedToTenant
            | Self::SystemIsNotLinkedToTenant
            | Self::SystemHasL1KeyClaim
            | Self::RegionalSystemNotAvailable
            | Self::KeyClaimAlreadyActive
            | Self::KeyClaimAlreadyInactive
            | Self::AuthNotApplied => Code::FailedPrecondition,
            Self::Internal | Self::PayloadEncoding => Code::Internal,
            Self::TransactionAborted => Code::Aborted,
        }
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Domain error: a stable kind, structured context, and an optional cause.
#[derive(Debug)]
pub struct RegistryError {
    kind: ErrorKind,
    context: Vec<(&'static str, String)>,
    source: Option<BoxedSource>,
}

impl RegistryError {
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: Vec::new(),
            source: None,
        }
    }

    /// Appends one `key=value` context entry.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn code(&self) -> Code {
        self.kind.code()
    }

    /// Returns the first context value recorded under `key`.
    #[must_use]
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All context entries in insertion order.
    #[must_use]
    pub fn context_entries(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Shorthand for an [`ErrorKind::Internal`] error wrapping `source`.
    #[must_use]
    pub fn internal(source: impl Into<BoxedSource>) -> Self {
        Self::new(ErrorKind::Internal).with_source(source)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (i, (key, value)) in self.context.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for RegistryError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ValidationErrors> for RegistryError {
    fn from(errors: ValidationErrors) -> Self {
        let mut err = Self::new(ErrorKind::Validation);
        for field_error in errors.iter() {
            err = err.with(field_error.field, &field_error.message);
        }
        err
    }
}

impl From<PageTokenError> for RegistryError {
    fn from(err: PageTokenError) -> Self {
        Self::new(ErrorKind::InvalidPaginationToken).with_source(err)
    }
}

/// Result alias used throughout the registry.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_appends_context_to_base_message() {
        let err = RegistryError::new(ErrorKind::InvalidTransition)
            .with("from", "ACTIVE")
            .with("to", "BLOCKED");
        assert_eq!(err.to_string(), "invalid status transition: from=ACTIVE, to=BLOCKED");
    }

    #[test]
    fn display_without_context_is_base_message() {
        let err = RegistryError::from(ErrorKind::TenantNotFound);
        assert_eq!(err.to_string(), "tenant not found");
    }

    #[test]
    fn context_lookup_returns_first_match() {
        let err = RegistryError::new(ErrorKind::TenantNotActive)
            .with("tenant_id", "t-1")
            .with("status", "BLOCKED");
        assert_eq!(err.context("tenant_id"), Some("t-1"));
        assert_eq!(err.context("status"), Some("BLOCKED"));
        assert_eq!(err.context("missing"), None);
    }

    #[test]
    fn kinds_map_to_code_families() {
        assert_eq!(ErrorKind::Validation.code(), Code::InvalidArgument);
        assert_eq!(ErrorKind::TooManyTypes.code(), Code::InvalidArgument);
        assert_eq!(ErrorKind::NoResourcesFound.code(), Code::NotFound);
        assert_eq!(ErrorKind::TenantAlreadyExists.code(), Code::AlreadyExists);
        assert_eq!(ErrorKind::KeyClaimAlreadyActive.code(), Code::FailedPrecondition);
        assert_eq!(ErrorKind::PayloadEncoding.code(), Code::Internal);
        assert_eq!(ErrorKind::TransactionAborted.code(), Code::Aborted);
    }

    #[test]
    fn internal_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = RegistryError::internal(io);
        assert_eq!(err.code(), Code::Internal);
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "disk gone");
    }
}
