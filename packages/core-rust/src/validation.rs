//! Statically-typed request validation.
//!
//! Each request has an explicit validation method on [`Validator`] listing
//! the fields it checks. Field constraints come from a rule table keyed by
//! field id; [`Validator::new`] checks once, at construction, that every id
//! in the table is declared in [`DECLARED_FIELDS`] and that every pattern
//! compiles.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use regex::Regex;

use crate::auth::ApplyAuth;
use crate::system::{
    MapSystemToTenant, RegionalLocator, RegionalSystemStatus, RegisterSystem, SystemLocator,
    UnmapSystemFromTenant, UpdateL1KeyClaim, UpdateSystemStatus,
};
use crate::tenant::{RegisterTenant, TenantRole};

// ---------------------------------------------------------------------------
// Field ids
// ---------------------------------------------------------------------------

pub mod fields {
    pub const TENANT_ID: &str = "tenant.id";
    pub const TENANT_NAME: &str = "tenant.name";
    pub const TENANT_REGION: &str = "tenant.region";
    pub const TENANT_OWNER_ID: &str = "tenant.owner_id";
    pub const TENANT_OWNER_TYPE: &str = "tenant.owner_type";
    pub const TENANT_ROLE: &str = "tenant.role";
    pub const TENANT_LABELS: &str = "tenant.labels";
    pub const TENANT_USER_GROUPS: &str = "tenant.user_groups";

    pub const SYSTEM_EXTERNAL_ID: &str = "system.external_id";
    pub const SYSTEM_TYPE: &str = "system.type";
    pub const SYSTEM_REGION: &str = "system.region";
    pub const SYSTEM_L2_KEY_ID: &str = "system.l2_key_id";
    pub const SYSTEM_TENANT_ID: &str = "system.tenant_id";
    pub const SYSTEM_STATUS: &str = "system.status";
    pub const SYSTEM_LABELS: &str = "system.labels";

    pub const AUTH_EXTERNAL_ID: &str = "auth.external_id";
    pub const AUTH_TENANT_ID: &str = "auth.tenant_id";
    pub const AUTH_TYPE: &str = "auth.type";
    pub const AUTH_PROPERTIES: &str = "auth.properties";
}

/// Every field id a request type declares.
pub const DECLARED_FIELDS: &[&str] = &[
    fields::TENANT_ID,
    fields::TENANT_NAME,
    fields::TENANT_REGION,
    fields::TENANT_OWNER_ID,
    fields::TENANT_OWNER_TYPE,
    fields::TENANT_ROLE,
    fields::TENANT_LABELS,
    fields::TENANT_USER_GROUPS,
    fields::SYSTEM_EXTERNAL_ID,
    fields::SYSTEM_TYPE,
    fields::SYSTEM_REGION,
    fields::SYSTEM_L2_KEY_ID,
    fields::SYSTEM_TENANT_ID,
    fields::SYSTEM_STATUS,
    fields::SYSTEM_LABELS,
    fields::AUTH_EXTERNAL_ID,
    fields::AUTH_TENANT_ID,
    fields::AUTH_TYPE,
    fields::AUTH_PROPERTIES,
];

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A single constraint on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Non-empty string, or a specified enum value.
    Required,
    /// Maximum length in characters. For maps, applies to keys and values.
    MaxLen(usize),
    /// Regular expression the whole value must match.
    Pattern(&'static str),
}

/// Rules for one field id.
pub type FieldRules = (&'static str, &'static [Rule]);

const ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._:-]*$";
const REGION_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_-]*$";

/// Rule table used by the registry unless overridden.
pub const STANDARD_RULES: &[FieldRules] = &[
    (fields::TENANT_ID, &[Rule::Required, Rule::MaxLen(255), Rule::Pattern(ID_PATTERN)]),
    (fields::TENANT_NAME, &[Rule::Required, Rule::MaxLen(255)]),
    (fields::TENANT_REGION, &[Rule::Required, Rule::MaxLen(64), Rule::Pattern(REGION_PATTERN)]),
    (fields::TENANT_OWNER_ID, &[Rule::Required, Rule::MaxLen(255)]),
    (fields::TENANT_OWNER_TYPE, &[Rule::Required, Rule::MaxLen(64)]),
    (fields::TENANT_ROLE, &[Rule::Required]),
    (fields::TENANT_LABELS, &[Rule::MaxLen(255)]),
    (fields::TENANT_USER_GROUPS, &[Rule::Required, Rule::MaxLen(255)]),
    (fields::SYSTEM_EXTERNAL_ID, &[Rule::Required, Rule::MaxLen(255)]),
    (fields::SYSTEM_TYPE, &[Rule::Required, Rule::MaxLen(64)]),
    (fields::SYSTEM_REGION, &[Rule::Required, Rule::MaxLen(64), Rule::Pattern(REGION_PATTERN)]),
    (fields::SYSTEM_L2_KEY_ID, &[Rule::MaxLen(255)]),
    (fields::SYSTEM_TENANT_ID, &[Rule::Required, Rule::MaxLen(255), Rule::Pattern(ID_PATTERN)]),
    (fields::SYSTEM_STATUS, &[Rule::Required]),
    (fields::SYSTEM_LABELS, &[Rule::MaxLen(255)]),
    (fields::AUTH_EXTERNAL_ID, &[Rule::Required, Rule::MaxLen(255)]),
    (fields::AUTH_TENANT_ID, &[Rule::Required, Rule::MaxLen(255), Rule::Pattern(ID_PATTERN)]),
    (fields::AUTH_TYPE, &[Rule::Required, Rule::MaxLen(64)]),
    (fields::AUTH_PROPERTIES, &[Rule::MaxLen(1024)]),
];

/// Rule table rejected at construction.
#[derive(Debug, thiserror::Error)]
pub enum RuleConfigError {
    #[error("rule table references undeclared field id {0:?}")]
    UnknownField(&'static str),
    #[error("invalid pattern for field {field:?}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// All rejected fields of one request, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("{} invalid field(s)", .0.len())]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl fmt::Display) {
        self.0.push(FieldError {
            field,
            message: message.to_string(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error was recorded for `field`.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum CompiledRule {
    Required,
    MaxLen(usize),
    Pattern(Regex),
}

/// Applies the rule table to typed requests.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: HashMap<&'static str, Vec<CompiledRule>>,
}

impl Validator {
    /// Builds a validator, checking the table against [`DECLARED_FIELDS`].
    ///
    /// # Errors
    ///
    /// [`RuleConfigError::UnknownField`] for an undeclared id,
    /// [`RuleConfigError::InvalidPattern`] for a pattern that does not compile.
    pub fn new(table: &[FieldRules]) -> Result<Self, RuleConfigError> {
        let mut rules = HashMap::with_capacity(table.len());
        for (field, field_rules) in table {
            if !DECLARED_FIELDS.contains(field) {
                return Err(RuleConfigError::UnknownField(field));
            }
            let mut compiled = Vec::with_capacity(field_rules.len());
            for rule in *field_rules {
                compiled.push(match rule {
                    Rule::Required => CompiledRule::Required,
                    Rule::MaxLen(n) => CompiledRule::MaxLen(*n),
                    Rule::Pattern(p) => CompiledRule::Pattern(
                        Regex::new(p)
                            .map_err(|source| RuleConfigError::InvalidPattern { field, source })?,
                    ),
                });
            }
            rules.insert(*field, compiled);
        }
        Ok(Self { rules })
    }

    /// Validator over [`STANDARD_RULES`].
    ///
    /// # Errors
    ///
    /// See [`Validator::new`].
    pub fn standard() -> Result<Self, RuleConfigError> {
        Self::new(STANDARD_RULES)
    }

    fn rules(&self, field: &str) -> &[CompiledRule] {
        self.rules.get(field).map_or(&[], Vec::as_slice)
    }

    fn check_str(&self, field: &'static str, value: &str, errors: &mut ValidationErrors) {
        for rule in self.rules(field) {
            match rule {
                CompiledRule::Required => {
                    if value.trim().is_empty() {
                        errors.push(field, "must not be empty");
                        // The remaining rules only add noise for an empty value.
                        return;
                    }
                }
                CompiledRule::MaxLen(max) => {
                    if value.chars().count() > *max {
                        errors.push(field, format!("must be at most {max} characters"));
                    }
                }
                CompiledRule::Pattern(re) => {
                    if !value.is_empty() && !re.is_match(value) {
                        errors.push(field, format!("must match {}", re.as_str()));
                    }
                }
            }
        }
    }

    fn check_optional_str(
        &self,
        field: &'static str,
        value: Option<&str>,
        errors: &mut ValidationErrors,
    ) {
        match value {
            None => {}
            Some(v) if v.trim().is_empty() => errors.push(field, "must be omitted or non-empty"),
            Some(v) => self.check_str(field, v, errors),
        }
    }

    fn check_specified(&self, field: &'static str, specified: bool, errors: &mut ValidationErrors) {
        let required = self
            .rules(field)
            .iter()
            .any(|r| matches!(r, CompiledRule::Required));
        if required && !specified {
            errors.push(field, "must be specified");
        }
    }

    fn check_map(
        &self,
        field: &'static str,
        map: &BTreeMap<String, String>,
        errors: &mut ValidationErrors,
    ) {
        let max = self.rules(field).iter().find_map(|r| match r {
            CompiledRule::MaxLen(n) => Some(*n),
            _ => None,
        });
        for (key, value) in map {
            if key.trim().is_empty() {
                errors.push(field, "keys must not be empty");
            }
            if let Some(max) = max {
                if key.chars().count() > max || value.chars().count() > max {
                    errors.push(field, format!("entry {key:?} exceeds {max} characters"));
                }
            }
        }
    }

    fn check_keys(&self, field: &'static str, keys: &[String], errors: &mut ValidationErrors) {
        if keys.is_empty() {
            errors.push(field, "at least one key is required");
        }
        if keys.iter().any(|k| k.trim().is_empty()) {
            errors.push(field, "keys must not be empty");
        }
    }

    fn check_system_locator(&self, locator: &SystemLocator, errors: &mut ValidationErrors) {
        self.check_str(fields::SYSTEM_EXTERNAL_ID, &locator.external_id, errors);
        self.check_optional_str(fields::SYSTEM_TYPE, locator.system_type.as_deref(), errors);
    }

    fn check_regional_locator(&self, locator: &RegionalLocator, errors: &mut ValidationErrors) {
        self.check_system_locator(&locator.system, errors);
        self.check_str(fields::SYSTEM_REGION, &locator.region, errors);
    }

    // ----- tenant -----

    /// # Errors
    ///
    /// Lists every rejected field.
    pub fn register_tenant(&self, request: &RegisterTenant) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::TENANT_ID, &request.id, &mut errors);
        self.check_str(fields::TENANT_NAME, &request.name, &mut errors);
        self.check_str(fields::TENANT_REGION, &request.region, &mut errors);
        self.check_str(fields::TENANT_OWNER_ID, &request.owner.id, &mut errors);
        self.check_str(fields::TENANT_OWNER_TYPE, &request.owner.owner_type, &mut errors);
        self.check_specified(
            fields::TENANT_ROLE,
            request.role != TenantRole::Unspecified,
            &mut errors,
        );
        self.check_map(fields::TENANT_LABELS, &request.labels, &mut errors);
        for group in &request.user_groups {
            self.check_str(fields::TENANT_USER_GROUPS, group, &mut errors);
        }
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects an empty or malformed tenant id.
    pub fn tenant_id(&self, id: &str) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::TENANT_ID, id, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad tenant id or an empty label map.
    pub fn set_tenant_labels(
        &self,
        id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::TENANT_ID, id, &mut errors);
        if labels.is_empty() {
            errors.push(fields::TENANT_LABELS, "at least one label is required");
        }
        self.check_map(fields::TENANT_LABELS, labels, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad tenant id or an empty key list.
    pub fn remove_tenant_labels(&self, id: &str, keys: &[String]) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::TENANT_ID, id, &mut errors);
        self.check_keys(fields::TENANT_LABELS, keys, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad tenant id or an empty group name.
    pub fn set_tenant_user_groups(
        &self,
        id: &str,
        groups: &[String],
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::TENANT_ID, id, &mut errors);
        for group in groups {
            self.check_str(fields::TENANT_USER_GROUPS, group, &mut errors);
        }
        errors.into_result()
    }

    // ----- system -----

    /// # Errors
    ///
    /// Lists every rejected field.
    pub fn register_system(&self, request: &RegisterSystem) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::SYSTEM_EXTERNAL_ID, &request.external_id, &mut errors);
        self.check_str(fields::SYSTEM_TYPE, &request.system_type, &mut errors);
        self.check_str(fields::SYSTEM_REGION, &request.region, &mut errors);
        self.check_str(fields::SYSTEM_L2_KEY_ID, &request.l2_key_id, &mut errors);
        self.check_map(fields::SYSTEM_LABELS, &request.labels, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects an empty external id or an empty-string type.
    pub fn system_locator(&self, locator: &SystemLocator) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_system_locator(locator, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad locator.
    pub fn regional_locator(&self, locator: &RegionalLocator) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_regional_locator(locator, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Lists every rejected field.
    pub fn map_system(&self, request: &MapSystemToTenant) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::SYSTEM_EXTERNAL_ID, &request.external_id, &mut errors);
        self.check_str(fields::SYSTEM_TYPE, &request.system_type, &mut errors);
        self.check_str(fields::SYSTEM_TENANT_ID, &request.tenant_id, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Lists every rejected field.
    pub fn unmap_system(&self, request: &UnmapSystemFromTenant) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_system_locator(&request.system, &mut errors);
        self.check_str(fields::SYSTEM_TENANT_ID, &request.tenant_id, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Lists every rejected field.
    pub fn update_l1_key_claim(&self, request: &UpdateL1KeyClaim) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_regional_locator(&request.target, &mut errors);
        self.check_str(fields::SYSTEM_TENANT_ID, &request.tenant_id, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad locator or an `UNSPECIFIED` status.
    pub fn update_system_status(
        &self,
        request: &UpdateSystemStatus,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_specified(
            fields::SYSTEM_STATUS,
            request.status != RegionalSystemStatus::Unspecified,
            &mut errors,
        );
        self.check_regional_locator(&request.target, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad locator or an empty label map.
    pub fn set_system_labels(
        &self,
        locator: &RegionalLocator,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_regional_locator(locator, &mut errors);
        if labels.is_empty() {
            errors.push(fields::SYSTEM_LABELS, "at least one label is required");
        }
        self.check_map(fields::SYSTEM_LABELS, labels, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects a bad locator or an empty key list.
    pub fn remove_system_labels(
        &self,
        locator: &RegionalLocator,
        keys: &[String],
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_regional_locator(locator, &mut errors);
        self.check_keys(fields::SYSTEM_LABELS, keys, &mut errors);
        errors.into_result()
    }

    // ----- auth -----

    /// # Errors
    ///
    /// Lists every rejected field.
    pub fn apply_auth(&self, request: &ApplyAuth) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::AUTH_EXTERNAL_ID, &request.external_id, &mut errors);
        self.check_str(fields::AUTH_TENANT_ID, &request.tenant_id, &mut errors);
        self.check_str(fields::AUTH_TYPE, &request.auth_type, &mut errors);
        self.check_map(fields::AUTH_PROPERTIES, &request.properties, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects an empty external id.
    pub fn auth_external_id(&self, external_id: &str) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::AUTH_EXTERNAL_ID, external_id, &mut errors);
        errors.into_result()
    }

    /// # Errors
    ///
    /// Rejects an empty tenant id.
    pub fn auth_tenant_id(&self, tenant_id: &str) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        self.check_str(fields::AUTH_TENANT_ID, tenant_id, &mut errors);
        errors.into_result()
    }
}
