//! Opaque page tokens and result pages.
//!
//! A token is URL-safe base64 (no padding) of the JSON object
//! `{"created_at": <i64>, "key": {<field>: <value>, ...}}` naming the last
//! row of the previous page. Key field names are checked against the listed
//! table's primary-key fields on both encode and decode, so a token never
//! smuggles an arbitrary column into a query.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Resume position: the `(created_at, key)` of the last row returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub created_at: i64,
    pub key: BTreeMap<String, String>,
}

/// Reasons a page token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageTokenError {
    #[error("page token is empty")]
    Empty,
    #[error("page token is malformed")]
    InvalidFormat,
    #[error("page token key field {0:?} is not allowed")]
    DisallowedField(String),
    #[error("page token is missing key field {0:?}")]
    MissingField(String),
}

impl PageToken {
    /// Encodes the token after checking its key against `allowed`.
    ///
    /// # Errors
    ///
    /// [`PageTokenError::DisallowedField`] or [`PageTokenError::MissingField`]
    /// when the key does not consist of exactly the allowed fields.
    pub fn encode(&self, allowed: &[&str]) -> Result<String, PageTokenError> {
        self.check_fields(allowed)?;
        let json = serde_json::to_vec(self).map_err(|_| PageTokenError::InvalidFormat)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes and checks a client-supplied token.
    ///
    /// # Errors
    ///
    /// [`PageTokenError::Empty`] for an empty string,
    /// [`PageTokenError::InvalidFormat`] for anything that is not base64 JSON
    /// of the expected shape, and field errors as in [`PageToken::encode`].
    pub fn decode(encoded: &str, allowed: &[&str]) -> Result<Self, PageTokenError> {
        if encoded.is_empty() {
            return Err(PageTokenError::Empty);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| PageTokenError::InvalidFormat)?;
        let token: Self =
            serde_json::from_slice(&bytes).map_err(|_| PageTokenError::InvalidFormat)?;
        token.check_fields(allowed)?;
        Ok(token)
    }

    fn check_fields(&self, allowed: &[&str]) -> Result<(), PageTokenError> {
        if let Some(field) = self.key.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(PageTokenError::DisallowedField(field.clone()));
        }
        if let Some(field) = allowed.iter().find(|f| !self.key.contains_key(**f)) {
            return Err(PageTokenError::MissingField((*field).to_string()));
        }
        Ok(())
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present only when more rows follow.
    pub next_page_token: Option<String>,
}

/// Resolves a requested page size: 0 picks `default`, anything else is capped
/// at `max`.
#[must_use]
pub fn effective_limit(requested: usize, default: usize, max: usize) -> usize {
    match requested {
        0 => default.min(max),
        n => n.min(max),
    }
}
