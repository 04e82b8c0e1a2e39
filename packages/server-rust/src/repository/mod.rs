//! Persistence gateway.
//!
//! Managers see a [`Repository`] that opens [`Transaction`]s. A transaction
//! stages creates, patches and deletes and applies them on
//! [`Transaction::commit`]; dropping it without committing rolls back.
//!
//! Backends implement the object-safe [`StorageTransaction`] over JSON rows.
//! The typed facade converts [`Resource`] values to and from rows using the
//! resource's static [`TableSchema`].

pub mod memory;
pub mod query;
pub mod tables;

use async_trait::async_trait;
use registry_core::{ErrorKind, RegistryError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use memory::MemoryRepository;
pub use query::{Cursor, Filter, Join, Query};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// A named uniqueness constraint over one or more fields.
#[derive(Debug)]
pub struct UniqueConstraint {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

/// Static description of a table.
#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    /// Fields forming the primary key, in key order.
    pub primary_key: &'static [&'static str],
    /// Secondary unique constraints. Rows with a null field in a constraint
    /// do not participate in it.
    pub unique: &'static [UniqueConstraint],
}

/// Name reported for a primary-key collision.
pub const PRIMARY_KEY_CONSTRAINT: &str = "primary_key";

impl TableSchema {
    /// Extracts the primary key of `row` in key order.
    ///
    /// # Errors
    ///
    /// [`RepoError::MissingKeyField`] if a key field is absent or not a
    /// string or number.
    pub fn key_of(&'static self, row: &Value) -> Result<Vec<String>, RepoError> {
        self.primary_key
            .iter()
            .map(|&field| {
                key_part(row.get(field)).ok_or(RepoError::MissingKeyField {
                    table: self.name,
                    field,
                })
            })
            .collect()
    }
}

fn key_part(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a repository backend.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint {constraint} violated on {table}")]
    UniqueViolation {
        table: &'static str,
        constraint: &'static str,
    },
    #[error("row not found in {table}")]
    RowNotFound { table: &'static str },
    #[error("row in {table} is missing key field {field}")]
    MissingKeyField {
        table: &'static str,
        field: &'static str,
    },
    #[error("row encoding failed")]
    Encoding(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

impl From<RepoError> for RegistryError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::UniqueViolation { table, constraint } => {
                RegistryError::new(ErrorKind::AlreadyExists)
                    .with("table", table)
                    .with("constraint", constraint)
            }
            other => RegistryError::internal(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// One open backend transaction over JSON rows.
#[async_trait]
pub trait StorageTransaction: Send {
    /// Inserts a new row. Fails on any unique or primary-key collision.
    async fn insert(&mut self, schema: &'static TableSchema, row: Value) -> Result<(), RepoError>;

    async fn fetch(
        &mut self,
        schema: &'static TableSchema,
        key: &[&str],
    ) -> Result<Option<Value>, RepoError>;

    /// Replaces an existing row, matched by primary key.
    async fn update(&mut self, schema: &'static TableSchema, row: Value) -> Result<(), RepoError>;

    /// Deletes a row; returns whether it existed.
    async fn delete(&mut self, schema: &'static TableSchema, key: &[&str])
        -> Result<bool, RepoError>;

    /// Rows matching `query`, ordered by `(created_at, primary key)`.
    async fn select(
        &mut self,
        schema: &'static TableSchema,
        query: &Query,
    ) -> Result<Vec<Value>, RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;
}

/// Opens transactions.
#[async_trait]
pub trait Repository: Send + Sync {
    /// # Errors
    ///
    /// Backend-specific; the in-memory store never fails here.
    async fn begin(&self) -> Result<Transaction, RepoError>;
}

// ---------------------------------------------------------------------------
// Typed facade
// ---------------------------------------------------------------------------

/// An entity stored in its own table.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    const SCHEMA: &'static TableSchema;

    /// Primary-key values in [`TableSchema::primary_key`] order.
    fn key(&self) -> Vec<String>;

    fn created_at(&self) -> i64;
}

/// Typed view over a [`StorageTransaction`].
pub struct Transaction {
    inner: Box<dyn StorageTransaction>,
}

impl Transaction {
    #[must_use]
    pub fn new(inner: Box<dyn StorageTransaction>) -> Self {
        Self { inner }
    }

    /// # Errors
    ///
    /// [`RepoError::UniqueViolation`] on a key or unique-constraint collision.
    pub async fn create<R: Resource>(&mut self, resource: &R) -> Result<(), RepoError> {
        let row = serde_json::to_value(resource)?;
        self.inner.insert(R::SCHEMA, row).await
    }

    /// # Errors
    ///
    /// Backend or decoding failures; absence is `Ok(None)`.
    pub async fn find<R: Resource>(&mut self, key: &[&str]) -> Result<Option<R>, RepoError> {
        match self.inner.fetch(R::SCHEMA, key).await? {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Writes the full resource over its stored row.
    ///
    /// # Errors
    ///
    /// [`RepoError::RowNotFound`] if no row has the resource's key.
    pub async fn patch<R: Resource>(&mut self, resource: &R) -> Result<(), RepoError> {
        let row = serde_json::to_value(resource)?;
        self.inner.update(R::SCHEMA, row).await
    }

    /// # Errors
    ///
    /// Backend failures.
    pub async fn remove<R: Resource>(&mut self, key: &[&str]) -> Result<bool, RepoError> {
        self.inner.delete(R::SCHEMA, key).await
    }

    /// # Errors
    ///
    /// Backend or decoding failures.
    pub async fn list<R: Resource>(&mut self, query: &Query) -> Result<Vec<R>, RepoError> {
        self.inner
            .select(R::SCHEMA, query)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(RepoError::from))
            .collect()
    }

    /// # Errors
    ///
    /// Backend failures; nothing is applied in that case.
    pub async fn commit(self) -> Result<(), RepoError> {
        self.inner.commit().await
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}
