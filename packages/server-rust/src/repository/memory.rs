//! In-memory [`Repository`] with serializable transactions.
//!
//! A transaction holds the store's async mutex for its whole lifetime and
//! works on a private copy of the tables. Commit swaps the copy in; drop
//! discards it. Transactions therefore run one at a time, and a caller
//! waiting for the lock is bounded only by its own transaction deadline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::query::{Cursor, Query};
use super::{
    RepoError, Repository, StorageTransaction, TableSchema, Transaction, PRIMARY_KEY_CONSTRAINT,
};

type Table = BTreeMap<Vec<String>, Value>;

#[derive(Debug, Clone, Default)]
struct Tables {
    tables: HashMap<&'static str, Table>,
}

/// Process-local repository backed by ordered maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<Tables>>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> Result<Transaction, RepoError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Transaction::new(Box::new(MemoryTransaction { guard, working })))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn owned_key(key: &[&str]) -> Vec<String> {
    key.iter().map(|k| (*k).to_string()).collect()
}

fn created_at(row: &Value) -> i64 {
    row.get("created_at").and_then(Value::as_i64).unwrap_or(0)
}

/// Rejects `row` if it collides with another row on a unique constraint.
fn check_unique(
    table: &Table,
    schema: &'static TableSchema,
    row: &Value,
    own_key: Option<&Vec<String>>,
) -> Result<(), RepoError> {
    for constraint in schema.unique {
        let values: Option<Vec<&Value>> = constraint
            .fields
            .iter()
            .map(|f| row.get(*f).filter(|v| !v.is_null()))
            .collect();
        let Some(values) = values else {
            continue;
        };
        let collides = table.iter().any(|(key, other)| {
            Some(key) != own_key
                && constraint
                    .fields
                    .iter()
                    .zip(&values)
                    .all(|(f, v)| other.get(*f) == Some(*v))
        });
        if collides {
            return Err(RepoError::UniqueViolation {
                table: schema.name,
                constraint: constraint.name,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn insert(&mut self, schema: &'static TableSchema, row: Value) -> Result<(), RepoError> {
        let key = schema.key_of(&row)?;
        let table = self.working.tables.entry(schema.name).or_default();
        if table.contains_key(&key) {
            return Err(RepoError::UniqueViolation {
                table: schema.name,
                constraint: PRIMARY_KEY_CONSTRAINT,
            });
        }
        check_unique(table, schema, &row, None)?;
        table.insert(key, row);
        Ok(())
    }

    async fn fetch(
        &mut self,
        schema: &'static TableSchema,
        key: &[&str],
    ) -> Result<Option<Value>, RepoError> {
        Ok(self
            .working
            .tables
            .get(schema.name)
            .and_then(|t| t.get(&owned_key(key)))
            .cloned())
    }

    async fn update(&mut self, schema: &'static TableSchema, row: Value) -> Result<(), RepoError> {
        let key = schema.key_of(&row)?;
        let table = self.working.tables.entry(schema.name).or_default();
        if !table.contains_key(&key) {
            return Err(RepoError::RowNotFound { table: schema.name });
        }
        check_unique(table, schema, &row, Some(&key))?;
        table.insert(key, row);
        Ok(())
    }

    async fn delete(
        &mut self,
        schema: &'static TableSchema,
        key: &[&str],
    ) -> Result<bool, RepoError> {
        Ok(self
            .working
            .tables
            .get_mut(schema.name)
            .is_some_and(|t| t.remove(&owned_key(key)).is_some()))
    }

    async fn select(
        &mut self,
        schema: &'static TableSchema,
        query: &Query,
    ) -> Result<Vec<Value>, RepoError> {
        let Some(table) = self.working.tables.get(schema.name) else {
            return Ok(Vec::new());
        };
        let partners = query
            .join
            .as_ref()
            .map(|join| (join, self.working.tables.get(join.schema.name)));

        let mut rows: Vec<(Cursor, &Value)> = table
            .iter()
            .filter(|(_, row)| query.matches(row))
            .filter(|(_, row)| match &partners {
                None => true,
                Some((_, None)) => false,
                Some((join, Some(partner_table))) => {
                    let Some(local) = row.get(join.local_field) else {
                        return false;
                    };
                    partner_table.values().any(|partner| {
                        partner.get(join.foreign_field) == Some(local)
                            && join.filters.iter().all(|f| f.matches(partner))
                    })
                }
            })
            .map(|(key, row)| {
                (
                    Cursor {
                        created_at: created_at(row),
                        key: key.clone(),
                    },
                    row,
                )
            })
            .filter(|(cursor, _)| query.after.as_ref().map_or(true, |after| cursor > after))
            .collect();

        rows.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows.into_iter().map(|(_, row)| row.clone()).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
