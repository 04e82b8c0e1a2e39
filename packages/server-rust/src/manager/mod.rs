//! Domain managers.
//!
//! Each manager method validates its request before touching storage, then
//! runs read-validate-write-enqueue inside one transaction bounded by
//! [`RegistryConfig::transaction_timeout_ms`]. Concurrency control is left to
//! the repository's isolation and uniqueness constraints.

pub mod auth;
pub mod system;
pub mod tenant;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use registry_core::pagination::effective_limit;
use registry_core::{ErrorKind, Page, PageToken, RegistryError, Result, Tenant, Validator};
use tracing::warn;

use crate::orchestrator::Orchestrator;
use crate::repository::{Cursor, Repository, Resource, Transaction};
use crate::service::config::RegistryConfig;

pub use auth::AuthManager;
pub use system::SystemManager;
pub use tenant::TenantManager;

// ---------------------------------------------------------------------------
// ManagerContext
// ---------------------------------------------------------------------------

/// Collaborators shared by every manager and job adapter.
#[derive(Clone)]
pub struct ManagerContext {
    pub repo: Arc<dyn Repository>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub validator: Arc<Validator>,
    pub config: Arc<RegistryConfig>,
}

impl ManagerContext {
    #[must_use]
    pub fn new(
        repo: Arc<dyn Repository>,
        orchestrator: Arc<dyn Orchestrator>,
        validator: Arc<Validator>,
        config: Arc<RegistryConfig>,
    ) -> Self {
        Self {
            repo,
            orchestrator,
            validator,
            config,
        }
    }

    /// Runs `work` under the transaction deadline. On expiry the future is
    /// dropped, which rolls back any open transaction inside it.
    ///
    /// # Errors
    ///
    /// Whatever `work` returns, or [`ErrorKind::TransactionAborted`] on expiry.
    pub async fn transact<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout_ms = self.config.transaction_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms, "transaction deadline exceeded");
                Err(RegistryError::new(ErrorKind::TransactionAborted)
                    .with("operation", operation)
                    .with("timeout_ms", timeout_ms))
            }
        }
    }

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Repository failures, as [`ErrorKind::Internal`].
    pub async fn begin(&self) -> Result<Transaction> {
        Ok(self.repo.begin().await?)
    }

    #[must_use]
    pub fn page_limit(&self, requested: usize) -> usize {
        effective_limit(
            requested,
            self.config.default_page_size,
            self.config.max_page_size,
        )
        .max(1)
    }
}

impl std::fmt::Debug for ManagerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Shared lookups
// ---------------------------------------------------------------------------

/// # Errors
///
/// [`ErrorKind::TenantNotFound`] if absent.
pub(crate) async fn load_tenant(tx: &mut Transaction, tenant_id: &str) -> Result<Tenant> {
    tx.find::<Tenant>(&[tenant_id])
        .await?
        .ok_or_else(|| RegistryError::new(ErrorKind::TenantNotFound).with("tenant_id", tenant_id))
}

/// # Errors
///
/// [`ErrorKind::TenantNotFound`] or [`ErrorKind::TenantNotActive`].
pub(crate) async fn load_active_tenant(tx: &mut Transaction, tenant_id: &str) -> Result<Tenant> {
    let tenant = load_tenant(tx, tenant_id).await?;
    tenant.ensure_active()?;
    Ok(tenant)
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Decodes a client page token into a cursor over `R`'s table.
///
/// # Errors
///
/// [`ErrorKind::InvalidPaginationToken`] for empty, garbled, or foreign tokens.
pub(crate) fn decode_cursor<R: Resource>(token: Option<&str>) -> Result<Option<Cursor>> {
    let Some(token) = token else {
        return Ok(None);
    };
    let fields = R::SCHEMA.primary_key;
    let token = PageToken::decode(token, fields)?;
    let key = fields
        .iter()
        .map(|field| token.key.get(*field).cloned().unwrap_or_default())
        .collect();
    Ok(Some(Cursor {
        created_at: token.created_at,
        key,
    }))
}

/// Builds a page from rows fetched with `limit + 1`; the extra row only
/// signals that another page exists.
///
/// # Errors
///
/// [`ErrorKind::NoResourcesFound`] when `rows` is empty.
pub(crate) fn into_page<R: Resource>(mut rows: Vec<R>, limit: usize) -> Result<Page<R>> {
    if rows.is_empty() {
        return Err(RegistryError::new(ErrorKind::NoResourcesFound).with("table", R::SCHEMA.name));
    }
    let next_page_token = if rows.len() > limit {
        rows.truncate(limit);
        rows.last().map(page_token_after).transpose()?
    } else {
        None
    };
    Ok(Page {
        items: rows,
        next_page_token,
    })
}

fn page_token_after<R: Resource>(last: &R) -> Result<String> {
    let fields = R::SCHEMA.primary_key;
    let token = PageToken {
        created_at: last.created_at(),
        key: fields
            .iter()
            .map(|f| (*f).to_string())
            .zip(last.key())
            .collect(),
    };
    token.encode(fields).map_err(RegistryError::internal)
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::repository::Repository;

    #[tokio::test]
    async fn expired_transaction_maps_to_aborted() {
        let fixture = fixture_with(RegistryConfig {
            transaction_timeout_ms: 20,
            ..RegistryConfig::default()
        });
        let _held = fixture.repo.begin().await.unwrap();

        let err = fixture
            .ctx
            .transact("held_lock", async {
                let _tx = fixture.ctx.begin().await?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionAborted);
        assert_eq!(err.code(), registry_core::Code::Aborted);
    }

    #[tokio::test]
    async fn page_has_token_only_when_more_rows_follow() {
        let fixture = fixture();
        for (i, id) in ["t-1", "t-2", "t-3"].into_iter().enumerate() {
            let mut tenant = Tenant::provisioning(&tenant_request(id), i as i64);
            tenant.created_at = i as i64;
            let mut tx = fixture.repo.begin().await.unwrap();
            tx.create(&tenant).await.unwrap();
            tx.commit().await.unwrap();
        }
        let mut tx = fixture.repo.begin().await.unwrap();
        let rows: Vec<Tenant> = tx
            .list(&crate::repository::Query::new().limit(3))
            .await
            .unwrap();
        drop(tx);

        let page = into_page(rows.clone(), 2).unwrap();
        assert_eq!(page.items.len(), 2);
        let cursor = decode_cursor::<Tenant>(page.next_page_token.as_deref())
            .unwrap()
            .unwrap();
        assert_eq!(cursor.key, vec!["t-2".to_string()]);

        let last = into_page(rows, 3).unwrap();
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn empty_rows_are_not_found() {
        let err = into_page::<Tenant>(Vec::new(), 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResourcesFound);
    }

    proptest::proptest! {
        #[test]
        fn page_limit_stays_within_bounds(
            requested in 0usize..10_000,
            default in 0usize..600,
            max in 1usize..600,
        ) {
            let fixture = fixture_with(RegistryConfig {
                default_page_size: default,
                max_page_size: max,
                ..RegistryConfig::default()
            });
            let limit = fixture.ctx.page_limit(requested);
            proptest::prop_assert!((1..=max).contains(&limit));
            if requested > 0 {
                proptest::prop_assert_eq!(limit, requested.min(max));
            }
        }
    }

    #[test]
    fn empty_token_is_invalid() {
        let err = decode_cursor::<Tenant>(Some("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPaginationToken);
    }
}
