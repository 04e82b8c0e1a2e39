//! System and regional-system linkage manager.
//!
//! There is no manager-level lock. Each operation runs in one transaction and
//! races on creation resolve through the `(external_id, system_type)` and
//! `(system_id, region)` uniqueness of the repository.

use registry_core::types::{merge_labels, now_millis, remove_labels};
use registry_core::{
    ErrorKind, Labels, ListSystems, MapSystemToTenant, Page, RegionalLocator, RegionalSystem,
    RegionalSystemStatus, RegisterSystem, RegistryError, Result, System, SystemLocator, SystemView,
    UnmapSystemFromTenant, UpdateL1KeyClaim, UpdateSystemStatus,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::{decode_cursor, into_page, load_active_tenant, ManagerContext};
use crate::repository::tables::SYSTEMS;
use crate::repository::{Join, Query, Transaction};

#[derive(Debug, Clone)]
pub struct SystemManager {
    ctx: ManagerContext,
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// Resolves a locator to its global system.
///
/// # Errors
///
/// - [`ErrorKind::SystemNotFound`] if nothing matches.
/// - [`ErrorKind::TooManyTypes`] if the type is omitted and several systems
///   share the external id.
async fn find_system(tx: &mut Transaction, locator: &SystemLocator) -> Result<System> {
    let query = Query::new()
        .filter("external_id", locator.external_id.as_str())
        .filter_opt("system_type", locator.system_type.as_deref())
        .limit(2);
    let mut found = tx.list::<System>(&query).await?;
    match found.len() {
        0 => Err(RegistryError::new(ErrorKind::SystemNotFound)
            .with("external_id", &locator.external_id)),
        1 => Ok(found.remove(0)),
        _ => Err(RegistryError::new(ErrorKind::TooManyTypes)
            .with("external_id", &locator.external_id)),
    }
}

async fn find_exact(
    tx: &mut Transaction,
    external_id: &str,
    system_type: &str,
) -> Result<Option<System>> {
    let query = Query::new()
        .filter("external_id", external_id)
        .filter("system_type", system_type)
        .limit(1);
    Ok(tx.list::<System>(&query).await?.into_iter().next())
}

/// # Errors
///
/// Lookup failures of [`find_system`], or [`ErrorKind::RegionalSystemNotFound`].
async fn find_regional(
    tx: &mut Transaction,
    locator: &RegionalLocator,
) -> Result<(System, RegionalSystem)> {
    let system = find_system(tx, &locator.system).await?;
    let regional = tx
        .find::<RegionalSystem>(&[system.id.as_str(), locator.region.as_str()])
        .await?
        .ok_or_else(|| {
            RegistryError::new(ErrorKind::RegionalSystemNotFound)
                .with("external_id", &system.external_id)
                .with("region", &locator.region)
        })?;
    Ok((system, regional))
}

async fn regional_rows(tx: &mut Transaction, system_id: &str) -> Result<Vec<RegionalSystem>> {
    Ok(tx
        .list::<RegionalSystem>(&Query::new().filter("system_id", system_id))
        .await?)
}

/// Every regional row must be `AVAILABLE` and free of an L1 key claim before
/// the tenant link may change.
async fn ensure_rows_settled(tx: &mut Transaction, system_id: &str) -> Result<()> {
    for row in regional_rows(tx, system_id).await? {
        row.ensure_available()?;
        row.ensure_claim_free()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SystemManager
// ---------------------------------------------------------------------------

impl SystemManager {
    #[must_use]
    pub fn new(ctx: ManagerContext) -> Self {
        Self { ctx }
    }

    /// Links a system to an `ACTIVE` tenant, creating the system if unknown.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::TenantNotActive`] or [`ErrorKind::TenantNotFound`].
    /// - [`ErrorKind::SystemIsLinkedToTenant`] if any link exists, even to
    ///   the same tenant.
    /// - [`ErrorKind::RegionalSystemNotAvailable`] or
    ///   [`ErrorKind::SystemHasL1KeyClaim`] for an unsettled regional row.
    pub async fn map_system_to_tenant(&self, request: MapSystemToTenant) -> Result<System> {
        self.ctx.validator.map_system(&request)?;
        self.ctx
            .transact("map_system_to_tenant", async {
                let mut tx = self.ctx.begin().await?;
                load_active_tenant(&mut tx, &request.tenant_id).await?;
                let now = now_millis();
                let system =
                    match find_exact(&mut tx, &request.external_id, &request.system_type).await? {
                        Some(mut system) => {
                            system.ensure_unlinked()?;
                            ensure_rows_settled(&mut tx, &system.id).await?;
                            system.tenant_id = Some(request.tenant_id.clone());
                            system.updated_at = now;
                            tx.patch(&system).await?;
                            system
                        }
                        None => {
                            let system = System {
                                id: Uuid::new_v4().to_string(),
                                external_id: request.external_id.clone(),
                                system_type: request.system_type.clone(),
                                tenant_id: Some(request.tenant_id.clone()),
                                created_at: now,
                                updated_at: now,
                            };
                            tx.create(&system).await?;
                            system
                        }
                    };
                tx.commit().await?;
                info!(
                    external_id = %system.external_id,
                    system_type = %system.system_type,
                    tenant_id = %request.tenant_id,
                    "system mapped to tenant"
                );
                Ok(system)
            })
            .await
    }

    /// Clears the tenant link of a system.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::SystemIsNotLinkedToTenant`] unless linked to the tenant.
    /// - [`ErrorKind::TenantNotActive`] if the tenant is not `ACTIVE`.
    /// - Regional row violations as for [`Self::map_system_to_tenant`].
    pub async fn unmap_system_from_tenant(&self, request: UnmapSystemFromTenant) -> Result<System> {
        self.ctx.validator.unmap_system(&request)?;
        self.ctx
            .transact("unmap_system_from_tenant", async {
                let mut tx = self.ctx.begin().await?;
                let mut system = find_system(&mut tx, &request.system).await?;
                system.ensure_linked_to(&request.tenant_id)?;
                load_active_tenant(&mut tx, &request.tenant_id).await?;
                ensure_rows_settled(&mut tx, &system.id).await?;
                system.tenant_id = None;
                system.updated_at = now_millis();
                tx.patch(&system).await?;
                tx.commit().await?;
                info!(
                    external_id = %system.external_id,
                    tenant_id = %request.tenant_id,
                    "system unmapped from tenant"
                );
                Ok(system)
            })
            .await
    }

    /// Adds a regional row, creating the global system on first registration.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::RegionalSystemAlreadyExists`] if the region is already
    /// registered for this system.
    pub async fn register_system(&self, request: RegisterSystem) -> Result<SystemView> {
        self.ctx.validator.register_system(&request)?;
        self.ctx
            .transact("register_system", async {
                let mut tx = self.ctx.begin().await?;
                let now = now_millis();
                let system =
                    match find_exact(&mut tx, &request.external_id, &request.system_type).await? {
                        Some(system) => system,
                        None => {
                            let system = System {
                                id: Uuid::new_v4().to_string(),
                                external_id: request.external_id.clone(),
                                system_type: request.system_type.clone(),
                                tenant_id: None,
                                created_at: now,
                                updated_at: now,
                            };
                            tx.create(&system).await?;
                            debug!(system_id = %system.id, "system identity created");
                            system
                        }
                    };
                let status = match request.status {
                    RegionalSystemStatus::Unspecified => RegionalSystemStatus::Available,
                    status => status,
                };
                let regional = RegionalSystem {
                    system_id: system.id.clone(),
                    region: request.region.clone(),
                    status,
                    l2_key_id: request.l2_key_id.clone(),
                    has_l1_key_claim: request.has_l1_key_claim,
                    labels: request.labels.clone(),
                    created_at: now,
                    updated_at: now,
                };
                if let Err(err) = tx.create(&regional).await {
                    if err.is_unique_violation() {
                        return Err(RegistryError::new(ErrorKind::RegionalSystemAlreadyExists)
                            .with("external_id", &system.external_id)
                            .with("region", &regional.region));
                    }
                    return Err(err.into());
                }
                tx.commit().await?;
                info!(
                    external_id = %system.external_id,
                    system_type = %system.system_type,
                    region = %regional.region,
                    "regional system registered"
                );
                Ok(SystemView { system, regional })
            })
            .await
    }

    /// Deletes one regional row, and the global system with its last row.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::RegionalSystemNotAvailable`] unless the row is `AVAILABLE`.
    /// - [`ErrorKind::SystemIsLinkedToTenant`] while a tenant link exists.
    pub async fn delete_system(&self, locator: RegionalLocator) -> Result<()> {
        self.ctx.validator.regional_locator(&locator)?;
        self.ctx
            .transact("delete_system", async {
                let mut tx = self.ctx.begin().await?;
                let (system, regional) = find_regional(&mut tx, &locator).await?;
                regional.ensure_available()?;
                system.ensure_unlinked()?;
                tx.remove::<RegionalSystem>(&[system.id.as_str(), regional.region.as_str()])
                    .await?;
                let remaining = tx
                    .list::<RegionalSystem>(
                        &Query::new().filter("system_id", system.id.as_str()).limit(1),
                    )
                    .await?;
                let identity_removed = remaining.is_empty();
                if identity_removed {
                    tx.remove::<System>(&[system.id.as_str()]).await?;
                }
                tx.commit().await?;
                info!(
                    external_id = %system.external_id,
                    region = %regional.region,
                    identity_removed,
                    "regional system deleted"
                );
                Ok(())
            })
            .await
    }

    /// Sets or clears the L1 key claim of a regional row.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::KeyClaimAlreadyActive`] or
    ///   [`ErrorKind::KeyClaimAlreadyInactive`] for a request that changes
    ///   nothing; an unreported claim counts as inactive.
    /// - [`ErrorKind::RegionalSystemNotAvailable`] unless the row is `AVAILABLE`.
    /// - [`ErrorKind::SystemIsNotLinkedToTenant`] unless linked to the tenant.
    pub async fn update_l1_key_claim(&self, request: UpdateL1KeyClaim) -> Result<SystemView> {
        self.ctx.validator.update_l1_key_claim(&request)?;
        self.ctx
            .transact("update_l1_key_claim", async {
                let mut tx = self.ctx.begin().await?;
                let (system, mut regional) = find_regional(&mut tx, &request.target).await?;
                if regional.has_claim() == request.l1_key_claim {
                    let kind = if request.l1_key_claim {
                        ErrorKind::KeyClaimAlreadyActive
                    } else {
                        ErrorKind::KeyClaimAlreadyInactive
                    };
                    return Err(RegistryError::new(kind)
                        .with("external_id", &system.external_id)
                        .with("region", &regional.region));
                }
                regional.ensure_available()?;
                system.ensure_linked_to(&request.tenant_id)?;
                regional.has_l1_key_claim = Some(request.l1_key_claim);
                regional.updated_at = now_millis();
                tx.patch(&regional).await?;
                tx.commit().await?;
                info!(
                    external_id = %system.external_id,
                    region = %regional.region,
                    l1_key_claim = request.l1_key_claim,
                    "l1 key claim updated"
                );
                Ok(SystemView { system, regional })
            })
            .await
    }

    /// # Errors
    ///
    /// [`ErrorKind::Validation`] for `UNSPECIFIED`, or lookup failures.
    pub async fn update_system_status(&self, request: UpdateSystemStatus) -> Result<SystemView> {
        self.ctx.validator.update_system_status(&request)?;
        let status = request.status;
        self.update_regional("update_system_status", &request.target, move |row| {
            row.status = status;
        })
        .await
    }

    /// # Errors
    ///
    /// Validation or lookup failures.
    pub async fn set_system_labels(
        &self,
        locator: RegionalLocator,
        labels: Labels,
    ) -> Result<SystemView> {
        self.ctx.validator.set_system_labels(&locator, &labels)?;
        self.update_regional("set_system_labels", &locator, |row| {
            merge_labels(&mut row.labels, &labels);
        })
        .await
    }

    /// # Errors
    ///
    /// Validation or lookup failures.
    pub async fn remove_system_labels(
        &self,
        locator: RegionalLocator,
        keys: Vec<String>,
    ) -> Result<SystemView> {
        self.ctx.validator.remove_system_labels(&locator, &keys)?;
        self.update_regional("remove_system_labels", &locator, |row| {
            remove_labels(&mut row.labels, &keys);
        })
        .await
    }

    async fn update_regional<F>(
        &self,
        operation: &'static str,
        locator: &RegionalLocator,
        apply: F,
    ) -> Result<SystemView>
    where
        F: FnOnce(&mut RegionalSystem) + Send,
    {
        self.ctx
            .transact(operation, async {
                let mut tx = self.ctx.begin().await?;
                let (system, mut regional) = find_regional(&mut tx, locator).await?;
                apply(&mut regional);
                regional.updated_at = now_millis();
                tx.patch(&regional).await?;
                tx.commit().await?;
                info!(
                    external_id = %system.external_id,
                    region = %regional.region,
                    operation,
                    "regional system updated"
                );
                Ok(SystemView { system, regional })
            })
            .await
    }

    /// # Errors
    ///
    /// Lookup failures, including [`ErrorKind::TooManyTypes`].
    pub async fn get_system(&self, locator: RegionalLocator) -> Result<SystemView> {
        self.ctx.validator.regional_locator(&locator)?;
        self.ctx
            .transact("get_system", async {
                let mut tx = self.ctx.begin().await?;
                let (system, regional) = find_regional(&mut tx, &locator).await?;
                Ok(SystemView { system, regional })
            })
            .await
    }

    /// One page of regional rows with their identities, ordered by
    /// `(created_at, system_id, region)`.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidPaginationToken`] for a bad token.
    /// - [`ErrorKind::NoResourcesFound`] if the page is empty.
    pub async fn list_systems(&self, request: ListSystems) -> Result<Page<SystemView>> {
        let cursor = decode_cursor::<RegionalSystem>(request.page_token.as_deref())?;
        let limit = self.ctx.page_limit(request.limit);

        let mut join = Join::new(&SYSTEMS, "system_id", "id");
        for (field, value) in [
            ("external_id", &request.external_id),
            ("system_type", &request.system_type),
            ("tenant_id", &request.tenant_id),
        ] {
            if let Some(value) = value {
                join = join.filter(field, value.as_str());
            }
        }
        let query = Query::new()
            .filter_opt("region", request.region.as_deref())
            .join(join)
            .after(cursor)
            .limit(limit + 1);

        self.ctx
            .transact("list_systems", async {
                let mut tx = self.ctx.begin().await?;
                let rows = tx.list::<RegionalSystem>(&query).await?;
                let page = into_page(rows, limit)?;
                let mut items = Vec::with_capacity(page.items.len());
                for regional in page.items {
                    let system = tx
                        .find::<System>(&[regional.system_id.as_str()])
                        .await?
                        .ok_or_else(|| {
                            RegistryError::new(ErrorKind::SystemNotFound)
                                .with("system_id", &regional.system_id)
                        })?;
                    items.push(SystemView { system, regional });
                }
                Ok(Page {
                    items,
                    next_page_token: page.next_page_token,
                })
            })
            .await
    }
}
