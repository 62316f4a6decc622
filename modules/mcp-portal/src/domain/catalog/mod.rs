//! Catalog inheritance engine: resolution, caching, customization and
//! admin CRUD.

pub mod resolver;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use portal_db::entities::catalog_config::{self, catalog_type};
use portal_db::entities::catalog_server;
use portal_db::entities::customization::{self, action};
use portal_db::repos::{self, Page};
use portal_db::DbHandle;
use portal_security::{AccessScope, Role};

pub use resolver::{EntrySource, OverridePayload, ResolvedCatalog, ResolvedServer};

use crate::domain::DomainError;

/// Customization actions accepted by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomizationAction {
    Disable,
    Override,
    Add,
}

impl CustomizationAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomizationAction::Disable => action::DISABLE,
            CustomizationAction::Override => action::OVERRIDE,
            CustomizationAction::Add => action::ADD,
        }
    }
}

type CacheSlot = Arc<Mutex<Option<Arc<ResolvedCatalog>>>>;

/// Per-user resolution cache. The per-slot mutex serializes recomputation
/// for one user; distinct users proceed in parallel.
#[derive(Default)]
struct CatalogCache {
    slots: DashMap<Uuid, CacheSlot>,
}

impl CatalogCache {
    fn slot(&self, user_id: Uuid) -> CacheSlot {
        self.slots
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn invalidate_user(&self, user_id: Uuid) {
        self.slots.remove(&user_id);
    }

    fn invalidate_all(&self) {
        self.slots.clear();
    }
}

pub struct CatalogService {
    db: DbHandle,
    cache: CatalogCache,
}

impl CatalogService {
    #[must_use]
    pub fn new(db: DbHandle) -> Self {
        Self {
            db,
            cache: CatalogCache::default(),
        }
    }

    /// Resolve the catalog for the scope's user, from cache when possible.
    #[instrument(skip(self, scope), fields(user_id = %scope.user_id()))]
    pub async fn resolve(&self, scope: &AccessScope) -> Result<Arc<ResolvedCatalog>, DomainError> {
        let slot = self.cache.slot(scope.user_id());
        let mut guard = slot.lock().await;
        if let Some(cached) = guard.as_ref() {
            return Ok(Arc::clone(cached));
        }

        let input = self.fetch_input(scope).await?;
        let resolved = Arc::new(resolver::resolve(&input));
        debug!(
            servers = resolved.servers.len(),
            disabled = resolved.disabled_count,
            "catalog resolved"
        );
        *guard = Some(Arc::clone(&resolved));
        Ok(resolved)
    }

    pub fn invalidate_user(&self, user_id: Uuid) {
        self.cache.invalidate_user(user_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    async fn fetch_input(
        &self,
        scope: &AccessScope,
    ) -> Result<resolver::ResolutionInput, DomainError> {
        let conn = self.db.conn();

        let base_catalogs =
            repos::catalogs::enabled_base_catalogs(conn, scope.tenant_id()).await?;
        let mut base = Vec::with_capacity(base_catalogs.len());
        for catalog in base_catalogs {
            let servers = repos::catalogs::servers_of(conn, catalog.id).await?;
            base.push((catalog, servers));
        }

        let customizations =
            repos::customizations::list_for_owner(conn, scope.user_id()).await?;

        let personal_catalogs =
            repos::catalogs::enabled_personal_catalogs(conn, scope.user_id()).await?;
        let mut personal = Vec::with_capacity(personal_catalogs.len());
        for catalog in personal_catalogs {
            let servers = repos::catalogs::servers_of(conn, catalog.id).await?;
            personal.push((catalog, servers));
        }

        Ok(resolver::ResolutionInput {
            base,
            customizations,
            personal,
        })
    }

    /// Apply one customization for the scope's user. Enforces the §write
    /// invariants, runs in a transaction, invalidates the user's cache.
    #[instrument(skip(self, scope, custom_data), fields(user_id = %scope.user_id()))]
    pub async fn apply_customization(
        &self,
        scope: &AccessScope,
        base_catalog_id: Uuid,
        server_name: &str,
        action_: CustomizationAction,
        custom_data: Option<serde_json::Value>,
    ) -> Result<customization::Model, DomainError> {
        if server_name.trim().is_empty() {
            return Err(DomainError::validation(
                "server",
                "a target server name is required",
            ));
        }

        let catalog = repos::catalogs::get(self.db.conn(), scope, base_catalog_id)
            .await?
            .ok_or(DomainError::NotFound("catalog"))?;
        if catalog.catalog_type == catalog_type::USER_PERSONAL {
            return Err(DomainError::validation(
                "catalog",
                "customizations target base catalogs, not personal ones",
            ));
        }

        match action_ {
            CustomizationAction::Disable | CustomizationAction::Override => {
                // The target must exist in the base catalog.
                let servers = repos::catalogs::servers_of(self.db.conn(), catalog.id).await?;
                if !servers.iter().any(|s| s.name == server_name) {
                    return Err(DomainError::NotFound("server"));
                }
            }
            CustomizationAction::Add => {
                // Additions must not collide with disabled or overridden
                // names.
                let existing =
                    repos::customizations::list_for_owner(self.db.conn(), scope.user_id()).await?;
                let clash = existing.iter().any(|c| {
                    c.base_server_name == server_name
                        && (c.action == action::DISABLE || c.action == action::OVERRIDE)
                });
                if clash {
                    return Err(DomainError::Conflict(format!(
                        "'{server_name}' is already disabled or overridden"
                    )));
                }
            }
        }

        let data = match action_ {
            CustomizationAction::Disable => None,
            CustomizationAction::Override | CustomizationAction::Add => {
                Some(custom_data.unwrap_or_else(|| serde_json::json!({})))
            }
        };

        let scope_copy = *scope;
        let name = server_name.to_owned();
        let action_str = action_.as_str();
        let model = self
            .db
            .transaction_with_retry(3, move |txn| {
                let name = name.clone();
                let data = data.clone();
                Box::pin(async move {
                    repos::customizations::upsert(
                        txn,
                        &scope_copy,
                        base_catalog_id,
                        &name,
                        action_str,
                        data,
                    )
                    .await
                })
            })
            .await?;

        self.invalidate_user(scope.user_id());
        info!(action = action_str, server = server_name, "customization applied");
        Ok(model)
    }

    /// Remove the scope owner's customization for one target.
    pub async fn remove_customization(
        &self,
        scope: &AccessScope,
        base_catalog_id: Uuid,
        server_name: &str,
    ) -> Result<bool, DomainError> {
        let removed =
            repos::customizations::delete(self.db.conn(), scope, base_catalog_id, server_name)
                .await?;
        if removed {
            self.invalidate_user(scope.user_id());
        }
        Ok(removed)
    }

    pub async fn list_customizations(
        &self,
        scope: &AccessScope,
    ) -> Result<Vec<customization::Model>, DomainError> {
        Ok(repos::customizations::list(self.db.conn(), scope).await?)
    }

    // ---- admin CRUD -------------------------------------------------

    /// Role gate for catalog administration: `admin_base` needs a tenant
    /// admin, `system_default` a super admin, `user_personal` just the
    /// owner.
    fn require_write_role(scope: &AccessScope, kind: &str) -> Result<(), DomainError> {
        let ok = match kind {
            catalog_type::SYSTEM_DEFAULT => scope.role() >= Role::SuperAdmin,
            catalog_type::ADMIN_BASE => scope.role() >= Role::Admin,
            catalog_type::USER_PERSONAL => scope.role() >= Role::User,
            _ => false,
        };
        if ok { Ok(()) } else { Err(DomainError::Forbidden) }
    }

    #[instrument(skip(self, scope, model))]
    pub async fn create_catalog(
        &self,
        scope: &AccessScope,
        mut model: catalog_config::Model,
    ) -> Result<catalog_config::Model, DomainError> {
        Self::require_write_role(scope, &model.catalog_type)?;

        match model.catalog_type.as_str() {
            catalog_type::USER_PERSONAL => {
                model.owner_id = Some(scope.user_id());
                model.tenant_id = Some(scope.tenant_id());
            }
            catalog_type::ADMIN_BASE => {
                model.tenant_id = Some(scope.tenant_id());
            }
            catalog_type::SYSTEM_DEFAULT => {}
            other => {
                return Err(DomainError::validation(
                    "catalog_type",
                    format!("unknown catalog type '{other}'"),
                ));
            }
        }

        let created = repos::catalogs::insert(self.db.conn(), model).await?;
        self.invalidate_for(&created);
        info!(catalog_id = %created.id, kind = %created.catalog_type, "catalog created");
        Ok(created)
    }

    pub async fn get_catalog(
        &self,
        scope: &AccessScope,
        id: Uuid,
    ) -> Result<(catalog_config::Model, Vec<catalog_server::Model>), DomainError> {
        let catalog = repos::catalogs::get(self.db.conn(), scope, id)
            .await?
            .ok_or(DomainError::NotFound("catalog"))?;
        let servers = repos::catalogs::servers_of(self.db.conn(), id).await?;
        Ok((catalog, servers))
    }

    pub async fn list_catalogs(
        &self,
        scope: &AccessScope,
        page: Page,
    ) -> Result<Vec<catalog_config::Model>, DomainError> {
        Ok(repos::catalogs::list(self.db.conn(), scope, page).await?)
    }

    #[instrument(skip(self, scope, model))]
    pub async fn update_catalog(
        &self,
        scope: &AccessScope,
        model: catalog_config::Model,
    ) -> Result<catalog_config::Model, DomainError> {
        Self::require_write_role(scope, &model.catalog_type)?;
        let updated = repos::catalogs::update(self.db.conn(), scope, model).await?;
        self.invalidate_for(&updated);
        Ok(updated)
    }

    #[instrument(skip(self, scope))]
    pub async fn delete_catalog(&self, scope: &AccessScope, id: Uuid) -> Result<(), DomainError> {
        let existing = repos::catalogs::get(self.db.conn(), scope, id)
            .await?
            .ok_or(DomainError::NotFound("catalog"))?;
        Self::require_write_role(scope, &existing.catalog_type)?;
        if !repos::catalogs::delete(self.db.conn(), scope, id).await? {
            return Err(DomainError::NotFound("catalog"));
        }
        self.invalidate_for(&existing);
        info!(catalog_id = %id, "catalog deleted");
        Ok(())
    }

    /// Create or replace a server entry in a catalog the scope may write.
    #[instrument(skip(self, scope, model), fields(server = %model.name))]
    pub async fn upsert_server(
        &self,
        scope: &AccessScope,
        catalog_id: Uuid,
        mut model: catalog_server::Model,
    ) -> Result<catalog_server::Model, DomainError> {
        let catalog = repos::catalogs::get(self.db.conn(), scope, catalog_id)
            .await?
            .ok_or(DomainError::NotFound("catalog"))?;
        Self::require_write_role(scope, &catalog.catalog_type)?;
        if catalog.catalog_type == catalog_type::USER_PERSONAL
            && catalog.owner_id != Some(scope.user_id())
        {
            return Err(DomainError::NotFound("catalog"));
        }

        model.catalog_id = catalog_id;
        let saved = repos::catalogs::upsert_server(self.db.conn(), model).await?;
        self.invalidate_for(&catalog);
        Ok(saved)
    }

    pub async fn delete_server(
        &self,
        scope: &AccessScope,
        catalog_id: Uuid,
        name: &str,
    ) -> Result<(), DomainError> {
        let catalog = repos::catalogs::get(self.db.conn(), scope, catalog_id)
            .await?
            .ok_or(DomainError::NotFound("catalog"))?;
        Self::require_write_role(scope, &catalog.catalog_type)?;
        if !repos::catalogs::delete_server(self.db.conn(), catalog_id, name).await? {
            return Err(DomainError::NotFound("server"));
        }
        self.invalidate_for(&catalog);
        Ok(())
    }

    /// Base and system catalog changes affect everyone; personal ones only
    /// their owner.
    fn invalidate_for(&self, catalog: &catalog_config::Model) {
        if catalog.catalog_type == catalog_type::USER_PERSONAL {
            if let Some(owner) = catalog.owner_id {
                self.invalidate_user(owner);
            }
        } else {
            self.invalidate_all();
        }
    }
}

/// Default precedence for new catalogs when the request omits one.
#[must_use]
pub fn default_precedence(kind: &str) -> i32 {
    match kind {
        catalog_type::USER_PERSONAL => 50,
        catalog_type::ADMIN_BASE => 100,
        _ => 200,
    }
}

/// Build an empty catalog model from request fields; timestamps stamped
/// here so callers stay pure.
#[must_use]
pub fn new_catalog_model(
    kind: &str,
    name: &str,
    display_name: &str,
    description: &str,
    precedence: Option<i32>,
    is_mandatory: bool,
    source_url: Option<String>,
) -> catalog_config::Model {
    let now = Utc::now();
    catalog_config::Model {
        id: Uuid::new_v4(),
        catalog_type: kind.to_owned(),
        name: name.to_owned(),
        display_name: display_name.to_owned(),
        description: description.to_owned(),
        owner_id: None,
        tenant_id: None,
        enabled: true,
        is_mandatory,
        precedence: precedence.unwrap_or_else(|| default_precedence(kind)),
        version: "1".to_owned(),
        source_url,
        created_at: now,
        updated_at: now,
    }
}
