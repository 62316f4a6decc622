//! Catalog and server-entry persistence.
//!
//! Catalog visibility is wider than plain row ownership: every user of a
//! tenant sees the tenant's base catalogs and the global system defaults,
//! but only their own personal catalogs. The resolution queries below
//! encode exactly that; admin CRUD goes through the scoped variants.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use portal_security::AccessScope;

use crate::entities::catalog_config::{self, catalog_type};
use crate::entities::catalog_server;
use crate::error::StoreError;
use crate::repos::Page;

/// Enabled base material for resolution: global `system_default` catalogs
/// plus the tenant's `admin_base` catalogs, ascending precedence.
pub async fn enabled_base_catalogs<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
) -> Result<Vec<catalog_config::Model>, StoreError> {
    let visible = Condition::any()
        .add(catalog_config::Column::CatalogType.eq(catalog_type::SYSTEM_DEFAULT))
        .add(
            Condition::all()
                .add(catalog_config::Column::CatalogType.eq(catalog_type::ADMIN_BASE))
                .add(catalog_config::Column::TenantId.eq(tenant_id)),
        );

    Ok(catalog_config::Entity::find()
        .filter(catalog_config::Column::Enabled.eq(true))
        .filter(visible)
        .order_by_asc(catalog_config::Column::Precedence)
        .order_by_asc(catalog_config::Column::Name)
        .all(conn)
        .await?)
}

/// The user's enabled personal catalogs, ascending precedence.
pub async fn enabled_personal_catalogs<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Vec<catalog_config::Model>, StoreError> {
    Ok(catalog_config::Entity::find()
        .filter(catalog_config::Column::CatalogType.eq(catalog_type::USER_PERSONAL))
        .filter(catalog_config::Column::OwnerId.eq(user_id))
        .filter(catalog_config::Column::Enabled.eq(true))
        .order_by_asc(catalog_config::Column::Precedence)
        .order_by_asc(catalog_config::Column::Name)
        .all(conn)
        .await?)
}

/// Entries of one catalog in author order.
pub async fn servers_of<C: ConnectionTrait>(
    conn: &C,
    catalog_id: Uuid,
) -> Result<Vec<catalog_server::Model>, StoreError> {
    Ok(catalog_server::Entity::find()
        .filter(catalog_server::Column::CatalogId.eq(catalog_id))
        .order_by_asc(catalog_server::Column::Position)
        .all(conn)
        .await?)
}

/// Visibility condition for catalog reads through a scope: personal
/// catalogs require ownership, base catalogs tenant membership, system
/// catalogs are global. Super admins skip the tenant clause.
fn visibility(scope: &AccessScope) -> Condition {
    if scope.sees_all_tenants() {
        return Condition::all();
    }
    let personal = Condition::all()
        .add(catalog_config::Column::CatalogType.eq(catalog_type::USER_PERSONAL))
        .add(catalog_config::Column::OwnerId.eq(scope.user_id()));
    let base = Condition::all()
        .add(catalog_config::Column::CatalogType.eq(catalog_type::ADMIN_BASE))
        .add(catalog_config::Column::TenantId.eq(scope.tenant_id()));
    let system = catalog_config::Column::CatalogType.eq(catalog_type::SYSTEM_DEFAULT);

    Condition::any().add(personal).add(base).add(system)
}

pub async fn get<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    id: Uuid,
) -> Result<Option<catalog_config::Model>, StoreError> {
    Ok(catalog_config::Entity::find_by_id(id)
        .filter(visibility(scope))
        .one(conn)
        .await?)
}

pub async fn list<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    page: Page,
) -> Result<Vec<catalog_config::Model>, StoreError> {
    Ok(catalog_config::Entity::find()
        .filter(visibility(scope))
        .order_by_asc(catalog_config::Column::Precedence)
        .order_by_asc(catalog_config::Column::Name)
        .paginate(conn, page.limit)
        .fetch_page(page.offset / page.limit.max(1))
        .await?)
}

/// Insert, stamping tenant from the scope for tenant-scoped catalogs.
/// The unique `(owner, name)` index turns duplicates into conflicts.
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    mut model: catalog_config::Model,
) -> Result<catalog_config::Model, StoreError> {
    // Base/system catalogs are unowned by definition.
    if model.catalog_type != catalog_type::USER_PERSONAL {
        model.owner_id = None;
    }
    if model.catalog_type == catalog_type::SYSTEM_DEFAULT {
        model.tenant_id = None;
    }
    // The composite unique index treats NULL owners as distinct on some
    // backends; enforce (owner, name) uniqueness for unowned catalogs here.
    if model.owner_id.is_none() {
        let clash = catalog_config::Entity::find()
            .filter(catalog_config::Column::OwnerId.is_null())
            .filter(catalog_config::Column::Name.eq(model.name.clone()))
            .one(conn)
            .await?;
        if clash.is_some() {
            return Err(StoreError::Conflict(format!(
                "catalog '{}' already exists",
                model.name
            )));
        }
    }
    let active: catalog_config::ActiveModel = model.into();
    Ok(active.insert(conn).await?)
}

pub async fn update<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    model: catalog_config::Model,
) -> Result<catalog_config::Model, StoreError> {
    // Visibility check first: outside the scope the row does not exist.
    let _ = get(conn, scope, model.id).await?.ok_or(StoreError::NotFound)?;
    let active: catalog_config::ActiveModel = model.into();
    let mut active = active.reset_all();
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

pub async fn delete<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    id: Uuid,
) -> Result<bool, StoreError> {
    if get(conn, scope, id).await?.is_none() {
        return Ok(false);
    }
    let res = catalog_config::Entity::delete_by_id(id).exec(conn).await?;
    Ok(res.rows_affected > 0)
}

/// Insert or replace one server entry. `(catalog_id, name)` is the key.
pub async fn upsert_server<C: ConnectionTrait>(
    conn: &C,
    mut model: catalog_server::Model,
) -> Result<catalog_server::Model, StoreError> {
    let existing = catalog_server::Entity::find()
        .filter(catalog_server::Column::CatalogId.eq(model.catalog_id))
        .filter(catalog_server::Column::Name.eq(model.name.clone()))
        .one(conn)
        .await?;

    if let Some(current) = existing {
        model.id = current.id;
        model.created_at = current.created_at;
        model.updated_at = Utc::now();
        let active: catalog_server::ActiveModel = model.into();
        Ok(active.reset_all().update(conn).await?)
    } else {
        let active: catalog_server::ActiveModel = model.into();
        Ok(active.insert(conn).await?)
    }
}

pub async fn delete_server<C: ConnectionTrait>(
    conn: &C,
    catalog_id: Uuid,
    name: &str,
) -> Result<bool, StoreError> {
    let res = catalog_server::Entity::delete_many()
        .filter(catalog_server::Column::CatalogId.eq(catalog_id))
        .filter(catalog_server::Column::Name.eq(name))
        .exec(conn)
        .await?;
    Ok(res.rows_affected > 0)
}
