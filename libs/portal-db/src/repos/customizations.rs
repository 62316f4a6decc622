use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use portal_security::AccessScope;

use crate::entities::customization;
use crate::error::StoreError;
use crate::scope::scope_filter;

/// All customizations visible to the scope (a user's own rows; a tenant's
/// rows for admins).
pub async fn list<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
) -> Result<Vec<customization::Model>, StoreError> {
    Ok(customization::Entity::find()
        .filter(scope_filter::<customization::Entity>(scope))
        .order_by_asc(customization::Column::BaseServerName)
        .all(conn)
        .await?)
}

/// The calling user's own customizations, regardless of role. Resolution
/// always works on the resolved user's rows, not on everything an admin
/// could see.
pub async fn list_for_owner<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Vec<customization::Model>, StoreError> {
    Ok(customization::Entity::find()
        .filter(customization::Column::UserId.eq(user_id))
        .order_by_asc(customization::Column::BaseServerName)
        .all(conn)
        .await?)
}

pub async fn get<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    base_catalog_id: Uuid,
    base_server_name: &str,
) -> Result<Option<customization::Model>, StoreError> {
    Ok(customization::Entity::find()
        .filter(scope_filter::<customization::Entity>(scope))
        .filter(customization::Column::BaseCatalogId.eq(base_catalog_id))
        .filter(customization::Column::BaseServerName.eq(base_server_name))
        .one(conn)
        .await?)
}

/// Insert or replace the scope owner's customization for one target. The
/// row is stamped with the scope's user and tenant; an admin writing
/// through this path still writes *their own* customization.
pub async fn upsert<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    base_catalog_id: Uuid,
    base_server_name: &str,
    action: &str,
    custom_data: Option<serde_json::Value>,
) -> Result<customization::Model, StoreError> {
    let now = Utc::now();
    let existing = customization::Entity::find()
        .filter(customization::Column::UserId.eq(scope.user_id()))
        .filter(customization::Column::BaseCatalogId.eq(base_catalog_id))
        .filter(customization::Column::BaseServerName.eq(base_server_name))
        .one(conn)
        .await?;

    if let Some(current) = existing {
        let mut active: customization::ActiveModel = current.into();
        active.action = Set(action.to_owned());
        active.custom_data = Set(custom_data);
        active.updated_at = Set(now);
        Ok(active.update(conn).await?)
    } else {
        let model = customization::Model {
            id: Uuid::new_v4(),
            user_id: scope.user_id(),
            tenant_id: scope.tenant_id(),
            base_catalog_id,
            base_server_name: base_server_name.to_owned(),
            action: action.to_owned(),
            custom_data,
            created_at: now,
            updated_at: now,
        };
        let active: customization::ActiveModel = model.into();
        Ok(active.insert(conn).await?)
    }
}

/// Remove the scope owner's customization for one target.
pub async fn delete<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    base_catalog_id: Uuid,
    base_server_name: &str,
) -> Result<bool, StoreError> {
    let res = customization::Entity::delete_many()
        .filter(customization::Column::UserId.eq(scope.user_id()))
        .filter(customization::Column::BaseCatalogId.eq(base_catalog_id))
        .filter(customization::Column::BaseServerName.eq(base_server_name))
        .exec(conn)
        .await?;
    Ok(res.rows_affected > 0)
}
