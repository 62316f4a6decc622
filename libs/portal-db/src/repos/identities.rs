use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use portal_security::AccessScope;

use crate::entities::identity;
use crate::error::StoreError;
use crate::repos::Page;

/// Lookup by identity-provider subject. Deliberately unscoped: this is the
/// authentication bootstrap, no identity exists yet when it runs.
pub async fn find_by_subject<C: ConnectionTrait>(
    conn: &C,
    subject: &str,
) -> Result<Option<identity::Model>, StoreError> {
    Ok(identity::Entity::find()
        .filter(identity::Column::Subject.eq(subject))
        .one(conn)
        .await?)
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    model: identity::Model,
) -> Result<identity::Model, StoreError> {
    let active: identity::ActiveModel = model.into();
    Ok(active.insert(conn).await?)
}

/// Refresh mutable profile fields on login.
pub async fn touch_profile<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    email: &str,
    display_name: &str,
) -> Result<(), StoreError> {
    identity::Entity::update_many()
        .col_expr(identity::Column::Email, Expr::value(email))
        .col_expr(identity::Column::DisplayName, Expr::value(display_name))
        .col_expr(identity::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(identity::Column::Id.eq(id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Scoped read: a plain user sees only their own row, admins the tenant,
/// super admins everyone.
pub async fn get<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    id: Uuid,
) -> Result<Option<identity::Model>, StoreError> {
    let mut cond = Condition::all().add(identity::Column::Id.eq(id));
    if !scope.sees_all_tenants() {
        cond = cond.add(identity::Column::TenantId.eq(scope.tenant_id()));
        if !scope.sees_whole_tenant() {
            cond = cond.add(identity::Column::Id.eq(scope.user_id()));
        }
    }
    Ok(identity::Entity::find().filter(cond).one(conn).await?)
}

/// Tenant-wide enumeration for admins.
pub async fn list<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    page: Page,
) -> Result<Vec<identity::Model>, StoreError> {
    let mut query = identity::Entity::find();
    if !scope.sees_all_tenants() {
        query = query.filter(identity::Column::TenantId.eq(scope.tenant_id()));
        if !scope.sees_whole_tenant() {
            query = query.filter(identity::Column::Id.eq(scope.user_id()));
        }
    }
    Ok(query
        .order_by_asc(identity::Column::Email)
        .paginate(conn, page.limit)
        .fetch_page(page.offset / page.limit.max(1))
        .await?)
}

/// Admin-only role change; visibility is enforced by the same rules as
/// [`get`], so a target outside the scope reads as not found.
pub async fn update_role<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    id: Uuid,
    role: &str,
) -> Result<identity::Model, StoreError> {
    let existing = get(conn, scope, id).await?.ok_or(StoreError::NotFound)?;
    let mut active: identity::ActiveModel = existing.into();
    active.role = Set(role.to_owned());
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}
