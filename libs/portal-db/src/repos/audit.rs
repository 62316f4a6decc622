use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};

use portal_security::AccessScope;

use crate::entities::audit_log;
use crate::error::StoreError;
use crate::repos::Page;
use crate::scope::scope_filter;

/// Optional query filters for audit enumeration.
#[derive(Clone, Debug, Default)]
pub struct AuditFilter {
    pub event_type: Option<String>,
    pub intent: Option<String>,
    pub success: Option<bool>,
}

/// Append one record. Insert-only by design; the entity has no update or
/// delete path.
pub async fn append<C: ConnectionTrait>(
    conn: &C,
    model: audit_log::Model,
) -> Result<(), StoreError> {
    let active: audit_log::ActiveModel = model.into();
    active.insert(conn).await?;
    Ok(())
}

/// Enumerate newest-first within the caller's visibility.
pub async fn query<C: ConnectionTrait>(
    conn: &C,
    scope: &AccessScope,
    filter: &AuditFilter,
    page: Page,
) -> Result<Vec<audit_log::Model>, StoreError> {
    let mut query = audit_log::Entity::find().filter(scope_filter::<audit_log::Entity>(scope));

    if let Some(event_type) = &filter.event_type {
        query = query.filter(audit_log::Column::EventType.eq(event_type));
    }
    if let Some(intent) = &filter.intent {
        query = query.filter(audit_log::Column::Intent.eq(intent));
    }
    if let Some(success) = filter.success {
        query = query.filter(audit_log::Column::Success.eq(success));
    }

    Ok(query
        .order_by_desc(audit_log::Column::Timestamp)
        .paginate(conn, page.limit)
        .fetch_page(page.offset / page.limit.max(1))
        .await?)
}
