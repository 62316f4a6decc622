//! Session persistence.
//!
//! This repository is deliberately *unscoped* infrastructure: session
//! lookup happens before any identity exists, so it cannot be bound to
//! one. The session service layers the ownership rules (list/delete by
//! user) on top; nothing above it hands raw session IDs around.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::session;
use crate::error::StoreError;

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    model: session::Model,
) -> Result<session::Model, StoreError> {
    let active: session::ActiveModel = model.into();
    Ok(active.insert(conn).await?)
}

/// Fetch by opaque token. Any non-matching input is `None`; malformed
/// tokens are not distinguished from unknown ones.
pub async fn get<C: ConnectionTrait>(
    conn: &C,
    id: &str,
) -> Result<Option<session::Model>, StoreError> {
    Ok(session::Entity::find_by_id(id).one(conn).await?)
}

/// Extend a session. `expires_at` is written only when it moves forward;
/// `last_activity` always advances.
pub async fn refresh<C: ConnectionTrait>(
    conn: &C,
    id: &str,
    new_expiry: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<session::Model>, StoreError> {
    let Some(existing) = get(conn, id).await? else {
        return Ok(None);
    };
    let mut active: session::ActiveModel = existing.clone().into();
    if new_expiry > existing.expires_at {
        active.expires_at = Set(new_expiry);
    }
    active.last_activity = Set(now);
    Ok(Some(active.update(conn).await?))
}

/// Returns true when a row was deleted.
pub async fn delete<C: ConnectionTrait>(conn: &C, id: &str) -> Result<bool, StoreError> {
    let res = session::Entity::delete_by_id(id).exec(conn).await?;
    Ok(res.rows_affected > 0)
}

pub async fn list_by_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Vec<session::Model>, StoreError> {
    Ok(session::Entity::find()
        .filter(session::Column::UserId.eq(user_id))
        .order_by_desc(session::Column::LastActivity)
        .all(conn)
        .await?)
}

pub async fn delete_by_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<u64, StoreError> {
    let res = session::Entity::delete_many()
        .filter(session::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;
    Ok(res.rows_affected)
}

/// Sweep entries whose expiry has passed. Idempotent and safe to run
/// concurrently with traffic.
pub async fn delete_expired<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let res = session::Entity::delete_many()
        .filter(session::Column::ExpiresAt.lt(now))
        .exec(conn)
        .await?;
    Ok(res.rows_affected)
}

pub async fn count_by_user<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, StoreError> {
    Ok(session::Entity::find()
        .filter(session::Column::UserId.eq(user_id))
        .count(conn)
        .await?)
}

/// Drop the least recently created session of a user (per-user cap).
pub async fn delete_oldest<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<(), StoreError> {
    if let Some(oldest) = session::Entity::find()
        .filter(session::Column::UserId.eq(user_id))
        .order_by_asc(session::Column::CreatedAt)
        .one(conn)
        .await?
    {
        session::Entity::delete_by_id(oldest.id).exec(conn).await?;
    }
    Ok(())
}
