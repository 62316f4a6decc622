use sea_orm::entity::prelude::*;

/// One authenticated session. The primary key is the opaque session token
/// itself; anything that does not match a stored token is "not found".
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
    pub last_activity: DateTimeUtc,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub active: bool,
    pub metadata: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl crate::scope::ScopedEntity for Entity {
    fn tenant_col() -> Column {
        Column::TenantId
    }

    fn owner_col() -> Option<Column> {
        Some(Column::UserId)
    }
}
