use sea_orm::entity::prelude::*;

/// Append-only audit record. The repository exposes insert and query; no
/// update or delete path exists anywhere.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub timestamp: DateTimeUtc,
    pub event_type: String,
    pub severity: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub request_id: String,
    pub intent: Option<String>,
    /// JSON array of (already redacted) arguments.
    pub args: Json,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
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
