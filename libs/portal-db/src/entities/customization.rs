use sea_orm::entity::prelude::*;

/// A user-owned tweak to one base-catalog entry, keyed by
/// `(user_id, base_catalog_id, base_server_name)`.
///
/// `action` is one of `disable`, `override`, `add`; `custom_data` carries
/// the replacement payload for the latter two and is null for `disable`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_catalog_customizations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub base_catalog_id: Uuid,
    pub base_server_name: String,
    pub action: String,
    pub custom_data: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
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

/// Customization action discriminants.
pub mod action {
    pub const DISABLE: &str = "disable";
    pub const OVERRIDE: &str = "override";
    pub const ADD: &str = "add";
}
