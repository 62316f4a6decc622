use sea_orm::entity::prelude::*;

/// A catalog definition: `admin_base` (tenant-scoped, unowned),
/// `user_personal` (owned by one user) or `system_default` (global).
///
/// Uniqueness of `(owner_id, name)` is enforced by the schema; `owner_id`
/// is null for base and system catalogs.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "catalog_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub catalog_type: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Null for `admin_base` and `system_default`.
    pub owner_id: Option<Uuid>,
    /// Null for `system_default` (global visibility).
    pub tenant_id: Option<Uuid>,
    pub enabled: bool,
    /// Only meaningful for `admin_base`: entries cannot be disabled by
    /// user customizations.
    pub is_mandatory: bool,
    /// Lower number = higher priority during resolution.
    pub precedence: i32,
    pub version: String,
    pub source_url: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::catalog_server::Entity")]
    Servers,
}

impl Related<super::catalog_server::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Servers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Catalog type discriminants stored in `catalog_type`.
pub mod catalog_type {
    pub const ADMIN_BASE: &str = "admin_base";
    pub const USER_PERSONAL: &str = "user_personal";
    pub const SYSTEM_DEFAULT: &str = "system_default";
}
