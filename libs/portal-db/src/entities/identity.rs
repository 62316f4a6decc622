use sea_orm::entity::prelude::*;

/// One authenticated principal, bootstrapped on first login.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "identities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Identity-provider subject; unique across the deployment.
    #[sea_orm(unique)]
    pub subject: String,
    pub email: String,
    pub display_name: String,
    pub tenant_id: Uuid,
    pub role: String,
    /// Explicit permission grants, a JSON array of strings.
    pub permissions: Json,
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

    // Identities are tenant-level data; plain users may read their own row
    // through the dedicated repo path, which filters by primary key.
    fn owner_col() -> Option<Column> {
        None
    }
}
