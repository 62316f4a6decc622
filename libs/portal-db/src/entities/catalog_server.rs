use sea_orm::entity::prelude::*;

/// One server entry inside a catalog. `(catalog_id, name)` is unique;
/// `position` preserves the author's ordering.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "catalog_servers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub catalog_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub image: String,
    pub tag: String,
    /// JSON object of environment variables.
    pub env: Json,
    /// JSON array of volume mounts.
    pub volumes: Json,
    /// JSON array of port mappings.
    pub ports: Json,
    /// JSON array forming the container command.
    pub command: Json,
    pub enabled: bool,
    pub is_override: bool,
    /// Name of the base entry this one shadows, when it is an override
    /// living inside a base catalog.
    pub overrides_server: Option<String>,
    pub position: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::catalog_config::Entity",
        from = "Column::CatalogId",
        to = "super::catalog_config::Column::Id"
    )]
    Catalog,
}

impl Related<super::catalog_config::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Catalog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
