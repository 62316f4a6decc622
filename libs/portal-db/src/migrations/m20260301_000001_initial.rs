use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Identities::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Identities::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Identities::Subject).string().not_null().unique_key())
                    .col(ColumnDef::new(Identities::Email).string().not_null())
                    .col(ColumnDef::new(Identities::DisplayName).string().not_null())
                    .col(ColumnDef::new(Identities::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Identities::Role).string().not_null())
                    .col(ColumnDef::new(Identities::Permissions).json().not_null())
                    .col(ColumnDef::new(Identities::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Identities::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_identities_tenant")
                    .table(Identities::Table)
                    .col(Identities::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sessions::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Sessions::UserId).uuid().not_null())
                    .col(ColumnDef::new(Sessions::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Sessions::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Sessions::ExpiresAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Sessions::LastActivity).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Sessions::RemoteAddr).string())
                    .col(ColumnDef::new(Sessions::UserAgent).string())
                    .col(ColumnDef::new(Sessions::Active).boolean().not_null())
                    .col(ColumnDef::new(Sessions::Metadata).json().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_user")
                    .table(Sessions::Table)
                    .col(Sessions::UserId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_expires")
                    .table(Sessions::Table)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CatalogConfigs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CatalogConfigs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CatalogConfigs::CatalogType).string().not_null())
                    .col(ColumnDef::new(CatalogConfigs::Name).string().not_null())
                    .col(ColumnDef::new(CatalogConfigs::DisplayName).string().not_null())
                    .col(ColumnDef::new(CatalogConfigs::Description).string().not_null())
                    .col(ColumnDef::new(CatalogConfigs::OwnerId).uuid())
                    .col(ColumnDef::new(CatalogConfigs::TenantId).uuid())
                    .col(ColumnDef::new(CatalogConfigs::Enabled).boolean().not_null())
                    .col(ColumnDef::new(CatalogConfigs::IsMandatory).boolean().not_null())
                    .col(ColumnDef::new(CatalogConfigs::Precedence).integer().not_null())
                    .col(ColumnDef::new(CatalogConfigs::Version).string().not_null())
                    .col(ColumnDef::new(CatalogConfigs::SourceUrl).string())
                    .col(ColumnDef::new(CatalogConfigs::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(CatalogConfigs::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;
        // Two catalogs can never share (owner, name). Owner is null for
        // base/system catalogs; the composite index still applies per
        // backend null semantics, and the repository checks for those.
        manager
            .create_index(
                Index::create()
                    .name("uq_catalog_owner_name")
                    .table(CatalogConfigs::Table)
                    .col(CatalogConfigs::OwnerId)
                    .col(CatalogConfigs::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_catalogs_tenant_type")
                    .table(CatalogConfigs::Table)
                    .col(CatalogConfigs::TenantId)
                    .col(CatalogConfigs::CatalogType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CatalogServers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CatalogServers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CatalogServers::CatalogId).uuid().not_null())
                    .col(ColumnDef::new(CatalogServers::Name).string().not_null())
                    .col(ColumnDef::new(CatalogServers::DisplayName).string().not_null())
                    .col(ColumnDef::new(CatalogServers::Description).string().not_null())
                    .col(ColumnDef::new(CatalogServers::Image).string().not_null())
                    .col(ColumnDef::new(CatalogServers::Tag).string().not_null())
                    .col(ColumnDef::new(CatalogServers::Env).json().not_null())
                    .col(ColumnDef::new(CatalogServers::Volumes).json().not_null())
                    .col(ColumnDef::new(CatalogServers::Ports).json().not_null())
                    .col(ColumnDef::new(CatalogServers::Command).json().not_null())
                    .col(ColumnDef::new(CatalogServers::Enabled).boolean().not_null())
                    .col(ColumnDef::new(CatalogServers::IsOverride).boolean().not_null())
                    .col(ColumnDef::new(CatalogServers::OverridesServer).string())
                    .col(ColumnDef::new(CatalogServers::Position).integer().not_null())
                    .col(ColumnDef::new(CatalogServers::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(CatalogServers::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_catalog_servers_catalog")
                            .from(CatalogServers::Table, CatalogServers::CatalogId)
                            .to(CatalogConfigs::Table, CatalogConfigs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uq_catalog_servers_name")
                    .table(CatalogServers::Table)
                    .col(CatalogServers::CatalogId)
                    .col(CatalogServers::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Customizations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Customizations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Customizations::UserId).uuid().not_null())
                    .col(ColumnDef::new(Customizations::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Customizations::BaseCatalogId).uuid().not_null())
                    .col(ColumnDef::new(Customizations::BaseServerName).string().not_null())
                    .col(ColumnDef::new(Customizations::Action).string().not_null())
                    .col(ColumnDef::new(Customizations::CustomData).json())
                    .col(ColumnDef::new(Customizations::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Customizations::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("uq_customizations_target")
                    .table(Customizations::Table)
                    .col(Customizations::UserId)
                    .col(Customizations::BaseCatalogId)
                    .col(Customizations::BaseServerName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuditLog::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AuditLog::Timestamp).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(AuditLog::EventType).string().not_null())
                    .col(ColumnDef::new(AuditLog::Severity).string().not_null())
                    .col(ColumnDef::new(AuditLog::UserId).uuid().not_null())
                    .col(ColumnDef::new(AuditLog::TenantId).uuid().not_null())
                    .col(ColumnDef::new(AuditLog::RequestId).string().not_null())
                    .col(ColumnDef::new(AuditLog::Intent).string())
                    .col(ColumnDef::new(AuditLog::Args).json().not_null())
                    .col(ColumnDef::new(AuditLog::RemoteAddr).string())
                    .col(ColumnDef::new(AuditLog::UserAgent).string())
                    .col(ColumnDef::new(AuditLog::Success).boolean().not_null())
                    .col(ColumnDef::new(AuditLog::Error).string())
                    .col(ColumnDef::new(AuditLog::DurationMs).big_integer())
                    .col(ColumnDef::new(AuditLog::Metadata).json().not_null())
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_audit_tenant_time")
                    .table(AuditLog::Table)
                    .col(AuditLog::TenantId)
                    .col(AuditLog::Timestamp)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLog::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customizations::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CatalogServers::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CatalogConfigs::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Identities::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Identities {
    Table,
    Id,
    Subject,
    Email,
    DisplayName,
    TenantId,
    Role,
    Permissions,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Id,
    UserId,
    TenantId,
    CreatedAt,
    ExpiresAt,
    LastActivity,
    RemoteAddr,
    UserAgent,
    Active,
    Metadata,
}

#[derive(DeriveIden)]
enum CatalogConfigs {
    Table,
    Id,
    CatalogType,
    Name,
    DisplayName,
    Description,
    OwnerId,
    TenantId,
    Enabled,
    IsMandatory,
    Precedence,
    Version,
    SourceUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CatalogServers {
    Table,
    Id,
    CatalogId,
    Name,
    DisplayName,
    Description,
    Image,
    Tag,
    Env,
    Volumes,
    Ports,
    Command,
    Enabled,
    IsOverride,
    OverridesServer,
    Position,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Customizations {
    #[sea_orm(iden = "user_catalog_customizations")]
    Table,
    Id,
    UserId,
    TenantId,
    BaseCatalogId,
    BaseServerName,
    Action,
    CustomData,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AuditLog {
    #[sea_orm(iden = "audit_log")]
    Table,
    Id,
    Timestamp,
    EventType,
    Severity,
    UserId,
    TenantId,
    RequestId,
    Intent,
    Args,
    RemoteAddr,
    UserAgent,
    Success,
    Error,
    DurationMs,
    Metadata,
}
