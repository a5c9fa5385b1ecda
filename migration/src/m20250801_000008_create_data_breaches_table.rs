use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // データ侵害の記録台帳 (ANPDへの報告管理)
        manager
            .create_table(
                Table::create()
                    .table(DataBreaches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DataBreaches::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DataBreaches::TenantId).uuid().not_null())
                    .col(ColumnDef::new(DataBreaches::Title).string().not_null())
                    .col(ColumnDef::new(DataBreaches::Description).text().not_null())
                    .col(
                        ColumnDef::new(DataBreaches::Severity)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DataBreaches::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DataBreaches::AffectedSubjects)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DataBreaches::DataCategories).json().not_null())
                    .col(
                        ColumnDef::new(DataBreaches::DetectedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DataBreaches::ContainedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(DataBreaches::ReportedToAuthorityAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(
                        ColumnDef::new(DataBreaches::SubjectsNotifiedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(DataBreaches::Mitigation).text())
                    .col(ColumnDef::new(DataBreaches::ReportedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(DataBreaches::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DataBreaches::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_data_breaches_tenant_status")
                    .table(DataBreaches::Table)
                    .col(DataBreaches::TenantId)
                    .col(DataBreaches::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DataBreaches::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DataBreaches {
    Table,
    Id,
    TenantId,
    Title,
    Description,
    Severity,
    Status,
    AffectedSubjects,
    DataCategories,
    DetectedAt,
    ContainedAt,
    ReportedToAuthorityAt,
    SubjectsNotifiedAt,
    Mitigation,
    ReportedBy,
    CreatedAt,
    UpdatedAt,
}
