use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExportRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExportRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExportRequests::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ExportRequests::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(ExportRequests::RequestToken)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ExportRequests::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExportRequests::Format)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExportRequests::DataScope).json().not_null())
                    .col(ColumnDef::new(ExportRequests::FileName).string())
                    .col(ColumnDef::new(ExportRequests::FileSize).big_integer())
                    .col(ColumnDef::new(ExportRequests::FileUrl).string())
                    .col(
                        ColumnDef::new(ExportRequests::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExportRequests::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ExportRequests::DownloadedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ExportRequests::DownloadCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ExportRequests::ErrorMessage).text())
                    .col(ColumnDef::new(ExportRequests::IpAddress).string_len(45))
                    .col(
                        ColumnDef::new(ExportRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExportRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_export_requests_user_id")
                    .table(ExportRequests::Table)
                    .col(ExportRequests::UserId)
                    .to_owned(),
            )
            .await?;

        // 期限切れエクスポートの掃除ジョブ用
        manager
            .create_index(
                Index::create()
                    .name("idx_export_requests_status_expires")
                    .table(ExportRequests::Table)
                    .col(ExportRequests::Status)
                    .col(ExportRequests::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExportRequests::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ExportRequests {
    Table,
    Id,
    TenantId,
    UserId,
    RequestToken,
    Status,
    Format,
    DataScope,
    FileName,
    FileSize,
    FileUrl,
    ExpiresAt,
    CompletedAt,
    DownloadedAt,
    DownloadCount,
    ErrorMessage,
    IpAddress,
    CreatedAt,
    UpdatedAt,
}
