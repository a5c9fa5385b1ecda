use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ユーザー行が物理削除されても削除証明の記録は残すため、usersへの外部キーは張らない
        manager
            .create_table(
                Table::create()
                    .table(DeletionRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeletionRequests::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeletionRequests::TenantId).uuid().not_null())
                    .col(ColumnDef::new(DeletionRequests::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(DeletionRequests::TokenHash)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DeletionRequests::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeletionRequests::Reason).text())
                    .col(
                        ColumnDef::new(DeletionRequests::DeletionType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeletionRequests::DataRetention).json().not_null())
                    .col(ColumnDef::new(DeletionRequests::ConfirmedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeletionRequests::ProcessedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeletionRequests::CompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeletionRequests::CancelledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(DeletionRequests::CertificateNumber)
                            .string_len(40)
                            .unique_key(),
                    )
                    .col(ColumnDef::new(DeletionRequests::CertificateUrl).string())
                    .col(ColumnDef::new(DeletionRequests::IpAddress).string_len(45))
                    .col(ColumnDef::new(DeletionRequests::Notes).text())
                    .col(
                        ColumnDef::new(DeletionRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeletionRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deletion_requests_tenant_status")
                    .table(DeletionRequests::Table)
                    .col(DeletionRequests::TenantId)
                    .col(DeletionRequests::Status)
                    .to_owned(),
            )
            .await?;

        // 未完了の削除リクエストはユーザーごとに1件まで (同時リクエストの競合をDBで防ぐ)
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_deletion_requests_user_open \
                 ON deletion_requests (user_id) \
                 WHERE status IN ('pending', 'confirmed', 'processing')",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeletionRequests::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeletionRequests {
    Table,
    Id,
    TenantId,
    UserId,
    TokenHash,
    Status,
    Reason,
    DeletionType,
    DataRetention,
    ConfirmedAt,
    ProcessedAt,
    CompletedAt,
    CancelledAt,
    CertificateNumber,
    CertificateUrl,
    IpAddress,
    Notes,
    CreatedAt,
    UpdatedAt,
}
