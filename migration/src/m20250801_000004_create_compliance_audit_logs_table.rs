use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // コンプライアンス監査ログ (追記専用)
        manager
            .create_table(
                Table::create()
                    .table(ComplianceAuditLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ComplianceAuditLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ComplianceAuditLogs::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ComplianceAuditLogs::UserId).uuid())
                    .col(ColumnDef::new(ComplianceAuditLogs::ActorId).uuid())
                    .col(
                        ColumnDef::new(ComplianceAuditLogs::ActorType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ComplianceAuditLogs::Action)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ComplianceAuditLogs::EntityType)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ComplianceAuditLogs::EntityId).string())
                    .col(ColumnDef::new(ComplianceAuditLogs::Details).json())
                    .col(ColumnDef::new(ComplianceAuditLogs::ChangedData).json())
                    .col(ColumnDef::new(ComplianceAuditLogs::IpAddress).string_len(45))
                    .col(ColumnDef::new(ComplianceAuditLogs::UserAgent).text())
                    .col(ColumnDef::new(ComplianceAuditLogs::RequestPath).string())
                    .col(ColumnDef::new(ComplianceAuditLogs::RequestMethod).string_len(10))
                    .col(ColumnDef::new(ComplianceAuditLogs::LegalBasis).string_len(30))
                    .col(
                        ColumnDef::new(ComplianceAuditLogs::Severity)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ComplianceAuditLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // インデックスの作成
        manager
            .create_index(
                Index::create()
                    .name("idx_compliance_audit_logs_tenant_created")
                    .table(ComplianceAuditLogs::Table)
                    .col(ComplianceAuditLogs::TenantId)
                    .col(ComplianceAuditLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_compliance_audit_logs_user_id")
                    .table(ComplianceAuditLogs::Table)
                    .col(ComplianceAuditLogs::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_compliance_audit_logs_action")
                    .table(ComplianceAuditLogs::Table)
                    .col(ComplianceAuditLogs::Action)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ComplianceAuditLogs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ComplianceAuditLogs {
    Table,
    Id,
    TenantId,
    UserId,
    ActorId,
    ActorType,
    Action,
    EntityType,
    EntityId,
    Details,
    ChangedData,
    IpAddress,
    UserAgent,
    RequestPath,
    RequestMethod,
    LegalBasis,
    Severity,
    CreatedAt,
}
