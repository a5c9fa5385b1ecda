use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConsentRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConsentRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConsentRecords::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ConsentRecords::UserId).uuid())
                    .col(ColumnDef::new(ConsentRecords::Email).string())
                    .col(
                        ColumnDef::new(ConsentRecords::ConsentType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConsentRecords::ConsentVersion)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConsentRecords::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConsentRecords::Purpose).text())
                    .col(
                        ColumnDef::new(ConsentRecords::AcceptedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConsentRecords::WithdrawnAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ConsentRecords::IpAddress).string_len(45))
                    .col(ColumnDef::new(ConsentRecords::UserAgent).text())
                    .col(ColumnDef::new(ConsentRecords::Metadata).json())
                    .col(
                        ColumnDef::new(ConsentRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConsentRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_consent_records_tenant_type_status")
                    .table(ConsentRecords::Table)
                    .col(ConsentRecords::TenantId)
                    .col(ConsentRecords::ConsentType)
                    .col(ConsentRecords::Status)
                    .to_owned(),
            )
            .await?;

        // 有効な同意は (主体, 種別) ごとに1件のみ
        // 部分インデックスはPostgreSQLとSQLiteで同じ構文が使える
        let conn = manager.get_connection();
        conn.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_consent_records_active_user \
             ON consent_records (tenant_id, user_id, consent_type) \
             WHERE status = 'active' AND user_id IS NOT NULL",
        )
        .await?;
        conn.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_consent_records_active_email \
             ON consent_records (tenant_id, email, consent_type) \
             WHERE status = 'active' AND user_id IS NULL",
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(CookiePreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CookiePreferences::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CookiePreferences::TenantId).uuid())
                    .col(ColumnDef::new(CookiePreferences::UserId).uuid())
                    .col(
                        ColumnDef::new(CookiePreferences::SessionId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CookiePreferences::Essential)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(CookiePreferences::Analytics)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CookiePreferences::Marketing)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CookiePreferences::Personalization)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CookiePreferences::ConsentVersion)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CookiePreferences::IpAddress).string_len(45))
                    .col(ColumnDef::new(CookiePreferences::UserAgent).text())
                    .col(
                        ColumnDef::new(CookiePreferences::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cookie_preferences_session_id")
                    .table(CookiePreferences::Table)
                    .col(CookiePreferences::SessionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cookie_preferences_user_id")
                    .table(CookiePreferences::Table)
                    .col(CookiePreferences::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CookiePreferences::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ConsentRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ConsentRecords {
    Table,
    Id,
    TenantId,
    UserId,
    Email,
    ConsentType,
    ConsentVersion,
    Status,
    Purpose,
    AcceptedAt,
    WithdrawnAt,
    IpAddress,
    UserAgent,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum CookiePreferences {
    Table,
    Id,
    TenantId,
    UserId,
    SessionId,
    Essential,
    Analytics,
    Marketing,
    Personalization,
    ConsentVersion,
    IpAddress,
    UserAgent,
    CreatedAt,
}
