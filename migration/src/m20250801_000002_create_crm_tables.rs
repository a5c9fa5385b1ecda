use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // リード (見込み客)
        manager
            .create_table(
                Table::create()
                    .table(Leads::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Leads::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Leads::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Leads::Name).string().not_null())
                    .col(ColumnDef::new(Leads::Email).string())
                    .col(ColumnDef::new(Leads::Phone).string_len(40))
                    .col(ColumnDef::new(Leads::CpfCnpj).string_len(32))
                    .col(ColumnDef::new(Leads::Source).string_len(50))
                    .col(ColumnDef::new(Leads::Status).string_len(30).not_null())
                    .col(ColumnDef::new(Leads::AssignedTo).uuid())
                    .col(ColumnDef::new(Leads::Notes).text())
                    .col(ColumnDef::new(Leads::AnonymizedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Leads::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Leads::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 物件オーナー (銀行口座情報を含む)
        manager
            .create_table(
                Table::create()
                    .table(Owners::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Owners::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Owners::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Owners::Name).string().not_null())
                    .col(ColumnDef::new(Owners::Email).string())
                    .col(ColumnDef::new(Owners::Phone).string_len(40))
                    .col(ColumnDef::new(Owners::CpfCnpj).string_len(32))
                    .col(ColumnDef::new(Owners::Rg).string_len(32))
                    .col(ColumnDef::new(Owners::Address).text())
                    .col(ColumnDef::new(Owners::BankName).string_len(100))
                    .col(ColumnDef::new(Owners::BankAgency).string_len(20))
                    .col(ColumnDef::new(Owners::BankAccount).string_len(40))
                    .col(ColumnDef::new(Owners::PixKey).string())
                    .col(ColumnDef::new(Owners::Notes).text())
                    .col(ColumnDef::new(Owners::AnonymizedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Owners::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Owners::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 賃借人
        manager
            .create_table(
                Table::create()
                    .table(Renters::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Renters::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Renters::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Renters::Name).string().not_null())
                    .col(ColumnDef::new(Renters::Email).string())
                    .col(ColumnDef::new(Renters::Phone).string_len(40))
                    .col(ColumnDef::new(Renters::CpfCnpj).string_len(32))
                    .col(ColumnDef::new(Renters::Rg).string_len(32))
                    .col(ColumnDef::new(Renters::Address).text())
                    .col(ColumnDef::new(Renters::Employer).string())
                    .col(ColumnDef::new(Renters::GuarantorName).string())
                    .col(ColumnDef::new(Renters::Notes).text())
                    .col(ColumnDef::new(Renters::AnonymizedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Renters::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Renters::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Visits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Visits::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Visits::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Visits::LeadId).uuid())
                    .col(ColumnDef::new(Visits::AssignedTo).uuid())
                    .col(
                        ColumnDef::new(Visits::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Visits::Status).string_len(30).not_null())
                    .col(ColumnDef::new(Visits::Notes).text())
                    .col(
                        ColumnDef::new(Visits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Visits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Interactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Interactions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Interactions::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Interactions::UserId).uuid())
                    .col(ColumnDef::new(Interactions::LeadId).uuid())
                    .col(ColumnDef::new(Interactions::Kind).string_len(30).not_null())
                    .col(ColumnDef::new(Interactions::Description).text().not_null())
                    .col(
                        ColumnDef::new(Interactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 財務記録は法定保存期間があるため、ユーザー削除時もそのまま残す (外部キーなし)
        manager
            .create_table(
                Table::create()
                    .table(FinanceEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FinanceEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FinanceEntries::TenantId).uuid().not_null())
                    .col(ColumnDef::new(FinanceEntries::UserId).uuid())
                    .col(ColumnDef::new(FinanceEntries::Description).string().not_null())
                    .col(
                        ColumnDef::new(FinanceEntries::AmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinanceEntries::EntryType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinanceEntries::DueDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinanceEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FinanceEntries::UpdatedAt)
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
                    .name("idx_leads_tenant_email")
                    .table(Leads::Table)
                    .col(Leads::TenantId)
                    .col(Leads::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_leads_assigned_to")
                    .table(Leads::Table)
                    .col(Leads::AssignedTo)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_owners_tenant_email")
                    .table(Owners::Table)
                    .col(Owners::TenantId)
                    .col(Owners::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_renters_tenant_email")
                    .table(Renters::Table)
                    .col(Renters::TenantId)
                    .col(Renters::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_visits_assigned_to")
                    .table(Visits::Table)
                    .col(Visits::AssignedTo)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_interactions_user_id")
                    .table(Interactions::Table)
                    .col(Interactions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_finance_entries_tenant_user")
                    .table(FinanceEntries::Table)
                    .col(FinanceEntries::TenantId)
                    .col(FinanceEntries::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FinanceEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Interactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Visits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Renters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Owners::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Leads::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Leads {
    Table,
    Id,
    TenantId,
    Name,
    Email,
    Phone,
    CpfCnpj,
    Source,
    Status,
    AssignedTo,
    Notes,
    AnonymizedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Owners {
    Table,
    Id,
    TenantId,
    Name,
    Email,
    Phone,
    CpfCnpj,
    Rg,
    Address,
    BankName,
    BankAgency,
    BankAccount,
    PixKey,
    Notes,
    AnonymizedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Renters {
    Table,
    Id,
    TenantId,
    Name,
    Email,
    Phone,
    CpfCnpj,
    Rg,
    Address,
    Employer,
    GuarantorName,
    Notes,
    AnonymizedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Visits {
    Table,
    Id,
    TenantId,
    LeadId,
    AssignedTo,
    ScheduledAt,
    Status,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Interactions {
    Table,
    Id,
    TenantId,
    UserId,
    LeadId,
    Kind,
    Description,
    CreatedAt,
}

#[derive(Iden)]
enum FinanceEntries {
    Table,
    Id,
    TenantId,
    UserId,
    Description,
    AmountCents,
    EntryType,
    DueDate,
    CreatedAt,
    UpdatedAt,
}
