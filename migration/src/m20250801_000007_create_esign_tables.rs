use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 電子署名の契約ドキュメント
        manager
            .create_table(
                Table::create()
                    .table(SignatureContracts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SignatureContracts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SignatureContracts::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(SignatureContracts::DocumentKey)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SignatureContracts::Title).string().not_null())
                    .col(
                        ColumnDef::new(SignatureContracts::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SignatureContracts::CreatedBy).uuid())
                    .col(ColumnDef::new(SignatureContracts::ClosedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(SignatureContracts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SignatureContracts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ContractSigners::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContractSigners::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContractSigners::TenantId).uuid().not_null())
                    .col(ColumnDef::new(ContractSigners::ContractId).uuid().not_null())
                    .col(
                        ColumnDef::new(ContractSigners::SignerKey)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ContractSigners::Name).string())
                    .col(ColumnDef::new(ContractSigners::Email).string().not_null())
                    .col(
                        ColumnDef::new(ContractSigners::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ContractSigners::SignedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ContractSigners::RefusedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ContractSigners::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ContractSigners::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contract_signers_contract")
                            .from(ContractSigners::Table, ContractSigners::ContractId)
                            .to(SignatureContracts::Table, SignatureContracts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_contract_signers_contract_key_unique")
                    .table(ContractSigners::Table)
                    .col(ContractSigners::ContractId)
                    .col(ContractSigners::SignerKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 電子署名の監査イベント (改ざん検知用の署名付き)
        manager
            .create_table(
                Table::create()
                    .table(EsignAuditEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EsignAuditEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EsignAuditEvents::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(EsignAuditEvents::EventType)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EsignAuditEvents::EntityType)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EsignAuditEvents::EntityId).string().not_null())
                    .col(ColumnDef::new(EsignAuditEvents::UserId).uuid())
                    .col(ColumnDef::new(EsignAuditEvents::Action).string_len(100).not_null())
                    .col(ColumnDef::new(EsignAuditEvents::Description).text().not_null())
                    .col(
                        ColumnDef::new(EsignAuditEvents::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EsignAuditEvents::IpAddress).string_len(45))
                    .col(ColumnDef::new(EsignAuditEvents::UserAgent).text())
                    .col(ColumnDef::new(EsignAuditEvents::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(EsignAuditEvents::ComplianceLevel)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EsignAuditEvents::DigitalSignature)
                            .string_len(64)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_esign_audit_events_entity")
                    .table(EsignAuditEvents::Table)
                    .col(EsignAuditEvents::TenantId)
                    .col(EsignAuditEvents::EntityId)
                    .col(EsignAuditEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        // ICP-Brasil 証明書
        manager
            .create_table(
                Table::create()
                    .table(DigitalCertificates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DigitalCertificates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DigitalCertificates::TenantId).uuid().not_null())
                    .col(ColumnDef::new(DigitalCertificates::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(DigitalCertificates::CertificateType)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DigitalCertificates::HolderName).string().not_null())
                    .col(
                        ColumnDef::new(DigitalCertificates::HolderDocument)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DigitalCertificates::Issuer).string().not_null())
                    .col(
                        ColumnDef::new(DigitalCertificates::SerialNumber)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigitalCertificates::ValidFrom)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigitalCertificates::ValidUntil)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigitalCertificates::Status)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigitalCertificates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DigitalCertificates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_digital_certificates_tenant_valid_until")
                    .table(DigitalCertificates::Table)
                    .col(DigitalCertificates::TenantId)
                    .col(DigitalCertificates::ValidUntil)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DigitalCertificates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EsignAuditEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ContractSigners::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SignatureContracts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SignatureContracts {
    Table,
    Id,
    TenantId,
    DocumentKey,
    Title,
    Status,
    CreatedBy,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ContractSigners {
    Table,
    Id,
    TenantId,
    ContractId,
    SignerKey,
    Name,
    Email,
    Status,
    SignedAt,
    RefusedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum EsignAuditEvents {
    Table,
    Id,
    TenantId,
    EventType,
    EntityType,
    EntityId,
    UserId,
    Action,
    Description,
    Timestamp,
    IpAddress,
    UserAgent,
    Metadata,
    ComplianceLevel,
    DigitalSignature,
}

#[derive(Iden)]
enum DigitalCertificates {
    Table,
    Id,
    TenantId,
    UserId,
    CertificateType,
    HolderName,
    HolderDocument,
    Issuer,
    SerialNumber,
    ValidFrom,
    ValidUntil,
    Status,
    CreatedAt,
    UpdatedAt,
}
