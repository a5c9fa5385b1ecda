// compliance-backend/src/domain/esign_audit_event_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 電子署名の監査イベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
#[serde(rename_all = "snake_case")]
pub enum EsignEventType {
    // 文書
    #[sea_orm(string_value = "document_created")]
    DocumentCreated,
    #[sea_orm(string_value = "document_uploaded")]
    DocumentUploaded,
    #[sea_orm(string_value = "document_viewed")]
    DocumentViewed,
    #[sea_orm(string_value = "document_downloaded")]
    DocumentDownloaded,
    #[sea_orm(string_value = "document_signed")]
    DocumentSigned,
    #[sea_orm(string_value = "document_refused")]
    DocumentRefused,
    #[sea_orm(string_value = "document_cancelled")]
    DocumentCancelled,
    #[sea_orm(string_value = "document_expired")]
    DocumentExpired,
    // 署名者
    #[sea_orm(string_value = "signer_added")]
    SignerAdded,
    #[sea_orm(string_value = "signer_removed")]
    SignerRemoved,
    #[sea_orm(string_value = "signer_notified")]
    SignerNotified,
    // 証明書
    #[sea_orm(string_value = "certificate_validated")]
    CertificateValidated,
    #[sea_orm(string_value = "certificate_expired")]
    CertificateExpired,
    #[sea_orm(string_value = "certificate_revoked")]
    CertificateRevoked,
    // 契約
    #[sea_orm(string_value = "contract_created")]
    ContractCreated,
    #[sea_orm(string_value = "contract_completed")]
    ContractCompleted,
    #[sea_orm(string_value = "contract_cancelled")]
    ContractCancelled,
    // 未知のWebhookイベント
    #[sea_orm(string_value = "webhook_received")]
    WebhookReceived,
}

impl EsignEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EsignEventType::DocumentCreated => "document_created",
            EsignEventType::DocumentUploaded => "document_uploaded",
            EsignEventType::DocumentViewed => "document_viewed",
            EsignEventType::DocumentDownloaded => "document_downloaded",
            EsignEventType::DocumentSigned => "document_signed",
            EsignEventType::DocumentRefused => "document_refused",
            EsignEventType::DocumentCancelled => "document_cancelled",
            EsignEventType::DocumentExpired => "document_expired",
            EsignEventType::SignerAdded => "signer_added",
            EsignEventType::SignerRemoved => "signer_removed",
            EsignEventType::SignerNotified => "signer_notified",
            EsignEventType::CertificateValidated => "certificate_validated",
            EsignEventType::CertificateExpired => "certificate_expired",
            EsignEventType::CertificateRevoked => "certificate_revoked",
            EsignEventType::ContractCreated => "contract_created",
            EsignEventType::ContractCompleted => "contract_completed",
            EsignEventType::ContractCancelled => "contract_cancelled",
            EsignEventType::WebhookReceived => "webhook_received",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    #[default]
    #[sea_orm(string_value = "standard")]
    Standard,
    #[sea_orm(string_value = "enhanced")]
    Enhanced,
    /// 長期保管ストレージにも保存する
    #[sea_orm(string_value = "legal")]
    Legal,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "esign_audit_events")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: EsignEventType,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: Option<Uuid>,
    pub action: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    pub metadata: Json,
    pub compliance_level: ComplianceLevel,
    pub digital_signature: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
