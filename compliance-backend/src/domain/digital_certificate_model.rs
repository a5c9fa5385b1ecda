// compliance-backend/src/domain/digital_certificate_model.rs

use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// 期限切れ間近と判定する日数
pub const EXPIRING_SOON_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "revoked")]
    Revoked,
}

/// ICP-Brasil の証明書種別 (A1: ソフトウェア, A3: トークン/スマートカード)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum CertificateType {
    #[sea_orm(string_value = "A1")]
    A1,
    #[sea_orm(string_value = "A3")]
    A3,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "digital_certificates")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub certificate_type: CertificateType,
    pub holder_name: String,
    pub holder_document: String,
    pub issuer: String,
    pub serial_number: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: CertificateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        self.updated_at = Set(Utc::now());
        Ok(self)
    }
}

/// 証明書検証の結果
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateValidation {
    pub valid: bool,
    pub expiring_soon: bool,
    pub days_remaining: i64,
    pub reason: Option<String>,
}

impl Model {
    /// 有効期間とステータスのみから判定する
    pub fn validate_at(&self, now: DateTime<Utc>) -> CertificateValidation {
        let days_remaining = (self.valid_until - now).num_days();

        let reason = match self.status {
            CertificateStatus::Revoked => Some("Certificado revogado".to_string()),
            CertificateStatus::Expired => Some("Certificado expirado".to_string()),
            CertificateStatus::Active if now < self.valid_from => {
                Some("Certificado ainda não é válido".to_string())
            }
            CertificateStatus::Active if now > self.valid_until => {
                Some("Certificado expirado".to_string())
            }
            CertificateStatus::Active => None,
        };
        let valid = reason.is_none();

        CertificateValidation {
            valid,
            expiring_soon: valid && self.is_expiring_soon_at(now),
            days_remaining: days_remaining.max(0),
            reason,
        }
    }

    pub fn is_expiring_soon_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now && self.valid_until <= now + Duration::days(EXPIRING_SOON_DAYS)
    }
}
