// compliance-backend/src/domain/consent_record_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 同意の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    #[sea_orm(string_value = "privacy")]
    Privacy,
    #[sea_orm(string_value = "marketing")]
    Marketing,
    #[sea_orm(string_value = "analytics")]
    Analytics,
    #[sea_orm(string_value = "cookies")]
    Cookies,
    #[sea_orm(string_value = "newsletter")]
    Newsletter,
}

impl ConsentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentType::Privacy => "privacy",
            ConsentType::Marketing => "marketing",
            ConsentType::Analytics => "analytics",
            ConsentType::Cookies => "cookies",
            ConsentType::Newsletter => "newsletter",
        }
    }
}

impl std::str::FromStr for ConsentType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "privacy" => Ok(ConsentType::Privacy),
            "marketing" => Ok(ConsentType::Marketing),
            "analytics" => Ok(ConsentType::Analytics),
            "cookies" => Ok(ConsentType::Cookies),
            "newsletter" => Ok(ConsentType::Newsletter),
            _ => Err(format!("Tipo de consentimento inválido: {}", value)),
        }
    }
}

/// 同意の状態 (withdrawn は本人の撤回、expired はポリシー改定による失効)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "withdrawn")]
    Withdrawn,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Active => "active",
            ConsentStatus::Withdrawn => "withdrawn",
            ConsentStatus::Expired => "expired",
        }
    }
}

/// 同意記録 (監査対象のため物理削除しない)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "consent_records")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub consent_type: ConsentType,
    pub consent_version: String,
    pub status: ConsentStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub purpose: Option<String>,
    pub accepted_at: DateTime<Utc>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    pub metadata: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_active(&self) -> bool {
        self.status == ConsentStatus::Active
    }
}
