// compliance-backend/src/domain/signature_contract_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "canceled")]
    Canceled,
    #[sea_orm(string_value = "refused")]
    Refused,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Running => "running",
            ContractStatus::Closed => "closed",
            ContractStatus::Canceled => "canceled",
            ContractStatus::Refused => "refused",
            ContractStatus::Expired => "expired",
        }
    }

    /// 終了済みの契約は Webhook で状態を戻さない
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ContractStatus::Closed
                | ContractStatus::Canceled
                | ContractStatus::Refused
                | ContractStatus::Expired
        )
    }
}

/// 電子署名プロバイダーに送った契約書
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "signature_contracts")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[sea_orm(unique)]
    pub document_key: String,
    pub title: String,
    pub status: ContractStatus,
    pub created_by: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::contract_signer_model::Entity")]
    Signers,
}

impl Related<super::contract_signer_model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Signers.def()
    }
}

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
