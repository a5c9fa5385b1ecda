// compliance-backend/src/domain/deletion_request_model.rs

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// 削除リクエストの状態
///
/// `pending → confirmed → processing → completed`、`pending → cancelled`、
/// 処理失敗時は `processing → pending` に戻る。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionStatus::Pending => "pending",
            DeletionStatus::Confirmed => "confirmed",
            DeletionStatus::Processing => "processing",
            DeletionStatus::Completed => "completed",
            DeletionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeletionStatus::Completed | DeletionStatus::Cancelled)
    }

    /// ユーザーごとに1件までに制限される状態
    pub fn open_statuses() -> [DeletionStatus; 3] {
        [
            DeletionStatus::Pending,
            DeletionStatus::Confirmed,
            DeletionStatus::Processing,
        ]
    }

    pub fn can_transition_to(&self, next: DeletionStatus) -> bool {
        use DeletionStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Confirmed, Pending)
        )
    }
}

impl std::str::FromStr for DeletionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(DeletionStatus::Pending),
            "confirmed" => Ok(DeletionStatus::Confirmed),
            "processing" => Ok(DeletionStatus::Processing),
            "completed" => Ok(DeletionStatus::Completed),
            "cancelled" => Ok(DeletionStatus::Cancelled),
            _ => Err(format!("Status inválido: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DeletionType {
    #[default]
    #[sea_orm(string_value = "anonymize")]
    Anonymize,
    #[sea_orm(string_value = "hard_delete")]
    HardDelete,
}

impl DeletionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionType::Anonymize => "anonymize",
            DeletionType::HardDelete => "hard_delete",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deletion_requests")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,

    // 確認トークンはハッシュのみ保存する
    #[serde(skip_serializing)]
    pub token_hash: String,

    pub status: DeletionStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub reason: Option<String>,
    pub deletion_type: DeletionType,
    pub data_retention: Json,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[sea_orm(unique)]
    pub certificate_number: Option<String>,
    pub certificate_url: Option<String>,
    pub ip_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use DeletionStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Pending));
        assert!(Processing.can_transition_to(Completed));

        // 確定後の取り消しは不可
        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DeletionStatus::Completed.is_terminal());
        assert!(DeletionStatus::Cancelled.is_terminal());
        for status in DeletionStatus::open_statuses() {
            assert!(!status.is_terminal());
        }
    }
}
