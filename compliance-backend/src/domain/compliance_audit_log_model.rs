// compliance-backend/src/domain/compliance_audit_log_model.rs

use super::sensitive_fields::redact_sensitive;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "system")]
    System,
    #[sea_orm(string_value = "api")]
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warning")]
    Warning,
    #[sea_orm(string_value = "critical")]
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "info",
            AuditSeverity::Warning => "warning",
            AuditSeverity::Critical => "critical",
        }
    }
}

/// LGPD art. 7 の法的根拠
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(30))")]
#[serde(rename_all = "snake_case")]
pub enum LegalBasis {
    #[sea_orm(string_value = "consent")]
    Consent,
    #[sea_orm(string_value = "contract")]
    Contract,
    #[sea_orm(string_value = "legitimate_interest")]
    LegitimateInterest,
    #[sea_orm(string_value = "legal_obligation")]
    LegalObligation,
}

/// コンプライアンス監査ログ (追記専用)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "compliance_audit_logs")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: Option<Json>,
    pub changed_data: Option<Json>,
    pub ip_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    pub request_path: Option<String>,
    pub request_method: Option<String>,
    pub legal_basis: Option<LegalBasis>,
    pub severity: AuditSeverity,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// 監査アクションの定義
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AuditAction {
    DataAccess,
    DataModification,
    // エクスポート関連
    DataExportRequested,
    DataExportCompleted,
    DataExportFailed,
    DataExportDownloaded,
    DataExportExpired,
    // 同意関連
    ConsentGiven,
    ConsentWithdrawn,
    ConsentPolicyUpdated,
    CookieConsentSet,
    // アカウント削除関連
    AccountDeletionRequested,
    AccountDeletionConfirmed,
    AccountDeletionCompleted,
    AccountDeletionFailed,
    AccountDeletionCancelled,
    // DPO関連
    DataBreachRegistered,
    DataBreachUpdated,
    // その他
    Custom(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            AuditAction::DataAccess => "data_access",
            AuditAction::DataModification => "data_modification",
            AuditAction::DataExportRequested => "data_export_requested",
            AuditAction::DataExportCompleted => "data_export_completed",
            AuditAction::DataExportFailed => "data_export_failed",
            AuditAction::DataExportDownloaded => "data_export_downloaded",
            AuditAction::DataExportExpired => "data_export_expired",
            AuditAction::ConsentGiven => "consent_given",
            AuditAction::ConsentWithdrawn => "consent_withdrawn",
            AuditAction::ConsentPolicyUpdated => "consent_policy_updated",
            AuditAction::CookieConsentSet => "cookie_consent_set",
            AuditAction::AccountDeletionRequested => "account_deletion_requested",
            AuditAction::AccountDeletionConfirmed => "account_deletion_confirmed",
            AuditAction::AccountDeletionCompleted => "account_deletion_completed",
            AuditAction::AccountDeletionFailed => "account_deletion_failed",
            AuditAction::AccountDeletionCancelled => "account_deletion_cancelled",
            AuditAction::DataBreachRegistered => "data_breach_registered",
            AuditAction::DataBreachUpdated => "data_breach_updated",
            AuditAction::Custom(action) => action,
        }
    }
}

// 監査ログエントリービルダー
#[derive(Debug, Clone)]
pub struct ComplianceAuditBuilder {
    tenant_id: Uuid,
    action: AuditAction,
    entity_type: String,
    entity_id: Option<String>,
    user_id: Option<Uuid>,
    actor_id: Option<Uuid>,
    actor_type: ActorType,
    details: Option<serde_json::Value>,
    changed_data: Option<serde_json::Value>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    request_path: Option<String>,
    request_method: Option<String>,
    legal_basis: Option<LegalBasis>,
    severity: AuditSeverity,
}

impl ComplianceAuditBuilder {
    pub fn new(tenant_id: Uuid, action: AuditAction, entity_type: impl Into<String>) -> Self {
        Self {
            tenant_id,
            action,
            entity_type: entity_type.into(),
            entity_id: None,
            user_id: None,
            actor_id: None,
            actor_type: ActorType::User,
            details: None,
            changed_data: None,
            ip_address: None,
            user_agent: None,
            request_path: None,
            request_method: None,
            legal_basis: None,
            severity: AuditSeverity::Info,
        }
    }

    pub fn entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    /// 対象となるデータ主体
    pub fn user_id(mut self, id: Uuid) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn actor(mut self, actor_type: ActorType, actor_id: Option<Uuid>) -> Self {
        self.actor_type = actor_type;
        self.actor_id = actor_id;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(redact_sensitive(&details));
        self
    }

    /// 変更差分 (機微フィールドは保存前に伏せ字にする)
    pub fn changed_data(mut self, changed: serde_json::Value) -> Self {
        self.changed_data = Some(redact_sensitive(&changed));
        self
    }

    pub fn ip_address(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn user_agent(mut self, agent: Option<String>) -> Self {
        self.user_agent = agent;
        self
    }

    pub fn request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.request_path = Some(path.into());
        self
    }

    pub fn legal_basis(mut self, basis: LegalBasis) -> Self {
        self.legal_basis = Some(basis);
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn action(&self) -> &AuditAction {
        &self.action
    }

    pub fn build(self) -> ActiveModel {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            user_id: Set(self.user_id),
            actor_id: Set(self.actor_id),
            actor_type: Set(self.actor_type),
            action: Set(self.action.as_str().to_string()),
            entity_type: Set(self.entity_type),
            entity_id: Set(self.entity_id),
            details: Set(self.details),
            changed_data: Set(self.changed_data),
            ip_address: Set(self.ip_address),
            user_agent: Set(self.user_agent),
            request_path: Set(self.request_path),
            request_method: Set(self.request_method),
            legal_basis: Set(self.legal_basis),
            severity: Set(self.severity),
            created_at: Set(Utc::now()),
        }
    }
}
