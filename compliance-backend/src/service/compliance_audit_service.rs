// compliance-backend/src/service/compliance_audit_service.rs

use crate::domain::compliance_audit_log_model::{
    ActorType, AuditAction, AuditSeverity, ComplianceAuditBuilder, LegalBasis,
    Model as AuditLogModel,
};
use crate::domain::consent_record_model::ConsentType;
use crate::error::AppResult;
use crate::log_with_context;
use crate::repository::compliance_audit_log_repository::ComplianceAuditLogRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// 監査レポートの明細は最大この件数まで
pub const AUDIT_REPORT_DETAIL_LIMIT: u64 = 1000;

/// リクエスト由来の付帯情報
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
}

impl AuditContext {
    fn apply(&self, mut builder: ComplianceAuditBuilder) -> ComplianceAuditBuilder {
        builder = builder
            .ip_address(self.ip_address.clone())
            .user_agent(self.user_agent.clone());
        if let (Some(method), Some(path)) = (&self.request_method, &self.request_path) {
            builder = builder.request(method.clone(), path.clone());
        }
        builder
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub tenant_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_events: u64,
    pub by_action: BTreeMap<String, i64>,
    pub by_entity_type: BTreeMap<String, i64>,
    pub by_severity: BTreeMap<String, i64>,
    pub entries: Vec<AuditLogModel>,
    pub truncated: bool,
}

/// コンプライアンス監査ログの記録と参照
pub struct ComplianceAuditService {
    audit_log_repo: Arc<ComplianceAuditLogRepository>,
}

impl ComplianceAuditService {
    pub fn new(audit_log_repo: Arc<ComplianceAuditLogRepository>) -> Self {
        Self { audit_log_repo }
    }

    /// 監査ログを1件記録する
    ///
    /// 記録に失敗しても呼び出し元の業務処理は止めない (エラーはログ出力のみ)。
    pub async fn log(&self, builder: ComplianceAuditBuilder) -> Option<AuditLogModel> {
        let action = builder.action().as_str().to_string();

        match self.audit_log_repo.create(builder.build()).await {
            Ok(entry) => {
                log_with_context!(
                    tracing::Level::DEBUG,
                    "Compliance audit recorded",
                    "action" => &action,
                    "entity_type" => &entry.entity_type,
                    "severity" => entry.severity.as_str()
                );
                Some(entry)
            }
            Err(e) => {
                log_with_context!(
                    tracing::Level::ERROR,
                    "Failed to record compliance audit",
                    "action" => &action,
                    "error" => &e.to_string()
                );
                None
            }
        }
    }

    /// リクエストの付帯情報をつけて記録
    pub async fn log_in_context(
        &self,
        builder: ComplianceAuditBuilder,
        context: &AuditContext,
    ) -> Option<AuditLogModel> {
        self.log(context.apply(builder)).await
    }

    /// 個人データの参照を記録
    #[allow(clippy::too_many_arguments)]
    pub async fn log_data_access(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        actor_type: ActorType,
        entity_type: &str,
        entity_id: impl ToString,
        legal_basis: LegalBasis,
        context: &AuditContext,
    ) {
        let builder = ComplianceAuditBuilder::new(tenant_id, AuditAction::DataAccess, entity_type)
            .entity_id(entity_id)
            .user_id(actor_id)
            .actor(actor_type, Some(actor_id))
            .legal_basis(legal_basis);
        self.log(context.apply(builder)).await;
    }

    /// 個人データの変更を記録 (差分の機微フィールドは伏せ字)
    #[allow(clippy::too_many_arguments)]
    pub async fn log_data_modification(
        &self,
        tenant_id: Uuid,
        subject_id: Uuid,
        actor_id: Option<Uuid>,
        actor_type: ActorType,
        entity_type: &str,
        entity_id: impl ToString,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
        context: &AuditContext,
    ) {
        let builder =
            ComplianceAuditBuilder::new(tenant_id, AuditAction::DataModification, entity_type)
                .entity_id(entity_id)
                .user_id(subject_id)
                .actor(actor_type, actor_id)
                .changed_data(json!({ "before": before, "after": after }));
        self.log(context.apply(builder)).await;
    }

    /// 同意の付与・撤回を記録
    #[allow(clippy::too_many_arguments)]
    pub async fn log_consent_event(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        consent_id: Uuid,
        consent_type: ConsentType,
        action: AuditAction,
        details: serde_json::Value,
        context: &AuditContext,
    ) {
        let severity = if action == AuditAction::ConsentWithdrawn {
            AuditSeverity::Warning
        } else {
            AuditSeverity::Info
        };

        let mut builder = ComplianceAuditBuilder::new(tenant_id, action, "consent")
            .entity_id(consent_id)
            .details(json!({ "consentType": consent_type.as_str(), "info": details }))
            .legal_basis(LegalBasis::Consent)
            .severity(severity);
        if let Some(user_id) = user_id {
            builder = builder.user_id(user_id).actor(ActorType::User, Some(user_id));
        }
        self.log(context.apply(builder)).await;
    }

    // --- 参照系 ---

    pub async fn get_user_logs(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        limit: u64,
    ) -> AppResult<Vec<AuditLogModel>> {
        Ok(self
            .audit_log_repo
            .find_by_user(tenant_id, user_id, limit.min(AUDIT_REPORT_DETAIL_LIMIT))
            .await?)
    }

    pub async fn get_tenant_logs(&self, tenant_id: Uuid, limit: u64) -> AppResult<Vec<AuditLogModel>> {
        Ok(self
            .audit_log_repo
            .find_by_tenant(tenant_id, limit.min(AUDIT_REPORT_DETAIL_LIMIT))
            .await?)
    }

    pub async fn get_logs_by_action(
        &self,
        tenant_id: Uuid,
        action: &str,
        limit: u64,
    ) -> AppResult<Vec<AuditLogModel>> {
        Ok(self
            .audit_log_repo
            .find_by_action(tenant_id, action, limit.min(AUDIT_REPORT_DETAIL_LIMIT))
            .await?)
    }

    pub async fn count_tenant_logs(&self, tenant_id: Uuid) -> AppResult<u64> {
        Ok(self.audit_log_repo.count_by_tenant(tenant_id).await?)
    }

    /// 期間指定の監査レポート (集計は全件、明細は上限つき)
    pub async fn generate_report(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<AuditReport> {
        let total_events = self.audit_log_repo.count_in_range(tenant_id, start, end).await?;
        let by_action = self
            .audit_log_repo
            .count_by_action_in_range(tenant_id, start, end)
            .await?
            .into_iter()
            .collect();
        let by_entity_type = self
            .audit_log_repo
            .count_by_entity_type_in_range(tenant_id, start, end)
            .await?
            .into_iter()
            .collect();
        let by_severity = self
            .audit_log_repo
            .count_by_severity_in_range(tenant_id, start, end)
            .await?
            .into_iter()
            .map(|(severity, count)| (severity.as_str().to_string(), count))
            .collect();
        let entries = self
            .audit_log_repo
            .find_in_range(tenant_id, start, end, AUDIT_REPORT_DETAIL_LIMIT)
            .await?;

        Ok(AuditReport {
            tenant_id,
            start_date: start,
            end_date: end,
            total_events,
            by_action,
            by_entity_type,
            by_severity,
            truncated: total_events > entries.len() as u64,
            entries,
        })
    }
}
