// compliance-backend/src/service/dpo_service.rs

//! DPO (Encarregado) 向けの参照・管理機能

use crate::domain::compliance_audit_log_model::{
    ActorType, AuditAction, AuditSeverity, ComplianceAuditBuilder, LegalBasis,
};
use crate::domain::data_breach_model::{
    ActiveModel as BreachActiveModel, BreachSeverity, BreachStatus, Model as BreachModel,
};
use crate::domain::retention_policy::{get_data_retention_rules, EntityRetentionRule};
use crate::error::{AppError, AppResult};
use crate::repository::consent_repository::ConsentRepository;
use crate::repository::crm_repository::CrmRepository;
use crate::repository::data_breach_repository::DataBreachRepository;
use crate::repository::deletion_request_repository::DeletionRequestRepository;
use crate::repository::export_request_repository::ExportRequestRepository;
use crate::repository::user_repository::UserRepository;
use crate::service::compliance_audit_service::{AuditContext, ComplianceAuditService};
use crate::utils::error_helper::not_found_error;
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue::Set, IntoActiveModel};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// 削除リクエストの対応期限 (LGPD art. 19, II)
pub const DELETION_RESPONSE_DAYS: i64 = 15;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub entity_type: &'static str,
    pub record_count: u64,
    pub retention: EntityRetentionRule,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInventory {
    pub tenant_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_records: u64,
    pub entities: Vec<InventoryItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// リスク評価の指標
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskIndicators {
    pub overdue_deletion_requests: u64,
    pub failed_deletion_processing: u64,
    pub open_breaches: BTreeMap<String, i64>,
    pub users_without_privacy_consent: u64,
    pub expired_exports_pending_cleanup: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub tenant_id: Uuid,
    pub assessed_at: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub indicators: RiskIndicators,
    pub findings: Vec<String>,
}

/// 指標から全体のリスクレベルと所見を導く
pub fn assess_risk(indicators: &RiskIndicators) -> (RiskLevel, Vec<String>) {
    let mut level = RiskLevel::Low;
    let mut findings = Vec::new();

    let serious_breaches: i64 = ["high", "critical"]
        .iter()
        .filter_map(|severity| indicators.open_breaches.get(*severity))
        .sum();
    let other_breaches: i64 = ["low", "medium"]
        .iter()
        .filter_map(|severity| indicators.open_breaches.get(*severity))
        .sum();

    if indicators.overdue_deletion_requests > 0 {
        level = level.max(RiskLevel::High);
        findings.push(format!(
            "{} solicitação(ões) de exclusão sem conclusão há mais de {} dias",
            indicators.overdue_deletion_requests, DELETION_RESPONSE_DAYS
        ));
    }
    if serious_breaches > 0 {
        level = level.max(RiskLevel::High);
        findings.push(format!(
            "{} incidente(s) de alta gravidade em aberto",
            serious_breaches
        ));
    }
    if other_breaches > 0 {
        level = level.max(RiskLevel::Medium);
        findings.push(format!("{} incidente(s) em aberto", other_breaches));
    }
    if indicators.failed_deletion_processing > 0 {
        level = level.max(RiskLevel::Medium);
        findings.push(format!(
            "{} exclusão(ões) com falha no processamento aguardando nova confirmação",
            indicators.failed_deletion_processing
        ));
    }
    if indicators.users_without_privacy_consent > 0 {
        level = level.max(RiskLevel::Medium);
        findings.push(format!(
            "{} usuário(s) sem consentimento ativo da política de privacidade",
            indicators.users_without_privacy_consent
        ));
    }
    if indicators.expired_exports_pending_cleanup > 0 {
        level = level.max(RiskLevel::Medium);
        findings.push(format!(
            "{} exportação(ões) expirada(s) ainda armazenada(s)",
            indicators.expired_exports_pending_cleanup
        ));
    }

    (level, findings)
}

#[derive(Debug, Clone)]
pub struct RegisterBreachParams {
    pub title: String,
    pub description: String,
    pub severity: BreachSeverity,
    pub affected_subjects: i32,
    pub data_categories: Vec<String>,
    pub detected_at: Option<DateTime<Utc>>,
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBreachParams {
    pub status: Option<BreachStatus>,
    pub severity: Option<BreachSeverity>,
    pub affected_subjects: Option<i32>,
    pub mitigation: Option<String>,
    pub reported_to_authority_at: Option<DateTime<Utc>>,
    pub subjects_notified_at: Option<DateTime<Utc>>,
}

pub struct DpoService {
    user_repo: Arc<UserRepository>,
    crm_repo: Arc<CrmRepository>,
    consent_repo: Arc<ConsentRepository>,
    deletion_repo: Arc<DeletionRequestRepository>,
    export_repo: Arc<ExportRequestRepository>,
    breach_repo: Arc<DataBreachRepository>,
    audit_service: Arc<ComplianceAuditService>,
}

impl DpoService {
    pub fn new(
        user_repo: Arc<UserRepository>,
        crm_repo: Arc<CrmRepository>,
        consent_repo: Arc<ConsentRepository>,
        deletion_repo: Arc<DeletionRequestRepository>,
        export_repo: Arc<ExportRequestRepository>,
        breach_repo: Arc<DataBreachRepository>,
        audit_service: Arc<ComplianceAuditService>,
    ) -> Self {
        Self {
            user_repo,
            crm_repo,
            consent_repo,
            deletion_repo,
            export_repo,
            breach_repo,
            audit_service,
        }
    }

    /// テナント内の個人データの所在と保存ルール
    pub async fn get_data_inventory(&self, tenant_id: Uuid) -> AppResult<DataInventory> {
        let crm = self.crm_repo.count_by_tenant(tenant_id).await?;
        let users = self.user_repo.count_by_tenant(tenant_id).await?;
        let consents: i64 = self
            .consent_repo
            .count_by_type_and_status(tenant_id)
            .await?
            .into_iter()
            .map(|(_, _, count)| count)
            .sum();
        let audit_logs = self.audit_service.count_tenant_logs(tenant_id).await?;

        let entities: Vec<InventoryItem> = [
            ("user", users),
            ("lead", crm.leads),
            ("owner", crm.owners),
            ("renter", crm.renters),
            ("visit", crm.visits),
            ("interaction", crm.interactions),
            ("financeEntry", crm.finance_entries),
            ("consent", consents.max(0) as u64),
            ("auditLog", audit_logs),
        ]
        .into_iter()
        .map(|(entity_type, record_count)| InventoryItem {
            entity_type,
            record_count,
            retention: get_data_retention_rules(entity_type),
        })
        .collect();

        Ok(DataInventory {
            tenant_id,
            generated_at: Utc::now(),
            total_records: entities.iter().map(|item| item.record_count).sum(),
            entities,
        })
    }

    pub async fn get_risk_assessment(&self, tenant_id: Uuid) -> AppResult<RiskAssessment> {
        let now = Utc::now();
        let indicators = RiskIndicators {
            overdue_deletion_requests: self
                .deletion_repo
                .count_open_created_before(tenant_id, now - Duration::days(DELETION_RESPONSE_DAYS))
                .await?,
            failed_deletion_processing: self.deletion_repo.count_failed_pending(tenant_id).await?,
            open_breaches: self
                .breach_repo
                .count_open_by_severity(tenant_id)
                .await?
                .into_iter()
                .map(|(severity, count)| (severity.as_str().to_string(), count))
                .collect(),
            users_without_privacy_consent: self
                .consent_repo
                .count_users_without_privacy_consent(tenant_id)
                .await?,
            expired_exports_pending_cleanup: self
                .export_repo
                .find_expired_completed(now, Some(tenant_id))
                .await?
                .len() as u64,
        };

        let (risk_level, findings) = assess_risk(&indicators);

        Ok(RiskAssessment {
            tenant_id,
            assessed_at: now,
            risk_level,
            indicators,
            findings,
        })
    }

    // --- インシデント登録簿 ---

    pub async fn list_breaches(
        &self,
        tenant_id: Uuid,
        status: Option<BreachStatus>,
    ) -> AppResult<Vec<BreachModel>> {
        Ok(self.breach_repo.find_by_tenant(tenant_id, status).await?)
    }

    pub async fn register_breach(
        &self,
        tenant_id: Uuid,
        reported_by: Uuid,
        params: RegisterBreachParams,
        context: &AuditContext,
    ) -> AppResult<BreachModel> {
        let now = Utc::now();
        let detected_at = params.detected_at.unwrap_or(now);
        if detected_at > now {
            return Err(AppError::BadRequest(
                "A data de detecção não pode estar no futuro".to_string(),
            ));
        }

        let breach = self
            .breach_repo
            .create(BreachActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant_id),
                title: Set(params.title),
                description: Set(params.description),
                severity: Set(params.severity),
                status: Set(BreachStatus::Open),
                affected_subjects: Set(params.affected_subjects),
                data_categories: Set(json!(params.data_categories)),
                detected_at: Set(detected_at),
                contained_at: Set(None),
                reported_to_authority_at: Set(None),
                subjects_notified_at: Set(None),
                mitigation: Set(params.mitigation),
                reported_by: Set(reported_by),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await?;

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(tenant_id, AuditAction::DataBreachRegistered, "data_breach")
                    .entity_id(breach.id)
                    .actor(ActorType::Admin, Some(reported_by))
                    .details(json!({
                        "title": breach.title,
                        "severity": breach.severity.as_str(),
                        "affectedSubjects": breach.affected_subjects,
                    }))
                    .legal_basis(LegalBasis::LegalObligation)
                    .severity(AuditSeverity::Critical),
                context,
            )
            .await;

        Ok(breach)
    }

    pub async fn update_breach(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        breach_id: Uuid,
        params: UpdateBreachParams,
        context: &AuditContext,
    ) -> AppResult<BreachModel> {
        let current = self
            .breach_repo
            .find_by_id(tenant_id, breach_id)
            .await?
            .ok_or_else(|| {
                not_found_error("Incidente não encontrado", &breach_id.to_string(), "update_breach")
            })?;

        if current.status == BreachStatus::Resolved && params.status != Some(BreachStatus::Open) {
            return Err(AppError::Conflict(
                "Incidente já resolvido; reabra-o antes de alterar".to_string(),
            ));
        }

        let before = json!(current);
        let now = Utc::now();
        let mut active = current.clone().into_active_model();

        if let Some(status) = params.status {
            active.status = Set(status);
            if status != BreachStatus::Open && current.contained_at.is_none() {
                active.contained_at = Set(Some(now));
            }
        }
        if let Some(severity) = params.severity {
            active.severity = Set(severity);
        }
        if let Some(affected) = params.affected_subjects {
            active.affected_subjects = Set(affected);
        }
        if let Some(mitigation) = params.mitigation {
            active.mitigation = Set(Some(mitigation));
        }
        if let Some(reported) = params.reported_to_authority_at {
            active.reported_to_authority_at = Set(Some(reported));
        }
        if let Some(notified) = params.subjects_notified_at {
            active.subjects_notified_at = Set(Some(notified));
        }
        active.updated_at = Set(now);

        let updated = self.breach_repo.update(active).await?;

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(tenant_id, AuditAction::DataBreachUpdated, "data_breach")
                    .entity_id(updated.id)
                    .actor(ActorType::Admin, Some(actor_id))
                    .changed_data(json!({ "before": before, "after": updated }))
                    .legal_basis(LegalBasis::LegalObligation)
                    .severity(AuditSeverity::Warning),
                context,
            )
            .await;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tenant_is_low_risk() {
        let (level, findings) = assess_risk(&RiskIndicators::default());
        assert_eq!(level, RiskLevel::Low);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_overdue_deletion_is_high_risk() {
        let indicators = RiskIndicators {
            overdue_deletion_requests: 1,
            ..Default::default()
        };
        let (level, findings) = assess_risk(&indicators);
        assert_eq!(level, RiskLevel::High);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_breach_severity_drives_level() {
        let mut indicators = RiskIndicators::default();
        indicators.open_breaches.insert("low".to_string(), 2);
        assert_eq!(assess_risk(&indicators).0, RiskLevel::Medium);

        indicators.open_breaches.insert("critical".to_string(), 1);
        assert_eq!(assess_risk(&indicators).0, RiskLevel::High);
    }

    #[test]
    fn test_operational_gaps_are_medium_risk() {
        let indicators = RiskIndicators {
            users_without_privacy_consent: 4,
            expired_exports_pending_cleanup: 1,
            ..Default::default()
        };
        let (level, findings) = assess_risk(&indicators);
        assert_eq!(level, RiskLevel::Medium);
        assert_eq!(findings.len(), 2);
    }
}
