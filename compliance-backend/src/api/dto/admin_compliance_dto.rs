// compliance-backend/src/api/dto/admin_compliance_dto.rs

use crate::domain::consent_record_model::ConsentType;
use crate::domain::data_breach_model::{BreachSeverity, BreachStatus};
use crate::domain::deletion_request_model::DeletionStatus;
use crate::service::dpo_service::{RegisterBreachParams, UpdateBreachParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// 監査ログ検索の上限件数
pub const MAX_AUDIT_LOG_LIMIT: u64 = 1000;

// --- Query DTOs ---

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuditReportQuery {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<u64>,
}

impl AuditLogQuery {
    pub fn effective_limit(&self) -> u64 {
        self.limit.unwrap_or(100).clamp(1, MAX_AUDIT_LOG_LIMIT)
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct DeletionRequestsQuery {
    pub status: Option<DeletionStatus>,
}

#[derive(Deserialize, Debug, Default)]
pub struct BreachListQuery {
    pub status: Option<BreachStatus>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityQuery {
    pub document_id: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct EsignEventsQuery {
    pub limit: Option<u64>,
}

// --- Request DTOs ---

#[derive(Deserialize, Serialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBreachRequest {
    #[validate(length(min = 3, max = 200, message = "O título deve ter entre 3 e 200 caracteres"))]
    pub title: String,

    #[validate(length(min = 1, max = 5000, message = "A descrição é obrigatória"))]
    pub description: String,

    pub severity: BreachSeverity,

    #[validate(range(min = 0, message = "Número de titulares afetados inválido"))]
    #[serde(default)]
    pub affected_subjects: i32,

    #[serde(default)]
    pub data_categories: Vec<String>,

    pub detected_at: Option<DateTime<Utc>>,

    #[validate(length(max = 5000))]
    pub mitigation: Option<String>,
}

impl From<RegisterBreachRequest> for RegisterBreachParams {
    fn from(request: RegisterBreachRequest) -> Self {
        Self {
            title: request.title.trim().to_string(),
            description: request.description,
            severity: request.severity,
            affected_subjects: request.affected_subjects,
            data_categories: request.data_categories,
            detected_at: request.detected_at,
            mitigation: request.mitigation,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBreachRequest {
    pub status: Option<BreachStatus>,
    pub severity: Option<BreachSeverity>,

    #[validate(range(min = 0, message = "Número de titulares afetados inválido"))]
    pub affected_subjects: Option<i32>,

    #[validate(length(max = 5000))]
    pub mitigation: Option<String>,

    pub reported_to_authority_at: Option<DateTime<Utc>>,
    pub subjects_notified_at: Option<DateTime<Utc>>,
}

impl From<UpdateBreachRequest> for UpdateBreachParams {
    fn from(request: UpdateBreachRequest) -> Self {
        Self {
            status: request.status,
            severity: request.severity,
            affected_subjects: request.affected_subjects,
            mitigation: request.mitigation,
            reported_to_authority_at: request.reported_to_authority_at,
            subjects_notified_at: request.subjects_notified_at,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPolicyUpdateRequest {
    pub consent_type: ConsentType,

    #[validate(length(min = 1, max = 20, message = "Versão anterior inválida"))]
    pub old_version: String,

    #[validate(length(min = 1, max = 20, message = "Nova versão inválida"))]
    pub new_version: String,
}

// --- Response DTOs ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPolicyUpdateResponse {
    pub consent_type: ConsentType,
    pub old_version: String,
    pub new_version: String,
    pub expired_count: u64,
}
