// compliance-backend/src/api/handlers/admin_compliance_handler.rs

//! DPO (encarregado) 向けツール (/api/admin/compliance)

use crate::api::dto::admin_compliance_dto::{
    AuditLogQuery, AuditReportQuery, BreachListQuery, ConsentPolicyUpdateRequest,
    ConsentPolicyUpdateResponse, DeletionRequestsQuery, EsignEventsQuery, IntegrityQuery,
    RegisterBreachRequest, UpdateBreachRequest,
};
use crate::api::AppState;
use crate::domain::compliance_audit_log_model::{ActorType, LegalBasis, Model as AuditLogModel};
use crate::domain::data_breach_model::Model as BreachModel;
use crate::domain::deletion_request_model::Model as DeletionModel;
use crate::domain::esign_audit_event_model::Model as EsignEventModel;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AdminUser;
use crate::service::compliance_audit_service::{AuditContext, AuditReport};
use crate::service::consent_service::ConsentStatistics;
use crate::service::dpo_service::{DataInventory, RiskAssessment};
use crate::service::esign_audit_service::{
    DocumentAuditReport, ExpiringCertificate, IntegrityReport, SignatureProof,
};
use crate::service::export_service::ExportCleanupReport;
use crate::types::ApiResponse;
use crate::utils::error_helper::convert_validation_errors;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

// --- 参照系 ---

pub async fn data_inventory_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiResponse<DataInventory>> {
    let inventory = app_state
        .dpo_service
        .get_data_inventory(admin.tenant_id())
        .await?;

    Ok(ApiResponse::success(inventory))
}

pub async fn consent_statistics_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiResponse<ConsentStatistics>> {
    let statistics = app_state
        .consent_service
        .get_consent_statistics(admin.tenant_id())
        .await?;

    Ok(ApiResponse::success(statistics))
}

pub async fn risk_assessment_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiResponse<RiskAssessment>> {
    let assessment = app_state
        .dpo_service
        .get_risk_assessment(admin.tenant_id())
        .await?;

    Ok(ApiResponse::success(assessment))
}

pub async fn audit_report_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<AuditReportQuery>,
) -> AppResult<ApiResponse<AuditReport>> {
    if query.start_date > query.end_date {
        return Err(AppError::BadRequest(
            "A data inicial deve ser anterior à data final".to_string(),
        ));
    }

    let report = app_state
        .audit_service
        .generate_report(admin.tenant_id(), query.start_date, query.end_date)
        .await?;

    Ok(ApiResponse::success(report))
}

pub async fn audit_logs_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    context: AuditContext,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<ApiResponse<Vec<AuditLogModel>>> {
    let limit = query.effective_limit();
    let tenant_id = admin.tenant_id();

    let logs = match (&query.user_id, &query.action) {
        (Some(user_id), _) => {
            // 特定の利用者の履歴の閲覧はそれ自体が個人データへのアクセス
            app_state
                .audit_service
                .log_data_access(
                    tenant_id,
                    admin.user_id(),
                    ActorType::Admin,
                    "auditLog",
                    user_id,
                    LegalBasis::LegalObligation,
                    &context,
                )
                .await;
            app_state
                .audit_service
                .get_user_logs(tenant_id, *user_id, limit)
                .await?
        }
        (None, Some(action)) => {
            app_state
                .audit_service
                .get_logs_by_action(tenant_id, action, limit)
                .await?
        }
        (None, None) => app_state.audit_service.get_tenant_logs(tenant_id, limit).await?,
    };

    Ok(ApiResponse::success(logs))
}

pub async fn deletion_requests_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<DeletionRequestsQuery>,
) -> AppResult<ApiResponse<Vec<DeletionModel>>> {
    let requests = app_state
        .deletion_service
        .list_requests(admin.tenant_id(), query.status)
        .await?;

    Ok(ApiResponse::success(requests))
}

// --- インシデント登録簿 ---

pub async fn list_breaches_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<BreachListQuery>,
) -> AppResult<ApiResponse<Vec<BreachModel>>> {
    let breaches = app_state
        .dpo_service
        .list_breaches(admin.tenant_id(), query.status)
        .await?;

    Ok(ApiResponse::success(breaches))
}

pub async fn register_breach_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    context: AuditContext,
    Json(payload): Json<RegisterBreachRequest>,
) -> AppResult<ApiResponse<BreachModel>> {
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "register_breach"))?;

    let breach = app_state
        .dpo_service
        .register_breach(admin.tenant_id(), admin.user_id(), payload.into(), &context)
        .await?;

    Ok(ApiResponse::success_with_message(
        breach,
        "Incidente registrado",
    ))
}

pub async fn update_breach_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    context: AuditContext,
    Path(breach_id): Path<Uuid>,
    Json(payload): Json<UpdateBreachRequest>,
) -> AppResult<ApiResponse<BreachModel>> {
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "update_breach"))?;

    let breach = app_state
        .dpo_service
        .update_breach(
            admin.tenant_id(),
            admin.user_id(),
            breach_id,
            payload.into(),
            &context,
        )
        .await?;

    Ok(ApiResponse::success_with_message(
        breach,
        "Incidente atualizado",
    ))
}

// --- 運用操作 ---

pub async fn consent_policy_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    context: AuditContext,
    Json(payload): Json<ConsentPolicyUpdateRequest>,
) -> AppResult<ApiResponse<ConsentPolicyUpdateResponse>> {
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "consent_policy"))?;
    if payload.old_version == payload.new_version {
        return Err(AppError::BadRequest(
            "A nova versão deve ser diferente da anterior".to_string(),
        ));
    }

    let expired_count = app_state
        .consent_service
        .update_consents_for_new_policy(
            payload.consent_type,
            &payload.old_version,
            &payload.new_version,
            Some(admin.tenant_id()),
            Some(admin.user_id()),
            &context,
        )
        .await?;

    Ok(ApiResponse::success(ConsentPolicyUpdateResponse {
        consent_type: payload.consent_type,
        old_version: payload.old_version,
        new_version: payload.new_version,
        expired_count,
    }))
}

pub async fn cleanup_exports_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiResponse<ExportCleanupReport>> {
    info!(
        tenant_id = %admin.tenant_id(),
        user_id = %admin.user_id(),
        "Manual export cleanup requested"
    );

    let report = app_state
        .export_service
        .cleanup_expired_exports(Some(admin.tenant_id()))
        .await?;

    Ok(ApiResponse::success(report))
}

// --- 電子署名の証跡 ---

pub async fn esign_integrity_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<IntegrityQuery>,
) -> AppResult<ApiResponse<IntegrityReport>> {
    let report = app_state
        .esign_audit_service
        .verify_audit_trail_integrity(admin.tenant_id(), &query.document_id)
        .await?;

    Ok(ApiResponse::success(report))
}

pub async fn esign_document_report_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    context: AuditContext,
    Path(document_id): Path<String>,
) -> AppResult<ApiResponse<DocumentAuditReport>> {
    let report = app_state
        .esign_audit_service
        .generate_document_audit_report(admin.tenant_id(), &document_id)
        .await?;

    // 証拠パッケージの閲覧も文書へのアクセスとして記録
    app_state
        .esign_audit_service
        .log_document_access(
            admin.tenant_id(),
            &document_id,
            admin.user_id(),
            false,
            &context,
        )
        .await;

    Ok(ApiResponse::success(report))
}

pub async fn esign_signature_proof_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Path(document_id): Path<String>,
) -> AppResult<ApiResponse<SignatureProof>> {
    let proof = app_state
        .esign_audit_service
        .get_signature_proof(admin.tenant_id(), &document_id)
        .await?;

    Ok(ApiResponse::success(proof))
}

pub async fn esign_events_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
    Query(query): Query<EsignEventsQuery>,
) -> AppResult<ApiResponse<Vec<EsignEventModel>>> {
    let events = app_state
        .esign_audit_service
        .get_recent_events(admin.tenant_id(), query.limit.unwrap_or(100))
        .await?;

    Ok(ApiResponse::success(events))
}

pub async fn expiring_certificates_handler(
    State(app_state): State<AppState>,
    admin: AdminUser,
) -> AppResult<ApiResponse<Vec<ExpiringCertificate>>> {
    let certificates = app_state
        .esign_audit_service
        .get_expiring_certificates(admin.tenant_id())
        .await?;

    Ok(ApiResponse::success(certificates))
}

pub fn admin_compliance_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/admin/compliance/data-inventory",
            get(data_inventory_handler),
        )
        .route(
            "/api/admin/compliance/consent-statistics",
            get(consent_statistics_handler),
        )
        .route(
            "/api/admin/compliance/risk-assessment",
            get(risk_assessment_handler),
        )
        .route(
            "/api/admin/compliance/audit-report",
            get(audit_report_handler),
        )
        .route("/api/admin/compliance/audit-logs", get(audit_logs_handler))
        .route(
            "/api/admin/compliance/deletion-requests",
            get(deletion_requests_handler),
        )
        .route(
            "/api/admin/compliance/breaches",
            get(list_breaches_handler).post(register_breach_handler),
        )
        .route(
            "/api/admin/compliance/breaches/{id}",
            put(update_breach_handler),
        )
        .route(
            "/api/admin/compliance/consent-policy",
            post(consent_policy_handler),
        )
        .route(
            "/api/admin/compliance/exports/cleanup",
            post(cleanup_exports_handler),
        )
        .route(
            "/api/admin/compliance/esign/integrity",
            get(esign_integrity_handler),
        )
        .route(
            "/api/admin/compliance/esign/events",
            get(esign_events_handler),
        )
        .route(
            "/api/admin/compliance/esign/documents/{id}/report",
            get(esign_document_report_handler),
        )
        .route(
            "/api/admin/compliance/esign/documents/{id}/proof",
            get(esign_signature_proof_handler),
        )
        .route(
            "/api/admin/compliance/certificates/expiring",
            get(expiring_certificates_handler),
        )
        .with_state(app_state)
}
