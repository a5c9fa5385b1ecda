// compliance-backend/src/api/handlers/compliance_handler.rs

//! 利用者向けの LGPD エンドポイント (/api/compliance)

use crate::api::dto::compliance_dto::{
    ConsentWithdrawnResponse, CookieConsentRequest, CookieConsentResponse, CookiePreferencesQuery,
    DataExportRequest, DeleteAccountRequest, GiveConsentRequest,
};
use crate::api::AppState;
use crate::domain::consent_record_model::{ConsentType, Model as ConsentModel};
use crate::domain::cookie_preference_model::Model as CookiePreferenceModel;
use crate::domain::deletion_request_model::Model as DeletionModel;
use crate::domain::export_request_model::Model as ExportModel;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::repository::consent_repository::ConsentSubject;
use crate::service::compliance_audit_service::AuditContext;
use crate::service::consent_service::{CookieConsentParams, GiveConsentParams, GiveConsentResult};
use crate::service::deletion_service::{DeletionRequestCreated, RequestDeletionParams};
use crate::service::export_service::RequestExportParams;
use crate::types::ApiResponse;
use crate::utils::error_helper::convert_validation_errors;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

fn parse_consent_type(value: &str) -> AppResult<ConsentType> {
    value
        .parse::<ConsentType>()
        .map_err(|_| AppError::BadRequest(format!("Tipo de consentimento inválido: {}", value)))
}

/// ファイルをダウンロードさせるレスポンス
fn attachment_response(contents: Vec<u8>, content_type: &'static str, file_name: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        contents,
    )
        .into_response()
}

// --- Cookie同意 (認証任意) ---

pub async fn set_cookie_consent_handler(
    State(app_state): State<AppState>,
    user: Option<AuthenticatedUser>,
    context: AuditContext,
    Json(payload): Json<CookieConsentRequest>,
) -> AppResult<ApiResponse<CookieConsentResponse>> {
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "set_cookie_consent"))?;

    let subject = match (&user, &payload.email, payload.tenant_id) {
        (Some(user), _, _) => Some((user.tenant_id(), ConsentSubject::User(user.user_id()))),
        (None, Some(email), Some(tenant_id)) => {
            Some((tenant_id, ConsentSubject::Email(email.trim().to_lowercase())))
        }
        (None, None, None) => None,
        (None, _, _) => {
            return Err(AppError::BadRequest(
                "Informe e-mail e tenantId para registrar o consentimento".to_string(),
            ))
        }
    };

    let preference = app_state
        .consent_service
        .set_cookie_consent(
            CookieConsentParams {
                session_id: payload.session_id.clone(),
                flags: payload.flags(),
                consent_version: payload.consent_version.clone(),
                subject,
            },
            &context,
        )
        .await?;

    Ok(ApiResponse::success_with_message(
        CookieConsentResponse {
            preference_id: preference.id,
            consent_version: preference.consent_version,
        },
        "Preferências de cookies salvas",
    ))
}

pub async fn get_cookie_preferences_handler(
    State(app_state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Query(query): Query<CookiePreferencesQuery>,
) -> AppResult<ApiResponse<Option<CookiePreferenceModel>>> {
    if user.is_none() && query.session_id.is_none() {
        return Err(AppError::BadRequest(
            "Informe a sessão ou autentique-se".to_string(),
        ));
    }

    let preference = app_state
        .consent_service
        .get_cookie_preferences(
            query.session_id.as_deref(),
            user.as_ref().map(|user| (user.tenant_id(), user.user_id())),
        )
        .await?;

    Ok(ApiResponse::success(preference))
}

// --- 同意 ---

pub async fn give_consent_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    context: AuditContext,
    Path(consent_type): Path<String>,
    Json(payload): Json<GiveConsentRequest>,
) -> AppResult<ApiResponse<GiveConsentResult>> {
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "give_consent"))?;
    let consent_type = parse_consent_type(&consent_type)?;

    let result = app_state
        .consent_service
        .give_consent(
            GiveConsentParams {
                tenant_id: user.tenant_id(),
                subject: ConsentSubject::User(user.user_id()),
                consent_type,
                consent_version: payload.consent_version,
                purpose: payload.purpose,
                metadata: payload.metadata,
            },
            &context,
        )
        .await?;

    let message = result.message.clone();
    Ok(ApiResponse::success_with_message(result, message))
}

pub async fn withdraw_consent_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    context: AuditContext,
    Path(consent_type): Path<String>,
) -> AppResult<ApiResponse<ConsentWithdrawnResponse>> {
    let consent_type = parse_consent_type(&consent_type)?;

    let record = app_state
        .consent_service
        .withdraw_consent(user.tenant_id(), user.user_id(), consent_type, &context)
        .await?;

    Ok(ApiResponse::success_with_message(
        ConsentWithdrawnResponse {
            consent_id: record.id,
            consent_type: consent_type.as_str().to_string(),
        },
        "Consentimento revogado",
    ))
}

pub async fn get_consents_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Vec<ConsentModel>>> {
    let consents = app_state
        .consent_service
        .get_active_consents(user.tenant_id(), user.user_id())
        .await?;

    Ok(ApiResponse::success(consents))
}

pub async fn get_consent_history_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Vec<ConsentModel>>> {
    let history = app_state
        .consent_service
        .get_consent_history(user.tenant_id(), user.user_id())
        .await?;

    Ok(ApiResponse::success(history))
}

// --- データエクスポート ---

pub async fn request_export_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    context: AuditContext,
    payload: Option<Json<DataExportRequest>>,
) -> AppResult<ApiResponse<ExportModel>> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "request_export"))?;

    let export = app_state
        .export_service
        .request_data_export(
            RequestExportParams {
                tenant_id: user.tenant_id(),
                user_id: user.user_id(),
                format: payload.format,
                include_related: payload.include_related,
            },
            &context,
        )
        .await?;

    Ok(ApiResponse::accepted(
        export,
        "Exportação solicitada. Você receberá um e-mail quando estiver pronta.",
    ))
}

pub async fn export_status_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(request_id): Path<Uuid>,
) -> AppResult<ApiResponse<ExportModel>> {
    let export = app_state
        .export_service
        .get_export_status(user.tenant_id(), user.user_id(), request_id)
        .await?;

    Ok(ApiResponse::success(export))
}

pub async fn download_export_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    context: AuditContext,
    Path(request_id): Path<Uuid>,
) -> AppResult<Response> {
    let download = app_state
        .export_service
        .download_export(user.tenant_id(), user.user_id(), request_id, &context)
        .await?;

    Ok(attachment_response(
        download.contents,
        "application/gzip",
        &download.file_name,
    ))
}

// --- アカウント削除 ---

pub async fn delete_account_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    context: AuditContext,
    payload: Option<Json<DeleteAccountRequest>>,
) -> AppResult<ApiResponse<DeletionRequestCreated>> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload
        .validate()
        .map_err(|e| convert_validation_errors(e, "delete_account"))?;

    let created = app_state
        .deletion_service
        .request_account_deletion(
            RequestDeletionParams {
                tenant_id: user.tenant_id(),
                user_id: user.user_id(),
                reason: payload.reason,
                deletion_type: payload.deletion_type,
            },
            &context,
        )
        .await?;

    let message = created.message.clone();
    Ok(ApiResponse::accepted(created, message))
}

/// トークン自体が資格情報 (認証不要)
pub async fn confirm_deletion_handler(
    State(app_state): State<AppState>,
    context: AuditContext,
    Path(token): Path<String>,
) -> AppResult<ApiResponse<DeletionModel>> {
    let request = app_state
        .deletion_service
        .confirm_account_deletion(&token, &context)
        .await?;

    Ok(ApiResponse::accepted(
        request,
        "Exclusão confirmada. O processamento foi iniciado.",
    ))
}

pub async fn deletion_status_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<ApiResponse<Option<DeletionModel>>> {
    let status = app_state
        .deletion_service
        .get_deletion_status(user.tenant_id(), user.user_id())
        .await?;

    Ok(ApiResponse::success(status))
}

pub async fn cancel_deletion_handler(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    context: AuditContext,
    Path(request_id): Path<Uuid>,
) -> AppResult<ApiResponse<DeletionModel>> {
    let request = app_state
        .deletion_service
        .cancel_deletion_request(user.tenant_id(), request_id, user.user_id(), &context)
        .await?;

    Ok(ApiResponse::success_with_message(
        request,
        "Solicitação de exclusão cancelada",
    ))
}

/// 証明書番号自体が資格情報 (認証不要)
pub async fn deletion_certificate_handler(
    State(app_state): State<AppState>,
    Path(certificate_number): Path<String>,
) -> AppResult<Response> {
    let contents = app_state
        .deletion_service
        .get_certificate(&certificate_number)
        .await?;

    Ok(attachment_response(
        contents,
        "text/plain; charset=utf-8",
        &format!("certificado-{}.txt", certificate_number),
    ))
}

pub fn compliance_router(app_state: AppState) -> Router {
    Router::new()
        // 認証任意
        .route(
            "/api/compliance/cookie-consent",
            post(set_cookie_consent_handler),
        )
        .route(
            "/api/compliance/cookie-preferences",
            get(get_cookie_preferences_handler),
        )
        // トークン・証明書番号で保護
        .route(
            "/api/compliance/confirm-deletion/{token}",
            post(confirm_deletion_handler),
        )
        .route(
            "/api/compliance/deletion-certificate/{certificate_number}",
            get(deletion_certificate_handler),
        )
        // 認証必須
        .route(
            "/api/compliance/consents/{consent_type}",
            post(give_consent_handler).delete(withdraw_consent_handler),
        )
        .route("/api/compliance/consents", get(get_consents_handler))
        .route(
            "/api/compliance/consent-history",
            get(get_consent_history_handler),
        )
        .route("/api/compliance/export-data", post(request_export_handler))
        .route(
            "/api/compliance/export-data/status/{id}",
            get(export_status_handler),
        )
        .route(
            "/api/compliance/export-data/download/{id}",
            get(download_export_handler),
        )
        .route("/api/compliance/delete-account", post(delete_account_handler))
        .route(
            "/api/compliance/deletion-status",
            get(deletion_status_handler),
        )
        .route(
            "/api/compliance/cancel-deletion/{id}",
            post(cancel_deletion_handler),
        )
        .with_state(app_state)
}
