// compliance-backend/src/api/handlers/webhook_handler.rs

use crate::api::AppState;
use crate::error::AppResult;
use crate::service::compliance_audit_service::AuditContext;
use crate::service::webhook_service::{WebhookOutcome, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// 署名検証は生のペイロードに対して行うため、JSONへの変換はサービス側で行う
pub async fn clicksign_webhook_handler(
    State(app_state): State<AppState>,
    context: AuditContext,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookOutcome>> {
    let outcome = app_state
        .webhook_service
        .handle_webhook(
            &body,
            header_str(&headers, SIGNATURE_HEADER),
            header_str(&headers, TIMESTAMP_HEADER),
            &context,
        )
        .await?;

    Ok(Json(outcome))
}

pub fn webhook_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/webhooks/clicksign", post(clicksign_webhook_handler))
        .with_state(app_state)
}
