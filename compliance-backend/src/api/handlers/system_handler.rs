// compliance-backend/src/api/handlers/system_handler.rs

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{api::AppState, types::ApiResponse};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub database: bool,
    pub environment: String,
    pub pending_jobs: usize,
}

/// DB接続と待機中ジョブ数を返す (DBに接続できない場合は503)
pub async fn health_handler(
    State(app_state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let database = app_state.db.ping().await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        tracing::error!("Health check failed: database unreachable");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthResponse {
            status: if database { "ok" } else { "degraded" }.to_string(),
            database,
            environment: app_state.config.environment.clone(),
            pending_jobs: app_state.job_runner.pending_count(),
        })),
    )
}

pub fn system_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(app_state)
}
