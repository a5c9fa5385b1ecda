// compliance-backend/src/api/mod.rs
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::logging::{inject_request_context, logging_middleware};
use crate::middleware::auth::{jwt_auth_middleware, AuthMiddlewareConfig};
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitStorage};
use crate::repository::{
    compliance_audit_log_repository::ComplianceAuditLogRepository,
    consent_repository::ConsentRepository, crm_repository::CrmRepository,
    data_breach_repository::DataBreachRepository,
    deletion_request_repository::DeletionRequestRepository, esign_repository::EsignRepository,
    export_request_repository::ExportRequestRepository, user_repository::UserRepository,
};
use crate::service::{
    certificate_service::CertificateService, compliance_audit_service::ComplianceAuditService,
    consent_service::ConsentService, deletion_service::DeletionService, dpo_service::DpoService,
    esign_audit_service::EsignAuditService, export_service::ExportService, job_runner::JobRunner,
    storage_service::StorageService, webhook_service::WebhookService,
};
use crate::utils::{email::EmailService, jwt::JwtManager};
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

pub mod dto;
pub mod handlers;

use handlers::{
    admin_compliance_handler::admin_compliance_router, compliance_handler::compliance_router,
    system_handler::system_router, webhook_handler::webhook_router,
};

/// 統一されたアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub consent_service: Arc<ConsentService>,
    pub deletion_service: Arc<DeletionService>,
    pub export_service: Arc<ExportService>,
    pub audit_service: Arc<ComplianceAuditService>,
    pub dpo_service: Arc<DpoService>,
    pub esign_audit_service: Arc<EsignAuditService>,
    pub webhook_service: Arc<WebhookService>,
    pub job_runner: Arc<JobRunner>,
    pub jwt_manager: Arc<JwtManager>,
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// リポジトリとサービスを組み立てる
    pub fn build(
        db: DbPool,
        storage: Arc<dyn StorageService>,
        email_service: Arc<EmailService>,
        jwt_manager: Arc<JwtManager>,
        job_runner: Arc<JobRunner>,
        config: &AppConfig,
    ) -> Self {
        let compliance = &config.compliance;

        // リポジトリ
        let audit_log_repo = Arc::new(ComplianceAuditLogRepository::new(db.clone()));
        let consent_repo = Arc::new(ConsentRepository::new(db.clone()));
        let crm_repo = Arc::new(CrmRepository::new(db.clone()));
        let breach_repo = Arc::new(DataBreachRepository::new(db.clone()));
        let deletion_repo = Arc::new(DeletionRequestRepository::new(db.clone()));
        let esign_repo = Arc::new(EsignRepository::new(db.clone()));
        let export_repo = Arc::new(ExportRequestRepository::new(db.clone()));
        let user_repo = Arc::new(UserRepository::new(db.clone()));

        // サービス
        let audit_service = Arc::new(ComplianceAuditService::new(audit_log_repo));
        let consent_service = Arc::new(ConsentService::new(
            consent_repo.clone(),
            audit_service.clone(),
        ));
        let certificate_service = Arc::new(CertificateService::new(
            storage.clone(),
            compliance.public_api_url.clone(),
        ));
        let deletion_service = Arc::new(DeletionService::new(
            db.clone(),
            deletion_repo.clone(),
            user_repo.clone(),
            audit_service.clone(),
            certificate_service,
            email_service.clone(),
            job_runner.clone(),
            compliance.frontend_url.clone(),
        ));
        let export_service = Arc::new(ExportService::new(
            export_repo.clone(),
            user_repo.clone(),
            consent_repo.clone(),
            crm_repo.clone(),
            audit_service.clone(),
            storage.clone(),
            email_service,
            job_runner.clone(),
            compliance.export_ttl_days,
        ));
        let dpo_service = Arc::new(DpoService::new(
            user_repo,
            crm_repo,
            consent_repo,
            deletion_repo,
            export_repo,
            breach_repo,
            audit_service.clone(),
        ));
        let esign_audit_service = Arc::new(EsignAuditService::new(
            esign_repo.clone(),
            storage,
            &compliance.audit_signing_key,
        ));
        let webhook_service = Arc::new(WebhookService::new(
            db.clone(),
            esign_repo,
            esign_audit_service.clone(),
            compliance.clicksign_webhook_secret.clone(),
            compliance.webhook_tolerance_secs,
            compliance.webhook_max_future_skew_secs,
        ));

        Self {
            consent_service,
            deletion_service,
            export_service,
            audit_service,
            dpo_service,
            esign_audit_service,
            webhook_service,
            job_runner,
            jwt_manager,
            db: Arc::new(db),
            config: Arc::new(config.clone()),
        }
    }
}

/// CORS設定 (CORS_ALLOWED_ORIGINS のオリジンのみ許可)
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true) // Cookie送信を許可
        .max_age(Duration::from_secs(3600))
}

/// 全ルーターを統合し、共通のミドルウェアを適用する
pub fn app_router(app_state: AppState) -> Router {
    let config = app_state.config.clone();

    // 管理者APIのみレート制限 (テナント単位、未認証はIP単位)
    let admin_rate_limit = RateLimitStorage::new(RateLimitConfig::per_minute(
        config.compliance.admin_rate_limit_per_minute,
    ));
    let admin_routes = admin_compliance_router(app_state.clone()).layer(
        axum_middleware::from_fn_with_state(admin_rate_limit, rate_limit_middleware),
    );

    let auth_config = AuthMiddlewareConfig::new(app_state.jwt_manager.clone());

    Router::new()
        .merge(compliance_router(app_state.clone()))
        .merge(admin_routes)
        .merge(webhook_router(app_state.clone()))
        .merge(system_router(app_state))
        // 後に追加したレイヤーほど外側で実行される
        .layer(axum_middleware::from_fn_with_state(
            auth_config,
            jwt_auth_middleware,
        ))
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(axum_middleware::from_fn(inject_request_context))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config))
        .layer(RequestBodyLimitLayer::new(config.server.body_limit))
}
