// src/main.rs
use std::sync::Arc;
use tokio::net::TcpListener;

use compliance_backend::api::{app_router, AppState};
use compliance_backend::config::AppConfig;
use compliance_backend::db::create_db_pool;
use compliance_backend::logging::init_tracing;
use compliance_backend::service::job_runner::JobRunner;
use compliance_backend::service::storage_service::{create_storage_service, StorageConfig};
use compliance_backend::utils::{email::EmailService, jwt::JwtManager};
use migration::{Migrator, MigratorTrait};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // トレーシングの設定
    init_tracing();

    tracing::info!("Starting LGPD compliance backend...");

    // 設定を読み込む
    let app_config = AppConfig::from_env().expect("Failed to load configuration");
    tracing::info!(
        environment = %app_config.environment,
        addr = %app_config.server_addr(),
        "Configuration loaded"
    );

    // データベース接続を作成
    let db_pool = create_db_pool(&app_config)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created successfully.");

    Migrator::up(&db_pool, None)
        .await
        .expect("Failed to run database migrations");

    // 外部サービス
    let storage = create_storage_service(&StorageConfig::from_env())
        .await
        .expect("Failed to initialize storage");
    let email_service = match EmailService::from_env() {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::warn!(error = %e, "Email configuration invalid, falling back to development mode");
            Arc::new(EmailService::development())
        }
    };
    let jwt_manager = Arc::new(JwtManager::from_env().expect("Failed to initialize JWT manager"));
    let job_runner = Arc::new(JobRunner::new(app_config.jobs.clone()));

    let app_state = AppState::build(
        db_pool,
        storage,
        email_service,
        jwt_manager,
        job_runner.clone(),
        &app_config,
    );

    // 再起動で中断された削除処理を再開
    match app_state.deletion_service.resume_interrupted().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "Resumed interrupted deletion requests"),
        Err(e) => tracing::error!(error = %e, "Failed to resume interrupted deletions"),
    }

    // ルーターの設定
    let app = app_router(app_state);

    // サーバーの起動
    tracing::info!(
        "Router configured. Server listening on {}",
        app_config.server_addr()
    );

    let listener = TcpListener::bind(app_config.server_addr()).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 実行中のバックグラウンドジョブを待つ
    job_runner.wait_idle().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
