// tests/common/app_helper.rs

use axum::Router;
use compliance_backend::{
    api::{app_router, AppState},
    config::AppConfig,
    service::job_runner::JobRunner,
    utils::{
        email::EmailService,
        jwt::{JwtConfig, JwtManager},
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::common::{self, mock_storage::MockStorageService};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-key-for-integration-tests-only";

/// テスト用アプリ一式
///
/// ジョブは遅延モードで登録されるため、`run_jobs` を呼ぶまで実行されない。
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: DatabaseConnection,
    pub storage: Arc<MockStorageService>,
    pub jwt_manager: Arc<JwtManager>,
    pub config: AppConfig,
    _database: common::db::TestDatabase,
}

impl TestApp {
    /// 登録済みのバックグラウンドジョブを実行する
    pub async fn run_jobs(&self) -> usize {
        self.state.job_runner.run_deferred().await
    }
}

pub fn test_jwt_manager() -> Arc<JwtManager> {
    Arc::new(
        JwtManager::new(JwtConfig {
            secret_key: TEST_JWT_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            issuer: "crm-auth".to_string(),
            audience: "crm-users".to_string(),
        })
        .unwrap(),
    )
}

pub async fn setup_app() -> TestApp {
    setup_app_with_config(AppConfig::for_testing()).await
}

pub async fn setup_app_with_config(config: AppConfig) -> TestApp {
    common::init_test_env();

    let database = common::db::TestDatabase::new().await;
    let storage = Arc::new(MockStorageService::new());
    let jwt_manager = test_jwt_manager();
    let job_runner = Arc::new(JobRunner::deferred(config.jobs.clone()));

    let state = AppState::build(
        database.connection.clone(),
        storage.clone(),
        Arc::new(EmailService::development()),
        jwt_manager.clone(),
        job_runner,
        &config,
    );
    let router = app_router(state.clone());

    TestApp {
        router,
        state,
        db: database.connection.clone(),
        storage,
        jwt_manager,
        config,
        _database: database,
    }
}
