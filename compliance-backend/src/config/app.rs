// compliance-backend/src/config/app.rs

use crate::utils::transaction::RetryConfig;
use std::env;

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub cookie_secure: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub body_limit: usize,
    pub request_timeout_secs: u64,
}

/// LGPD関連の設定
#[derive(Clone, Debug)]
pub struct ComplianceConfig {
    /// 削除確認リンクなど、利用者向けページのベースURL
    pub frontend_url: String,
    /// 証明書URLなど、APIの公開ベースURL
    pub public_api_url: String,
    pub export_ttl_days: i64,
    pub admin_rate_limit_per_minute: u32,
    /// 未設定の場合、Webhookは常に401で拒否する
    pub clicksign_webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub webhook_max_future_skew_secs: i64,
    /// 電子署名監査イベントのHMAC鍵
    pub audit_signing_key: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub database_url: String,
    pub security: SecurityConfig,
    pub server: ServerConfig,
    pub compliance: ComplianceConfig,
    pub jobs: RetryConfig,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| format!("Invalid {} value", key)),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok(); // .env ファイルを読み込む (存在しなくてもエラーにしない)

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let is_production = environment == "production";

        let audit_signing_key = env::var("AUDIT_SIGNING_KEY")
            .map_err(|_| "AUDIT_SIGNING_KEY must be set")?;
        if audit_signing_key.len() < 32 {
            return Err("AUDIT_SIGNING_KEY must be at least 32 characters".to_string());
        }

        let clicksign_webhook_secret = env::var("CLICKSIGN_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty());
        if clicksign_webhook_secret.is_none() {
            tracing::warn!("CLICKSIGN_WEBHOOK_SECRET is not set; signature webhooks will be rejected");
        }

        Ok(Self {
            environment,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PORT", 5000)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3001".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            database_url: env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            security: SecurityConfig {
                cookie_secure: is_production,
            },
            server: ServerConfig {
                body_limit: 10 * 1024 * 1024, // 10MB
                request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30)?,
            },
            compliance: ComplianceConfig {
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3001".to_string()),
                public_api_url: env::var("PUBLIC_API_URL")
                    .unwrap_or_else(|_| "http://localhost:5000".to_string()),
                export_ttl_days: parse_env("EXPORT_TTL_DAYS", 7)?,
                admin_rate_limit_per_minute: parse_env("ADMIN_RATE_LIMIT_PER_MINUTE", 100)?,
                clicksign_webhook_secret,
                webhook_tolerance_secs: 300,
                webhook_max_future_skew_secs: 30,
                audit_signing_key,
            },
            jobs: RetryConfig {
                max_attempts: parse_env("JOB_MAX_ATTEMPTS", 3)?,
                base_delay_ms: parse_env("JOB_BASE_DELAY_MS", 100)?,
                max_delay_ms: parse_env("JOB_MAX_DELAY_MS", 1000)?,
            },
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// テスト用の設定を作成 (環境変数は参照しない)
    pub fn for_testing() -> Self {
        Self {
            environment: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_allowed_origins: vec!["http://localhost:3001".to_string()],
            database_url: "sqlite::memory:".to_string(),
            security: SecurityConfig {
                cookie_secure: false,
            },
            server: ServerConfig {
                body_limit: 10 * 1024 * 1024,
                request_timeout_secs: 30,
            },
            compliance: ComplianceConfig {
                frontend_url: "http://localhost:3001".to_string(),
                public_api_url: "http://localhost:5000".to_string(),
                export_ttl_days: 7,
                admin_rate_limit_per_minute: 100,
                clicksign_webhook_secret: Some("test-clicksign-webhook-secret".to_string()),
                webhook_tolerance_secs: 300,
                webhook_max_future_skew_secs: 30,
                audit_signing_key: "test-audit-signing-key-that-is-long-enough".to_string(),
            },
            jobs: RetryConfig {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
        }
    }
}
