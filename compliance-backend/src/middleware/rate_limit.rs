// compliance-backend/src/middleware/rate_limit.rs

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    middleware::auth::{extract_client_ip, AuthenticatedUser},
};

/// レート制限の設定
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_duration: Duration,
    pub max_requests: usize,
}

impl RateLimitConfig {
    /// 1分あたりの上限
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            window_duration: Duration::from_secs(60),
            max_requests: max_requests as usize,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(100)
    }
}

/// キーごとの固定ウィンドウ
#[derive(Clone, Debug)]
struct WindowState {
    count: usize,
    window_start: Instant,
}

/// レート制限のストレージ
#[derive(Clone)]
pub struct RateLimitStorage {
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
    config: RateLimitConfig,
}

impl RateLimitStorage {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// 1リクエスト分を消費する。上限超過なら false
    pub async fn check_and_increment(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;

        // 期限切れのウィンドウは定期的に掃除する
        if windows.len() > 10_000 {
            let window_duration = self.config.window_duration;
            windows.retain(|_, state| now.duration_since(state.window_start) < window_duration);
        }

        let state = windows.entry(key.to_string()).or_insert_with(|| WindowState {
            count: 0,
            window_start: now,
        });

        // ウィンドウが終了している場合はリセット
        if now.duration_since(state.window_start) >= self.config.window_duration {
            state.count = 0;
            state.window_start = now;
        }

        if state.count >= self.config.max_requests {
            return false;
        }

        state.count += 1;
        true
    }
}

/// テナント単位 (トークンが有効な場合) またはIP単位のキー
pub fn rate_limit_key(user: Option<&AuthenticatedUser>, headers: &HeaderMap) -> String {
    match user {
        Some(user) => format!("tenant:{}", user.tenant_id()),
        None => format!(
            "ip:{}",
            extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string())
        ),
    }
}

/// レート制限ミドルウェア
pub async fn rate_limit_middleware(
    State(storage): State<RateLimitStorage>,
    user: Option<AuthenticatedUser>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let key = rate_limit_key(user.as_ref(), request.headers());

    if !storage.check_and_increment(&key, Instant::now()).await {
        tracing::warn!(
            key = %key,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        return Err(AppError::TooManyRequests(
            "Limite de requisições excedido. Tente novamente em instantes.".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::jwt::PrincipalClaims;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_window_limits_and_resets() {
        let storage = RateLimitStorage::new(RateLimitConfig {
            window_duration: Duration::from_secs(60),
            max_requests: 2,
        });
        let start = Instant::now();

        assert!(storage.check_and_increment("tenant:a", start).await);
        assert!(storage.check_and_increment("tenant:a", start).await);
        assert!(!storage.check_and_increment("tenant:a", start).await);

        // 別のキーは独立してカウントされる
        assert!(storage.check_and_increment("tenant:b", start).await);

        // 次のウィンドウでリセット
        let later = start + Duration::from_secs(61);
        assert!(storage.check_and_increment("tenant:a", later).await);
    }

    #[test]
    fn test_rate_limit_key() {
        let tenant_id = Uuid::new_v4();
        let user = AuthenticatedUser::new(PrincipalClaims {
            user_id: Uuid::new_v4(),
            tenant_id,
            role: "admin".to_string(),
            email: "admin@example.com".to_string(),
        });
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", "198.51.100.7".parse().unwrap());

        assert_eq!(rate_limit_key(Some(&user), &headers), format!("tenant:{}", tenant_id));
        assert_eq!(rate_limit_key(None, &headers), "ip:198.51.100.7");
        assert_eq!(rate_limit_key(None, &HeaderMap::new()), "ip:unknown");
    }
}
