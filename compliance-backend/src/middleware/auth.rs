// compliance-backend/src/middleware/auth.rs

use crate::error::AppError;
use crate::service::compliance_audit_service::AuditContext;
use crate::utils::jwt::{JwtManager, PrincipalClaims};
use axum::{
    extract::{OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// DPOツールにアクセスできるロール
const ADMIN_ROLES: &[&str] = &["admin", "dpo"];

/// JWT認証ミドルウェアの設定
#[derive(Clone)]
pub struct AuthMiddlewareConfig {
    pub jwt_manager: Arc<JwtManager>,
    pub access_token_cookie_name: String,
}

impl AuthMiddlewareConfig {
    pub fn new(jwt_manager: Arc<JwtManager>) -> Self {
        Self {
            jwt_manager,
            access_token_cookie_name: ACCESS_TOKEN_COOKIE.to_string(),
        }
    }
}

/// 認証済みユーザー情報を格納するエクステンション
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: PrincipalClaims,
}

impl AuthenticatedUser {
    pub fn new(claims: PrincipalClaims) -> Self {
        Self { claims }
    }

    pub fn user_id(&self) -> Uuid {
        self.claims.user_id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.claims.tenant_id
    }

    pub fn role(&self) -> &str {
        &self.claims.role
    }

    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.contains(&self.claims.role.as_str())
    }
}

/// 管理者 (admin / dpo) であることが確認済みのユーザー
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl AdminUser {
    pub fn user_id(&self) -> Uuid {
        self.0.user_id()
    }

    pub fn tenant_id(&self) -> Uuid {
        self.0.tenant_id()
    }
}

/// トークンがあれば検証してエクステンションに追加する
///
/// 無効なトークンは未認証として扱い、認証必須のルートではエクストラクタが401を返す
pub async fn jwt_auth_middleware(
    State(config): State<AuthMiddlewareConfig>,
    headers: HeaderMap,
    cookie_jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(&headers, &cookie_jar, &config.access_token_cookie_name) {
        match config
            .jwt_manager
            .verify_access_token(&token)
            .and_then(|claims| claims.principal())
        {
            Ok(principal) => {
                debug!(
                    user_id = %principal.user_id,
                    tenant_id = %principal.tenant_id,
                    role = %principal.role,
                    path = %request.uri().path(),
                    "Authenticated request"
                );
                request
                    .extensions_mut()
                    .insert(AuthenticatedUser::new(principal));
            }
            Err(e) => {
                warn!(path = %request.uri().path(), error = %e, "Invalid access token");
            }
        }
    }

    next.run(request).await
}

fn extract_token(headers: &HeaderMap, cookie_jar: &CookieJar, cookie_name: &str) -> Option<String> {
    // Authorization ヘッダーからトークンを取得
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|auth_str| auth_str.strip_prefix("Bearer ").map(|s| s.trim().to_string()))
        .filter(|token| !token.is_empty());

    // Cookieからトークンを取得（フォールバック）
    let cookie_token = cookie_jar
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string());

    auth_header.or(cookie_token)
}

/// クライアントIPを抽出
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    // X-Forwarded-For ヘッダーをチェック（プロキシ経由の場合）
    if let Some(forwarded_for) = headers.get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded_for.to_str() {
            // 最初のIPアドレスを取得
            return forwarded_str
                .split(',')
                .next()
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty());
        }
    }

    // X-Real-IP ヘッダーをチェック
    if let Some(real_ip) = headers.get("X-Real-IP") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    None
}

/// 監査ログ用のリクエスト情報
pub fn audit_context(parts: &Parts) -> AuditContext {
    AuditContext {
        ip_address: extract_client_ip(&parts.headers),
        user_agent: parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string()),
        request_method: Some(parts.method.to_string()),
        request_path: Some(parts.uri.path().to_string()),
    }
}

// --- Axum Extractors ---

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Autenticação necessária".to_string()))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

impl<S> axum::extract::FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user =
            <AuthenticatedUser as axum::extract::FromRequestParts<S>>::from_request_parts(parts, state)
                .await?;

        if !user.is_admin() {
            warn!(
                user_id = %user.user_id(),
                role = %user.role(),
                path = %parts.uri.path(),
                "Access denied: Admin permission required"
            );
            return Err(AppError::Forbidden(
                "Acesso restrito ao encarregado de dados".to_string(),
            ));
        }

        Ok(AdminUser(user))
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuditContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(audit_context(parts))
    }
}
