// tests/common/auth_helper.rs

use axum::{
    body::{self, Body},
    http::{Request, Response, StatusCode},
};
use compliance_backend::domain::user_model::Model as UserModel;
use compliance_backend::utils::jwt::PrincipalClaims;
use serde_json::Value;

use crate::common::app_helper::TestApp;

/// ユーザーのアクセストークンを発行する
pub fn access_token_for(app: &TestApp, user: &UserModel) -> String {
    app.jwt_manager
        .generate_access_token(&PrincipalClaims {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role: user.role.clone(),
            email: user.email.clone(),
        })
        .unwrap()
}

/// 認証ヘッダー付きリクエストを作成
pub fn create_authenticated_request(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Authorization", format!("Bearer {}", token))
        .header("x-forwarded-for", "203.0.113.10")
        .header("User-Agent", "integration-test");

    with_json_body(builder, body)
}

/// 認証なしリクエストを作成
pub fn create_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("x-forwarded-for", "203.0.113.20");

    with_json_body(builder, body)
}

fn with_json_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// レスポンスボディをJSONとして読み取る
pub async fn response_json(res: Response<Body>) -> (StatusCode, Value) {
    let status = res.status();
    let body = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}
