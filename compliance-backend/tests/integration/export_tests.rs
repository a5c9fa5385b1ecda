// tests/integration/export_tests.rs

use crate::common::{
    app_helper::{setup_app, TestApp},
    auth_helper::{access_token_for, create_authenticated_request, response_json},
    test_data,
};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use compliance_backend::domain::export_request_model::{self, ExportStatus};
use compliance_backend::utils::archive::read_tar_gz;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, IntoActiveModel};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn request_export(app: &TestApp, token: &str, body: Option<Value>) -> Uuid {
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/export-data",
            token,
            body,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "pending");

    body["data"]["id"].as_str().unwrap().parse().unwrap()
}

async fn download(app: &TestApp, token: &str, request_id: Uuid) -> axum::response::Response {
    app.router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            &format!("/api/compliance/export-data/download/{}", request_id),
            token,
            None,
        ))
        .await
        .unwrap()
}

async fn expire_now(app: &TestApp, request_id: Uuid) {
    let request = export_request_model::Entity::find_by_id(request_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active = request.into_active_model();
    active.expires_at = Set(Utc::now() - Duration::hours(1));
    active.update(&app.db).await.unwrap();
}

#[tokio::test]
async fn test_export_is_downloadable_after_processing() {
    // Arrange
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    let request_id = request_export(&app, &token, None).await;

    // ジョブ実行前はダウンロードできない
    let res = download(&app, &token, request_id).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Act
    app.run_jobs().await;

    // Assert
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            &format!("/api/compliance/export-data/status/{}", request_id),
            &token,
            None,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"].get("fileUrl").is_none());

    let res = download(&app, &token, request_id).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/gzip"
    );
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();

    let entries = read_tar_gz(&bytes).unwrap();
    let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
    assert!(names.contains(&"dados.json"));
    assert!(names.contains(&"LEIA-ME.txt"));

    let data = entries
        .iter()
        .find(|entry| entry.name == "dados.json")
        .unwrap();
    let document: Value = serde_json::from_slice(&data.contents).unwrap();
    assert_eq!(document["usuario"]["email"], user.email.as_str());
    assert!(document["usuario"].get("passwordHash").is_none());
    assert!(document.get("consentimentos").is_some());

    let stored = export_request_model::Entity::find_by_id(request_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.download_count, 1);
    assert!(stored.downloaded_at.is_some());
}

#[tokio::test]
async fn test_export_without_related_data() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    let request_id = request_export(
        &app,
        &token,
        Some(json!({ "format": "csv", "includeRelated": false })),
    )
    .await;
    app.run_jobs().await;

    let res = download(&app, &token, request_id).await;
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();

    let entries = read_tar_gz(&bytes).unwrap();
    let data = entries
        .iter()
        .find(|entry| entry.name == "dados.csv")
        .unwrap();
    let csv = String::from_utf8(data.contents.clone()).unwrap();
    assert!(csv.contains(&user.email));
    assert!(!csv.contains("consentimentos"));
}

#[tokio::test]
async fn test_other_user_cannot_read_export() {
    let app = setup_app().await;
    let owner = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let other = test_data::create_member(&app.db, owner.tenant_id).await;
    let request_id = request_export(&app, &access_token_for(&app, &owner), None).await;
    app.run_jobs().await;

    let other_token = access_token_for(&app, &other);
    let res = download(&app, &other_token, request_id).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // 別テナントからは存在自体が見えない
    let stranger = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let res = download(&app, &access_token_for(&app, &stranger), request_id).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_export_is_gone() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    let request_id = request_export(&app, &token, None).await;
    app.run_jobs().await;

    expire_now(&app, request_id).await;

    let res = download(&app, &token, request_id).await;
    assert_eq!(res.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let dpo = test_data::create_dpo(&app.db, user.tenant_id).await;
    let request_id = request_export(&app, &access_token_for(&app, &user), None).await;
    app.run_jobs().await;
    expire_now(&app, request_id).await;

    let prefix = format!("exports/{}/", user.tenant_id);
    assert_eq!(app.storage.keys_with_prefix(&prefix).len(), 1);

    let dpo_token = access_token_for(&app, &dpo);
    let cleanup = || {
        create_authenticated_request(
            "POST",
            "/api/admin/compliance/exports/cleanup",
            &dpo_token,
            None,
        )
    };

    let res = app.router.clone().oneshot(cleanup()).await.unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired"], 1);
    assert!(app.storage.keys_with_prefix(&prefix).is_empty());

    let res = app.router.clone().oneshot(cleanup()).await.unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["scanned"], 0);
    assert_eq!(body["data"]["expired"], 0);

    let stored = export_request_model::Entity::find_by_id(request_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExportStatus::Failed);
    assert!(stored.file_url.is_none());
    assert_eq!(stored.error_message.as_deref(), Some("Export expired"));
}

#[tokio::test]
async fn test_failed_upload_marks_export_failed() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    let request_id = request_export(&app, &token, None).await;

    app.storage.set_fail_uploads(true);
    app.run_jobs().await;

    let stored = export_request_model::Entity::find_by_id(request_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ExportStatus::Failed);
    assert!(stored.error_message.is_some());

    let res = download(&app, &token, request_id).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
