// tests/integration/deletion_tests.rs

use crate::common::{
    app_helper::{setup_app, TestApp},
    auth_helper::{access_token_for, create_authenticated_request, create_request, response_json},
    test_data,
};
use axum::http::StatusCode;
use compliance_backend::domain::{
    anonymization::ANON_USER_PREFIX,
    compliance_audit_log_model,
    consent_record_model::{self, ConsentStatus},
    deletion_request_model::{self, DeletionStatus, DeletionType},
    finance_entry_model, lead_model,
    retention_policy::HARD_DELETE_ENTITIES,
    user_model,
};
use compliance_backend::service::{
    certificate_service::is_valid_certificate_number,
    compliance_audit_service::AuditContext,
    deletion_service::RequestDeletionParams,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

/// サービス経由で削除リクエストを作成し、メールで届く確認トークンを返す
async fn request_deletion(
    app: &TestApp,
    user: &user_model::Model,
    deletion_type: DeletionType,
) -> (Uuid, String) {
    let created = app
        .state
        .deletion_service
        .request_account_deletion(
            RequestDeletionParams {
                tenant_id: user.tenant_id,
                user_id: user.id,
                reason: Some("Não uso mais o serviço".to_string()),
                deletion_type,
            },
            &AuditContext::default(),
        )
        .await
        .unwrap();

    let token = created
        .confirmation_url
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    (created.request_id, token)
}

async fn confirm(app: &TestApp, token: &str) -> StatusCode {
    app.router
        .clone()
        .oneshot(create_request(
            "POST",
            &format!("/api/compliance/confirm-deletion/{}", token),
            None,
        ))
        .await
        .unwrap()
        .status()
}

async fn load_request(app: &TestApp, request_id: Uuid) -> deletion_request_model::Model {
    deletion_request_model::Entity::find_by_id(request_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_delete_account_request_is_accepted_without_exposing_token() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/delete-account",
            &token,
            Some(json!({ "reason": "Mudança de imobiliária" })),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["deletionType"], "anonymize");
    assert!(body["data"].get("confirmationUrl").is_none());

    // 重複リクエスト
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/delete-account",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            "/api/compliance/deletion-status",
            &token,
            None,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "pending");
    assert!(body["data"].get("tokenHash").is_none());
}

#[tokio::test]
async fn test_confirm_deletion_is_single_use() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let (request_id, token) = request_deletion(&app, &user, DeletionType::Anonymize).await;

    assert_eq!(confirm(&app, &token).await, StatusCode::ACCEPTED);
    assert_eq!(confirm(&app, &token).await, StatusCode::CONFLICT);

    // ジョブ実行前は confirmed のまま
    let request = load_request(&app, request_id).await;
    assert_eq!(request.status, DeletionStatus::Confirmed);
    assert!(request.confirmed_at.is_some());
}

#[tokio::test]
async fn test_confirm_with_unknown_token_is_not_found() {
    let app = setup_app().await;

    assert_eq!(confirm(&app, "token-que-nao-existe").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_anonymization_end_to_end() {
    // Arrange
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let user = test_data::create_member(&app.db, tenant_id).await;
    let lead = test_data::create_lead_for(&app.db, &user).await;
    let entry = test_data::create_finance_entry(&app.db, &user, 250_000).await;
    let token = access_token_for(&app, &user);

    app.router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/marketing",
            &token,
            Some(json!({ "consentVersion": "1.0" })),
        ))
        .await
        .unwrap();

    let (request_id, confirmation_token) =
        request_deletion(&app, &user, DeletionType::Anonymize).await;
    assert_eq!(confirm(&app, &confirmation_token).await, StatusCode::ACCEPTED);

    // Act
    let executed = app.run_jobs().await;

    // Assert
    assert_eq!(executed, 1);

    let request = load_request(&app, request_id).await;
    assert_eq!(request.status, DeletionStatus::Completed);
    assert!(request.completed_at.is_some());
    let certificate_number = request.certificate_number.clone().unwrap();
    assert!(is_valid_certificate_number(&certificate_number));

    let anonymized = user_model::Entity::find_by_id(user.id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(anonymized.name, user.name);
    assert!(anonymized.name.starts_with(ANON_USER_PREFIX));
    assert_ne!(anonymized.email, user.email);
    assert_ne!(anonymized.cpf_cnpj, user.cpf_cnpj);
    assert!(anonymized.anonymized_at.is_some());

    let anonymized_lead = lead_model::Entity::find_by_id(lead.id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(anonymized_lead.name, lead.name);
    assert_ne!(anonymized_lead.email, lead.email);
    assert_eq!(anonymized_lead.assigned_to, None);

    // 財務データは保持される
    let kept_entry = finance_entry_model::Entity::find_by_id(entry.id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept_entry.amount_cents, entry.amount_cents);
    assert_eq!(kept_entry.description, entry.description);
    assert_eq!(kept_entry.user_id, Some(user.id));

    let consents = consent_record_model::Entity::find()
        .filter(consent_record_model::Column::UserId.eq(user.id))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(consents.len(), 1);
    assert_eq!(consents[0].status, ConsentStatus::Withdrawn);

    // 証明書は番号だけで取得できる
    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "GET",
            &format!("/api/compliance/deletion-certificate/{}", certificate_number),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(&certificate_number));
    assert!(!text.contains(&user.email));

    assert!(app
        .storage
        .get(&format!("certificates/{}.txt", certificate_number))
        .is_some());
}

#[tokio::test]
async fn test_unknown_certificate_number_is_not_found() {
    let app = setup_app().await;

    for number in ["DEL-1700000000000-ABCDEF12", "../../etc/passwd"] {
        let res = app
            .router
            .clone()
            .oneshot(create_request(
                "GET",
                &format!("/api/compliance/deletion-certificate/{}", number),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn test_cancel_pending_request() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let other = test_data::create_member(&app.db, user.tenant_id).await;
    let (request_id, token) = request_deletion(&app, &user, DeletionType::Anonymize).await;
    let uri = format!("/api/compliance/cancel-deletion/{}", request_id);

    // 他のユーザーは取り消せない
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            &uri,
            &access_token_for(&app, &other),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            &uri,
            &access_token_for(&app, &user),
            None,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");

    // 取り消し後のトークンは使えない
    assert_eq!(confirm(&app, &token).await, StatusCode::CONFLICT);

    // 取り消し後は新しいリクエストを作成できる
    let (new_request_id, _) = request_deletion(&app, &user, DeletionType::Anonymize).await;
    assert_ne!(new_request_id, request_id);
}

#[tokio::test]
async fn test_confirmed_request_cannot_be_cancelled() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let (request_id, token) = request_deletion(&app, &user, DeletionType::Anonymize).await;
    assert_eq!(confirm(&app, &token).await, StatusCode::ACCEPTED);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            &format!("/api/compliance/cancel-deletion/{}", request_id),
            &access_token_for(&app, &user),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_processing_failure_reverts_to_pending_with_new_token() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let (request_id, token) = request_deletion(&app, &user, DeletionType::Anonymize).await;
    assert_eq!(confirm(&app, &token).await, StatusCode::ACCEPTED);

    app.storage.set_fail_uploads(true);
    app.run_jobs().await;

    let request = load_request(&app, request_id).await;
    assert_eq!(request.status, DeletionStatus::Pending);
    assert!(request.certificate_number.is_none());
    assert!(request
        .notes
        .as_deref()
        .unwrap_or_default()
        .starts_with("Falha no processamento"));

    // トランザクションはロールバックされている
    let unchanged = user_model::Entity::find_by_id(user.id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.name, user.name);
    assert_eq!(unchanged.email, user.email);
    assert!(unchanged.anonymized_at.is_none());

    // 古いトークンは無効化されている
    assert_eq!(confirm(&app, &token).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hard_delete_removes_user_and_keeps_financial_records() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let lead = test_data::create_lead_for(&app.db, &user).await;
    let entry = test_data::create_finance_entry(&app.db, &user, 99_900).await;

    let (request_id, token) = request_deletion(&app, &user, DeletionType::HardDelete).await;
    assert_eq!(confirm(&app, &token).await, StatusCode::ACCEPTED);
    app.run_jobs().await;

    let request = load_request(&app, request_id).await;
    assert_eq!(request.status, DeletionStatus::Completed);

    let deleted = user_model::Entity::find_by_id(user.id)
        .one(&app.db)
        .await
        .unwrap();
    assert!(deleted.is_none());

    // 顧客データは担当者リンクだけ外れる
    let kept_lead = lead_model::Entity::find_by_id(lead.id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept_lead.assigned_to, None);

    let kept_entry = finance_entry_model::Entity::find_by_id(entry.id)
        .one(&app.db)
        .await
        .unwrap();
    assert!(kept_entry.is_some());
}

#[tokio::test]
async fn test_hard_delete_only_touches_deletable_entities() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    test_data::create_lead_for(&app.db, &user).await;
    test_data::create_finance_entry(&app.db, &user, 150_000).await;
    app.router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/marketing",
            &token,
            Some(json!({ "consentVersion": "1.0" })),
        ))
        .await
        .unwrap();

    let (request_id, confirmation) = request_deletion(&app, &user, DeletionType::HardDelete).await;
    assert_eq!(confirm(&app, &confirmation).await, StatusCode::ACCEPTED);
    app.run_jobs().await;
    assert_eq!(load_request(&app, request_id).await.status, DeletionStatus::Completed);

    let completed = compliance_audit_log_model::Entity::find()
        .filter(compliance_audit_log_model::Column::Action.eq("account_deletion_completed"))
        .filter(compliance_audit_log_model::Column::UserId.eq(user.id))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    let details = completed.details.unwrap();
    let changes = details["changes"].as_array().unwrap();

    let deleted: Vec<&str> = changes
        .iter()
        .filter(|change| change["operation"] == "deleted")
        .map(|change| change["entityType"].as_str().unwrap())
        .collect();
    assert!(deleted.contains(&"user"));
    assert!(deleted.contains(&"consent"));
    for entity in &deleted {
        assert!(HARD_DELETE_ENTITIES.contains(entity), "{} must not be hard deleted", entity);
    }
    for protected in ["financeEntry", "contract", "rentalPayment", "propertySale", "auditLog"] {
        assert!(changes.iter().all(|change| change["entityType"] != protected));
    }

    let remaining_entries = finance_entry_model::Entity::find()
        .filter(finance_entry_model::Column::UserId.eq(user.id))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(remaining_entries.len(), 1);
}
