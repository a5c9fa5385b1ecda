// tests/integration/admin_tests.rs

use crate::common::{
    app_helper::{setup_app, setup_app_with_config, TestApp},
    auth_helper::{access_token_for, create_authenticated_request, create_request, response_json},
    test_data,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use compliance_backend::config::AppConfig;
use compliance_backend::domain::{
    compliance_audit_log_model,
    consent_record_model::{self, ConsentStatus},
    esign_audit_event_model::{self, EsignEventType},
};
use compliance_backend::utils::token::hmac_sha256_hex;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

async fn admin_get(app: &TestApp, token: &str, uri: &str) -> (StatusCode, Value) {
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request("GET", uri, token, None))
        .await
        .unwrap();
    response_json(res).await
}

async fn send_signed_webhook(app: &TestApp, name: &str, document_key: &str) {
    let body = serde_json::to_vec(&json!({
        "event": {
            "name": name,
            "data": { "signer": { "email": "locatario@example.com.br", "name": "Ana Lima" } },
            "occurred_at": Utc::now()
        },
        "document": { "key": document_key, "status": "running" }
    }))
    .unwrap();
    let signature = hmac_sha256_hex(b"test-clicksign-webhook-secret", &body);

    let res = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/webhooks/clicksign")
                .method("POST")
                .header("Content-Type", "application/json")
                .header("x-clicksign-signature", signature)
                .header("x-clicksign-timestamp", Utc::now().timestamp().to_string())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_routes_require_dpo_role() {
    let app = setup_app().await;
    let agent = test_data::create_member(&app.db, Uuid::new_v4()).await;

    let (status, body) = admin_get(
        &app,
        &access_token_for(&app, &agent),
        "/api/admin/compliance/data-inventory",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_type"], "forbidden");

    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "GET",
            "/api/admin/compliance/data-inventory",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_data_inventory_counts_tenant_records() {
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let dpo = test_data::create_dpo(&app.db, tenant_id).await;
    let member = test_data::create_member(&app.db, tenant_id).await;
    test_data::create_lead_for(&app.db, &member).await;
    test_data::create_finance_entry(&app.db, &member, 10_000).await;
    // 別テナントのデータは含まれない
    let outsider = test_data::create_member(&app.db, Uuid::new_v4()).await;
    test_data::create_lead_for(&app.db, &outsider).await;

    let (status, body) = admin_get(
        &app,
        &access_token_for(&app, &dpo),
        "/api/admin/compliance/data-inventory",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let entities = body["data"]["entities"].as_array().unwrap();
    let count_of = |entity: &str| {
        entities
            .iter()
            .find(|item| item["entityType"] == entity)
            .map(|item| item["recordCount"].as_u64().unwrap())
            .unwrap()
    };
    assert_eq!(count_of("user"), 2);
    assert_eq!(count_of("lead"), 1);
    assert_eq!(count_of("financeEntry"), 1);
    assert!(body["data"]["totalRecords"].as_u64().unwrap() >= 4);
}

#[tokio::test]
async fn test_risk_assessment_reflects_open_breaches() {
    let app = setup_app().await;
    let dpo = test_data::create_dpo(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &dpo);

    // プライバシーポリシーへの同意がないユーザーがいるため medium
    let (status, body) = admin_get(&app, &token, "/api/admin/compliance/risk-assessment").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["riskLevel"], "medium");
    assert_eq!(body["data"]["indicators"]["usersWithoutPrivacyConsent"], 1);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/admin/compliance/breaches",
            &token,
            Some(json!({
                "title": "Vazamento de planilha de locatários",
                "description": "Planilha enviada para destinatário incorreto",
                "severity": "critical",
                "affectedSubjects": 42,
                "dataCategories": ["nome", "cpf"]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, body) = admin_get(&app, &token, "/api/admin/compliance/risk-assessment").await;
    assert_eq!(body["data"]["riskLevel"], "high");
    assert_eq!(body["data"]["indicators"]["openBreaches"]["critical"], 1);
    assert!(!body["data"]["findings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_breach_lifecycle() {
    let app = setup_app().await;
    let dpo = test_data::create_dpo(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &dpo);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/admin/compliance/breaches",
            &token,
            Some(json!({
                "title": "Acesso indevido ao CRM",
                "description": "Credencial de corretor utilizada por terceiro",
                "severity": "high"
            })),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "open");
    let breach_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/admin/compliance/breaches/{}", breach_id);

    let update = |payload: Value| create_authenticated_request("PUT", &uri, &token, Some(payload));

    let res = app
        .router
        .clone()
        .oneshot(update(json!({ "status": "resolved", "mitigation": "Senha redefinida" })))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "resolved");
    assert!(!body["data"]["containedAt"].is_null());

    // 解決済みは再オープンしない限り変更できない
    let res = app
        .router
        .clone()
        .oneshot(update(json!({ "severity": "low" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .router
        .clone()
        .oneshot(update(json!({ "status": "open" })))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "open");

    let (status, body) = admin_get(&app, &token, "/api/admin/compliance/breaches?status=open").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_breach_validation() {
    let app = setup_app().await;
    let dpo = test_data::create_dpo(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &dpo);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/admin/compliance/breaches",
            &token,
            Some(json!({
                "title": "Incidente futuro",
                "description": "Data de detecção inválida",
                "severity": "low",
                "detectedAt": Utc::now() + Duration::days(2)
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "PUT",
            &format!("/api/admin/compliance/breaches/{}", Uuid::new_v4()),
            &token,
            Some(json!({ "severity": "low" })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_consent_policy_update_expires_old_versions() {
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let dpo = test_data::create_dpo(&app.db, tenant_id).await;
    let member = test_data::create_member(&app.db, tenant_id).await;
    let member_token = access_token_for(&app, &member);

    app.router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/privacy",
            &member_token,
            Some(json!({ "consentVersion": "1.0" })),
        ))
        .await
        .unwrap();

    let policy = json!({ "consentType": "privacy", "oldVersion": "1.0", "newVersion": "2.0" });

    // 一般ユーザーは実行できない
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/admin/compliance/consent-policy",
            &member_token,
            Some(policy.clone()),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/admin/compliance/consent-policy",
            &access_token_for(&app, &dpo),
            Some(policy),
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expiredCount"], 1);

    let record = consent_record_model::Entity::find()
        .filter(consent_record_model::Column::UserId.eq(member.id))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ConsentStatus::Expired);

    // 失効後は新しいバージョンで再取得できる
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/privacy",
            &member_token,
            Some(json!({ "consentVersion": "2.0" })),
        ))
        .await
        .unwrap();
    let (_, body) = response_json(res).await;
    assert_eq!(body["data"]["outcome"], "created");

    let logs = compliance_audit_log_model::Entity::find()
        .filter(compliance_audit_log_model::Column::Action.eq("consent_policy_updated"))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tenant_id, tenant_id);
}

#[tokio::test]
async fn test_audit_logs_and_report() {
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let dpo = test_data::create_dpo(&app.db, tenant_id).await;
    let member = test_data::create_member(&app.db, tenant_id).await;
    let member_token = access_token_for(&app, &member);
    let dpo_token = access_token_for(&app, &dpo);

    for consent_type in ["marketing", "newsletter"] {
        app.router
            .clone()
            .oneshot(create_authenticated_request(
                "POST",
                &format!("/api/compliance/consents/{}", consent_type),
                &member_token,
                Some(json!({ "consentVersion": "1.0" })),
            ))
            .await
            .unwrap();
    }

    let (status, body) = admin_get(
        &app,
        &dpo_token,
        "/api/admin/compliance/audit-logs?action=consent_given",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["ipAddress"], "203.0.113.10");

    // 利用者の履歴を閲覧すると、その閲覧自体が記録される
    let (status, body) = admin_get(
        &app,
        &dpo_token,
        &format!("/api/admin/compliance/audit-logs?userId={}", member.id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().len() >= 2);

    let access_logs = compliance_audit_log_model::Entity::find()
        .filter(compliance_audit_log_model::Column::Action.eq("data_access"))
        .filter(compliance_audit_log_model::Column::ActorId.eq(dpo.id))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(access_logs.len(), 1);

    let start = (Utc::now() - Duration::days(1)).format("%Y-%m-%dT%H:%M:%SZ");
    let end = (Utc::now() + Duration::days(1)).format("%Y-%m-%dT%H:%M:%SZ");
    let (status, body) = admin_get(
        &app,
        &dpo_token,
        &format!(
            "/api/admin/compliance/audit-report?startDate={}&endDate={}",
            start, end
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["totalEvents"].as_u64().unwrap() >= 2);
    assert_eq!(body["data"]["byAction"]["consent_given"], 2);
    assert_eq!(body["data"]["truncated"], false);

    // 開始日が終了日より後
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            &format!(
                "/api/admin/compliance/audit-report?startDate={}&endDate={}",
                end, start
            ),
            &dpo_token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_esign_integrity_detects_tampering() {
    let app = setup_app().await;
    let dpo = test_data::create_dpo(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &dpo);
    test_data::create_contract(&app.db, dpo.tenant_id, "doc-integrity").await;

    send_signed_webhook(&app, "upload", "doc-integrity").await;
    send_signed_webhook(&app, "sign", "doc-integrity").await;

    let uri = "/api/admin/compliance/esign/integrity?documentId=doc-integrity";
    let (status, body) = admin_get(&app, &token, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalEvents"], 2);
    assert_eq!(body["data"]["isIntact"], true);

    let (status, body) = admin_get(
        &app,
        &token,
        "/api/admin/compliance/esign/documents/doc-integrity/proof",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["integrityVerified"], true);
    assert_eq!(body["data"]["signatures"][0]["signatureValid"], true);
    assert_eq!(body["data"]["signatures"][0]["email"], "locatario@example.com.br");

    // 記録後にメタデータを書き換える
    let event = esign_audit_event_model::Entity::find()
        .filter(esign_audit_event_model::Column::EntityId.eq("doc-integrity"))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active = event.into_active_model();
    active.metadata = Set(json!({ "signerEmail": "intruso@example.com" }));
    active.update(&app.db).await.unwrap();

    let (status, body) = admin_get(&app, &token, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isIntact"], false);
    assert_eq!(body["data"]["tamperedEvents"].as_array().unwrap().len(), 1);

    let (status, body) = admin_get(
        &app,
        &token,
        "/api/admin/compliance/esign/documents/doc-integrity/report",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["events"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["integrity"]["isIntact"], false);
    assert_eq!(body["data"]["contract"]["status"], "running");

    // レポートの閲覧自体が証跡に残る
    let viewed = esign_audit_event_model::Entity::find()
        .filter(esign_audit_event_model::Column::EntityId.eq("doc-integrity"))
        .filter(esign_audit_event_model::Column::EventType.eq(EsignEventType::DocumentViewed))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(viewed.len(), 1);
    assert_eq!(viewed[0].user_id, Some(dpo.id));
}

#[tokio::test]
async fn test_esign_data_is_tenant_scoped() {
    let app = setup_app().await;
    let owner_tenant = Uuid::new_v4();
    test_data::create_contract(&app.db, owner_tenant, "doc-scoped").await;
    send_signed_webhook(&app, "upload", "doc-scoped").await;

    let other_dpo = test_data::create_dpo(&app.db, Uuid::new_v4()).await;
    let (status, _) = admin_get(
        &app,
        &access_token_for(&app, &other_dpo),
        "/api/admin/compliance/esign/documents/doc-scoped/report",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expiring_certificates_within_window() {
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let dpo = test_data::create_dpo(&app.db, tenant_id).await;
    let member = test_data::create_member(&app.db, tenant_id).await;
    let expiring = test_data::create_certificate(&app.db, &member, 10).await;
    test_data::create_certificate(&app.db, &member, 120).await;

    let (status, body) = admin_get(
        &app,
        &access_token_for(&app, &dpo),
        "/api/admin/compliance/certificates/expiring",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let certificates = body["data"].as_array().unwrap();
    assert_eq!(certificates.len(), 1);
    assert_eq!(
        certificates[0]["certificate"]["id"],
        expiring.id.to_string()
    );
    assert_eq!(certificates[0]["validation"]["expiringSoon"], true);
}

#[tokio::test]
async fn test_deletion_requests_listing() {
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let dpo = test_data::create_dpo(&app.db, tenant_id).await;
    let member = test_data::create_member(&app.db, tenant_id).await;

    app.router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/delete-account",
            &access_token_for(&app, &member),
            None,
        ))
        .await
        .unwrap();

    let token = access_token_for(&app, &dpo);
    let (status, body) = admin_get(
        &app,
        &token,
        "/api/admin/compliance/deletion-requests?status=pending",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["userId"], member.id.to_string());

    let (_, body) = admin_get(
        &app,
        &token,
        "/api/admin/compliance/deletion-requests?status=completed",
    )
    .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_rate_limit() {
    let mut config = AppConfig::for_testing();
    config.compliance.admin_rate_limit_per_minute = 2;
    let app = setup_app_with_config(config).await;
    let dpo = test_data::create_dpo(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &dpo);

    for _ in 0..2 {
        let (status, _) = admin_get(&app, &token, "/api/admin/compliance/consent-statistics").await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = admin_get(&app, &token, "/api/admin/compliance/consent-statistics").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["success"], false);

    // 利用者向けAPIは対象外
    let (status, _) = admin_get(&app, &token, "/api/compliance/consents").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_request("GET", "/health", None))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], true);
    assert_eq!(body["data"]["environment"], "test");
}
