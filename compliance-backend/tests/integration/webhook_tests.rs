// tests/integration/webhook_tests.rs

use crate::common::{
    app_helper::{setup_app, TestApp},
    auth_helper::response_json,
    test_data,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use compliance_backend::domain::{
    contract_signer_model::{self, SignerStatus},
    esign_audit_event_model::{self, EsignEventType},
    signature_contract_model::{self, ContractStatus},
};
use compliance_backend::utils::token::hmac_sha256_hex;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "test-clicksign-webhook-secret";

fn event_payload(name: &str, document_key: &str) -> Vec<u8> {
    let payload = json!({
        "event": {
            "name": name,
            "data": {
                "signer": {
                    "key": "signer-key-1",
                    "email": "Joao.Souza@example.com.br",
                    "name": "João Souza"
                }
            },
            "occurred_at": Utc::now()
        },
        "document": {
            "key": document_key,
            "filename": "contrato-locacao.pdf",
            "status": "running"
        }
    });
    serde_json::to_vec(&payload).unwrap()
}

fn webhook_request(body: Vec<u8>, signature: Option<String>, timestamp: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/api/webhooks/clicksign")
        .method("POST")
        .header("Content-Type", "application/json")
        .header("x-forwarded-for", "198.51.100.7");
    if let Some(signature) = signature {
        builder = builder.header("x-clicksign-signature", signature);
    }
    if let Some(timestamp) = timestamp {
        builder = builder.header("x-clicksign-timestamp", timestamp.to_string());
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed_request(body: Vec<u8>) -> Request<Body> {
    let signature = hmac_sha256_hex(WEBHOOK_SECRET.as_bytes(), &body);
    webhook_request(body, Some(format!("sha256={}", signature)), Some(Utc::now().timestamp()))
}

async fn contract_status(app: &TestApp, contract_id: Uuid) -> ContractStatus {
    signature_contract_model::Entity::find_by_id(contract_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_webhook_rejects_missing_or_invalid_signature() {
    let app = setup_app().await;
    let contract = test_data::create_contract(&app.db, Uuid::new_v4(), "doc-reject").await;
    let body = event_payload("upload", "doc-reject");

    let cases = vec![
        // 署名なし
        None,
        // 16進数でない署名
        Some("sha256=not-hex".to_string()),
        // 別の秘密鍵で署名
        Some(hmac_sha256_hex(b"another-secret", &body)),
    ];

    for signature in cases {
        let res = app
            .router
            .clone()
            .oneshot(webhook_request(body.clone(), signature, Some(Utc::now().timestamp())))
            .await
            .unwrap();
        let (status, json) = response_json(res).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["success"], false);
    }

    assert_eq!(contract_status(&app, contract.id).await, ContractStatus::Draft);
    let events = esign_audit_event_model::Entity::find().all(&app.db).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_webhook_rejects_tampered_body() {
    let app = setup_app().await;
    let contract = test_data::create_contract(&app.db, Uuid::new_v4(), "doc-tampered").await;

    let signed_body = event_payload("upload", "doc-tampered");
    let signature = hmac_sha256_hex(WEBHOOK_SECRET.as_bytes(), &signed_body);
    let tampered_body = event_payload("cancel", "doc-tampered");

    let res = app
        .router
        .clone()
        .oneshot(webhook_request(tampered_body, Some(signature), None))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(contract_status(&app, contract.id).await, ContractStatus::Draft);
}

#[tokio::test]
async fn test_webhook_rejects_stale_timestamp() {
    let app = setup_app().await;
    test_data::create_contract(&app.db, Uuid::new_v4(), "doc-stale").await;
    let body = event_payload("upload", "doc-stale");
    let signature = hmac_sha256_hex(WEBHOOK_SECRET.as_bytes(), &body);

    let stale = Utc::now().timestamp() - 600;
    let res = app
        .router
        .clone()
        .oneshot(webhook_request(body.clone(), Some(signature.clone()), Some(stale)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let future = Utc::now().timestamp() + 120;
    let res = app
        .router
        .clone()
        .oneshot(webhook_request(body, Some(signature), Some(future)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_event_starts_contract() {
    let app = setup_app().await;
    let contract = test_data::create_contract(&app.db, Uuid::new_v4(), "doc-upload").await;

    let res = app
        .router
        .clone()
        .oneshot(signed_request(event_payload("upload", "doc-upload")))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["processed"], true);
    assert_eq!(body["event"], "upload");
    assert_eq!(body["documentKey"], "doc-upload");
    assert_eq!(contract_status(&app, contract.id).await, ContractStatus::Running);

    let events = esign_audit_event_model::Entity::find()
        .filter(esign_audit_event_model::Column::EntityId.eq("doc-upload"))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EsignEventType::DocumentUploaded);
    assert_eq!(events[0].tenant_id, contract.tenant_id);
}

#[tokio::test]
async fn test_sign_event_records_signer_and_archives_evidence() {
    let app = setup_app().await;
    let contract = test_data::create_contract(&app.db, Uuid::new_v4(), "doc-sign").await;

    let res = app
        .router
        .clone()
        .oneshot(signed_request(event_payload("sign", "doc-sign")))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], true);

    let signers = contract_signer_model::Entity::find()
        .filter(contract_signer_model::Column::ContractId.eq(contract.id))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(signers.len(), 1);
    assert_eq!(signers[0].status, SignerStatus::Signed);
    assert_eq!(signers[0].email, "joao.souza@example.com.br");
    assert!(signers[0].signed_at.is_some());

    let events = esign_audit_event_model::Entity::find()
        .filter(esign_audit_event_model::Column::EntityId.eq("doc-sign"))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EsignEventType::DocumentSigned);

    // 法的証拠レベルのイベントはストレージにも保管される
    let archived = app
        .storage
        .keys_with_prefix(&format!("esign-archive/{}/", contract.tenant_id));
    assert_eq!(archived.len(), 1);
    assert!(archived[0].ends_with(&format!("{}.json", events[0].id)));

    let stored: Value = serde_json::from_slice(&app.storage.get(&archived[0]).unwrap()).unwrap();
    assert_eq!(stored["digitalSignature"], events[0].digital_signature);
}

#[tokio::test]
async fn test_finished_contract_keeps_status() {
    let app = setup_app().await;
    let contract = test_data::create_contract(&app.db, Uuid::new_v4(), "doc-closed").await;

    let res = app
        .router
        .clone()
        .oneshot(signed_request(event_payload("auto_close", "doc-closed")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(contract_status(&app, contract.id).await, ContractStatus::Closed);

    let res = app
        .router
        .clone()
        .oneshot(signed_request(event_payload("cancel", "doc-closed")))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], true);
    assert_eq!(contract_status(&app, contract.id).await, ContractStatus::Closed);
}

#[tokio::test]
async fn test_failed_signer_update_rolls_back_contract_status() {
    let app = setup_app().await;
    let contract = test_data::create_contract(&app.db, Uuid::new_v4(), "doc-rollback").await;

    // 契約の更新後に署名者の書き込みが失敗する状況を作る
    app.db
        .execute_unprepared("DROP TABLE contract_signers")
        .await
        .unwrap();

    let res = app
        .router
        .clone()
        .oneshot(signed_request(event_payload("refusal", "doc-rollback")))
        .await
        .unwrap();

    assert!(res.status().is_server_error());
    assert_eq!(contract_status(&app, contract.id).await, ContractStatus::Draft);

    let events = esign_audit_event_model::Entity::find()
        .filter(esign_audit_event_model::Column::EntityId.eq("doc-rollback"))
        .all(&app.db)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_unknown_document_is_acknowledged_without_processing() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(signed_request(event_payload("sign", "doc-unknown")))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["processed"], false);

    let events = esign_audit_event_model::Entity::find().all(&app.db).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_malformed_payload_with_valid_signature_is_bad_request() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(signed_request(b"{\"event\": 42}".to_vec()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
