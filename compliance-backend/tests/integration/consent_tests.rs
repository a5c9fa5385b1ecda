// tests/integration/consent_tests.rs

use crate::common::{
    app_helper::setup_app,
    auth_helper::{access_token_for, create_authenticated_request, create_request, response_json},
    test_data,
};
use axum::http::StatusCode;
use compliance_backend::domain::{
    compliance_audit_log_model,
    consent_record_model::{self, ConsentStatus, ConsentType},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn test_giving_same_consent_twice_keeps_single_record() {
    // Arrange
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let user = test_data::create_member(&app.db, tenant_id).await;
    let token = access_token_for(&app, &user);
    let body = json!({ "consentVersion": "1.0", "purpose": "Ofertas de imóveis" });

    // Act
    let first = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/marketing",
            &token,
            Some(body.clone()),
        ))
        .await
        .unwrap();
    let (first_status, first_json) = response_json(first).await;

    let second = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/marketing",
            &token,
            Some(body),
        ))
        .await
        .unwrap();
    let (second_status, second_json) = response_json(second).await;

    // Assert
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first_json["data"]["outcome"], "created");
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second_json["data"]["outcome"], "already_registered");
    assert_eq!(second_json["message"], "Consentimento já registrado");
    assert_eq!(first_json["data"]["consentId"], second_json["data"]["consentId"]);

    let records = consent_record_model::Entity::find()
        .filter(consent_record_model::Column::UserId.eq(user.id))
        .filter(consent_record_model::Column::ConsentType.eq(ConsentType::Marketing))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_new_version_updates_existing_active_consent() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);

    for version in ["1.0", "2.0"] {
        let res = app
            .router
            .clone()
            .oneshot(create_authenticated_request(
                "POST",
                "/api/compliance/consents/privacy",
                &token,
                Some(json!({ "consentVersion": version })),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            "/api/compliance/consents",
            &token,
            None,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;

    assert_eq!(status, StatusCode::OK);
    let consents = body["data"].as_array().unwrap();
    assert_eq!(consents.len(), 1);
    assert_eq!(consents[0]["consentType"], "privacy");
    assert_eq!(consents[0]["consentVersion"], "2.0");

    let modifications = compliance_audit_log_model::Entity::find()
        .filter(compliance_audit_log_model::Column::Action.eq("data_modification"))
        .filter(compliance_audit_log_model::Column::UserId.eq(user.id))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(modifications.len(), 1);
    let changed = modifications[0].changed_data.clone().unwrap();
    assert_eq!(changed["before"]["consentVersion"], "1.0");
    assert_eq!(changed["after"]["consentVersion"], "2.0");
}

#[tokio::test]
async fn test_withdraw_consent_then_regrant_keeps_one_active() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    let grant = || {
        create_authenticated_request(
            "POST",
            "/api/compliance/consents/newsletter",
            &token,
            Some(json!({ "consentVersion": "1.0" })),
        )
    };

    app.router.clone().oneshot(grant()).await.unwrap();

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "DELETE",
            "/api/compliance/consents/newsletter",
            &token,
            None,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["consentType"], "newsletter");

    // 有効な同意が無い状態での撤回
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "DELETE",
            "/api/compliance/consents/newsletter",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app.router.clone().oneshot(grant()).await.unwrap();
    let (_, body) = response_json(res).await;
    assert_eq!(body["data"]["outcome"], "created");

    let records = consent_record_model::Entity::find()
        .filter(consent_record_model::Column::UserId.eq(user.id))
        .all(&app.db)
        .await
        .unwrap();
    let active = records
        .iter()
        .filter(|record| record.status == ConsentStatus::Active)
        .count();
    let withdrawn = records
        .iter()
        .filter(|record| record.status == ConsentStatus::Withdrawn)
        .count();
    assert_eq!(active, 1);
    assert_eq!(withdrawn, 1);

    // 履歴には撤回済みも含まれる
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            "/api/compliance/consent-history",
            &token,
            None,
        ))
        .await
        .unwrap();
    let (_, body) = response_json(res).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_consent_type_is_rejected() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/consents/telemarketing",
            &token,
            Some(json!({ "consentVersion": "1.0" })),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_consent_routes_require_authentication() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_request("GET", "/api/compliance/consents", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // 不正なトークンは未認証として扱う
    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "GET",
            "/api/compliance/consents",
            "not-a-jwt",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_anonymous_cookie_consent_stores_preference_only() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "POST",
            "/api/compliance/cookie-consent",
            Some(json!({
                "sessionId": "sess-anon-1",
                "analytics": true,
                "marketing": false,
                "consentVersion": "1.0"
            })),
        ))
        .await
        .unwrap();
    let (status, _) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);

    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "GET",
            "/api/compliance/cookie-preferences?sessionId=sess-anon-1",
            None,
        ))
        .await
        .unwrap();
    let (status, body) = response_json(res).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["essential"], true);
    assert_eq!(body["data"]["analytics"], true);
    assert_eq!(body["data"]["marketing"], false);

    let records = consent_record_model::Entity::find().all(&app.db).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_visitor_cookie_consent_records_consents_by_email() {
    let app = setup_app().await;
    let tenant_id = Uuid::new_v4();
    let body = json!({
        "sessionId": "sess-visitor-1",
        "analytics": true,
        "marketing": true,
        "consentVersion": "1.0",
        "email": "Visitante@Example.com.br",
        "tenantId": tenant_id
    });

    for _ in 0..2 {
        let res = app
            .router
            .clone()
            .oneshot(create_request(
                "POST",
                "/api/compliance/cookie-consent",
                Some(body.clone()),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    // 同じ訪問者の再送でも種別ごとに1件のみ
    let records = consent_record_model::Entity::find()
        .filter(consent_record_model::Column::TenantId.eq(tenant_id))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.user_id.is_none()
        && record.email.as_deref() == Some("visitante@example.com.br")
        && record.status == ConsentStatus::Active));

    let mut types: Vec<ConsentType> = records.iter().map(|record| record.consent_type).collect();
    types.sort_by_key(|consent_type| consent_type.as_str());
    assert_eq!(types, vec![ConsentType::Analytics, ConsentType::Marketing]);
}

#[tokio::test]
async fn test_visitor_cookie_consent_needs_both_email_and_tenant() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_request(
            "POST",
            "/api/compliance/cookie-consent",
            Some(json!({
                "sessionId": "sess-visitor-2",
                "analytics": true,
                "consentVersion": "1.0",
                "email": "visitante@example.com.br"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let records = consent_record_model::Entity::find().all(&app.db).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_authenticated_cookie_consent_records_consents() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);

    let res = app
        .router
        .clone()
        .oneshot(create_authenticated_request(
            "POST",
            "/api/compliance/cookie-consent",
            &token,
            Some(json!({
                "sessionId": "sess-user-1",
                "analytics": true,
                "marketing": true,
                "personalization": true,
                "consentVersion": "1.0"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let mut types: Vec<ConsentType> = consent_record_model::Entity::find()
        .filter(consent_record_model::Column::UserId.eq(user.id))
        .filter(consent_record_model::Column::Status.eq(ConsentStatus::Active))
        .all(&app.db)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.consent_type)
        .collect();
    types.sort_by_key(|consent_type| consent_type.as_str());

    assert_eq!(
        types,
        vec![ConsentType::Analytics, ConsentType::Cookies, ConsentType::Marketing]
    );
}

#[tokio::test]
async fn test_cookie_preferences_need_session_or_login() {
    let app = setup_app().await;

    let res = app
        .router
        .clone()
        .oneshot(create_request("GET", "/api/compliance/cookie-preferences", None))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_has_active_consent_follows_grant_and_withdraw() {
    let app = setup_app().await;
    let user = test_data::create_member(&app.db, Uuid::new_v4()).await;
    let token = access_token_for(&app, &user);
    let consent_service = app.state.consent_service.clone();

    assert!(!consent_service
        .has_active_consent(user.tenant_id, user.id, ConsentType::Marketing)
        .await
        .unwrap());

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
    assert!(consent_service
        .has_active_consent(user.tenant_id, user.id, ConsentType::Marketing)
        .await
        .unwrap());

    app.router
        .clone()
        .oneshot(create_authenticated_request(
            "DELETE",
            "/api/compliance/consents/marketing",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert!(!consent_service
        .has_active_consent(user.tenant_id, user.id, ConsentType::Marketing)
        .await
        .unwrap());
}
