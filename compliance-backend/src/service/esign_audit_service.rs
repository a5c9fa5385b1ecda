// compliance-backend/src/service/esign_audit_service.rs

//! 電子署名の監査証跡
//!
//! 各イベントに HMAC-SHA256 の `digital_signature` を付与し、後から改ざんを検出できるようにする。
//! `legal` レベルのイベントは長期保管ストレージにも JSON で保存する。

use crate::domain::contract_signer_model::{Model as SignerModel, SignerStatus};
use crate::domain::digital_certificate_model::{
    CertificateValidation, Model as CertificateModel, EXPIRING_SOON_DAYS,
};
use crate::domain::esign_audit_event_model::{
    ActiveModel as EventActiveModel, ComplianceLevel, EsignEventType, Model as EventModel,
};
use crate::domain::sensitive_fields::redact_sensitive;
use crate::domain::signature_contract_model::Model as ContractModel;
use crate::error::AppResult;
use crate::log_with_context;
use crate::repository::esign_repository::EsignRepository;
use crate::service::compliance_audit_service::AuditContext;
use crate::service::storage_service::StorageService;
use crate::utils::error_helper::not_found_error;
use crate::utils::token::{hmac_sha256_hex, verify_hmac_sha256};
use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::Set;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// 署名対象の正規化JSON (キー順は serde_json の Map により固定)
fn canonical_payload(event_type: EsignEventType, entity_id: &str, action: &str, metadata: &Value) -> String {
    json!({
        "eventType": event_type.as_str(),
        "entityId": entity_id,
        "action": action,
        "metadata": metadata,
    })
    .to_string()
}

pub fn compute_digital_signature(
    key: &[u8],
    event_type: EsignEventType,
    entity_id: &str,
    action: &str,
    metadata: &Value,
) -> String {
    hmac_sha256_hex(key, canonical_payload(event_type, entity_id, action, metadata).as_bytes())
}

/// 保存された署名が再計算した値と一致するか (定数時間比較)
pub fn verify_event_signature(key: &[u8], event: &EventModel) -> bool {
    let Ok(expected) = hex::decode(&event.digital_signature) else {
        return false;
    };
    verify_hmac_sha256(
        key,
        canonical_payload(event.event_type, &event.entity_id, &event.action, &event.metadata)
            .as_bytes(),
        &expected,
    )
}

pub fn archive_storage_key(event: &EventModel) -> String {
    format!(
        "esign-archive/{}/{}/{}.json",
        event.tenant_id,
        event.timestamp.format("%Y-%m-%d"),
        event.id
    )
}

#[derive(Debug, Clone)]
pub struct EsignEventParams {
    pub tenant_id: Uuid,
    pub event_type: EsignEventType,
    pub entity_type: String,
    pub entity_id: String,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub description: String,
    pub metadata: Value,
    pub compliance_level: ComplianceLevel,
}

impl EsignEventParams {
    pub fn document(
        tenant_id: Uuid,
        event_type: EsignEventType,
        document_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            event_type,
            entity_type: "document".to_string(),
            entity_id: document_id.into(),
            user_id: None,
            action: event_type.as_str().to_string(),
            description: description.into(),
            metadata: json!({}),
            compliance_level: ComplianceLevel::Standard,
        }
    }

    pub fn user_id(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn compliance_level(mut self, level: ComplianceLevel) -> Self {
        self.compliance_level = level;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperedEvent {
    pub event_id: Uuid,
    pub event_type: EsignEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub document_id: String,
    pub total_events: usize,
    pub valid_events: usize,
    pub tampered_events: Vec<TamperedEvent>,
    pub is_intact: bool,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAuditReport {
    pub document_id: String,
    pub contract: Option<ContractModel>,
    pub signers: Vec<SignerModel>,
    pub events: Vec<EventModel>,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub integrity: IntegrityReport,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerProof {
    pub email: String,
    pub name: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub event_id: Uuid,
    pub digital_signature: String,
    pub signature_valid: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProof {
    pub document_id: String,
    pub contract_status: Option<String>,
    pub signatures: Vec<SignerProof>,
    pub integrity_verified: bool,
    pub legal_basis: &'static str,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringCertificate {
    pub certificate: CertificateModel,
    pub validation: CertificateValidation,
}

pub struct EsignAuditService {
    esign_repo: Arc<EsignRepository>,
    storage: Arc<dyn StorageService>,
    signing_key: Vec<u8>,
}

impl EsignAuditService {
    pub fn new(
        esign_repo: Arc<EsignRepository>,
        storage: Arc<dyn StorageService>,
        signing_key: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            esign_repo,
            storage,
            signing_key: signing_key.as_ref().to_vec(),
        }
    }

    /// イベントを追記する。失敗しても呼び出し元には返さない
    pub async fn log_event(&self, params: EsignEventParams, context: &AuditContext) -> Option<EventModel> {
        let metadata = redact_sensitive(&params.metadata);
        let digital_signature = compute_digital_signature(
            &self.signing_key,
            params.event_type,
            &params.entity_id,
            &params.action,
            &metadata,
        );

        let event = EventActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(params.tenant_id),
            event_type: Set(params.event_type),
            entity_type: Set(params.entity_type),
            entity_id: Set(params.entity_id),
            user_id: Set(params.user_id),
            action: Set(params.action),
            description: Set(params.description),
            timestamp: Set(Utc::now()),
            ip_address: Set(context.ip_address.clone()),
            user_agent: Set(context.user_agent.clone()),
            metadata: Set(metadata),
            compliance_level: Set(params.compliance_level),
            digital_signature: Set(digital_signature),
        };

        let event = match self.esign_repo.create_event(event).await {
            Ok(event) => event,
            Err(e) => {
                log_with_context!(
                    tracing::Level::ERROR,
                    "Failed to record e-signature audit event",
                    "event_type" => params.event_type.as_str(),
                    "error" => &e.to_string()
                );
                return None;
            }
        };

        if event.compliance_level == ComplianceLevel::Legal {
            self.archive_event(&event).await;
        }

        Some(event)
    }

    async fn archive_event(&self, event: &EventModel) {
        let result = match serde_json::to_vec_pretty(event) {
            Ok(bytes) => {
                self.storage
                    .upload(&archive_storage_key(event), bytes, mime::APPLICATION_JSON.as_ref())
                    .await
            }
            Err(e) => Err(crate::error::AppError::InternalServerError(e.to_string())),
        };

        if let Err(e) = result {
            log_with_context!(
                tracing::Level::ERROR,
                "Failed to archive legal e-signature event",
                "event_id" => event.id,
                "error" => &e.to_string()
            );
        }
    }

    pub async fn log_document_signed(
        &self,
        tenant_id: Uuid,
        document_id: &str,
        signer_email: &str,
        signer_user_id: Option<Uuid>,
        context: &AuditContext,
    ) -> Option<EventModel> {
        let params = EsignEventParams::document(
            tenant_id,
            EsignEventType::DocumentSigned,
            document_id,
            format!("Documento assinado por {}", signer_email),
        )
        .user_id(signer_user_id)
        .metadata(json!({ "signerEmail": signer_email, "signedAt": Utc::now() }))
        .compliance_level(ComplianceLevel::Legal);

        self.log_event(params, context).await
    }

    pub async fn log_document_access(
        &self,
        tenant_id: Uuid,
        document_id: &str,
        user_id: Uuid,
        downloaded: bool,
        context: &AuditContext,
    ) -> Option<EventModel> {
        let (event_type, description) = if downloaded {
            (EsignEventType::DocumentDownloaded, "Documento baixado")
        } else {
            (EsignEventType::DocumentViewed, "Documento visualizado")
        };
        let params = EsignEventParams::document(tenant_id, event_type, document_id, description)
            .user_id(Some(user_id))
            .compliance_level(ComplianceLevel::Enhanced);

        self.log_event(params, context).await
    }

    fn check_events(&self, document_id: &str, events: &[EventModel]) -> IntegrityReport {
        let tampered_events: Vec<TamperedEvent> = events
            .iter()
            .filter(|event| !verify_event_signature(&self.signing_key, event))
            .map(|event| TamperedEvent {
                event_id: event.id,
                event_type: event.event_type,
                timestamp: event.timestamp,
            })
            .collect();

        IntegrityReport {
            document_id: document_id.to_string(),
            total_events: events.len(),
            valid_events: events.len() - tampered_events.len(),
            is_intact: tampered_events.is_empty(),
            tampered_events,
            verified_at: Utc::now(),
        }
    }

    /// 文書の全イベントについて署名を再計算し、一致しないものを列挙する
    pub async fn verify_audit_trail_integrity(
        &self,
        tenant_id: Uuid,
        document_id: &str,
    ) -> AppResult<IntegrityReport> {
        let events = self
            .esign_repo
            .find_events_for_entity(tenant_id, document_id)
            .await?;
        let report = self.check_events(document_id, &events);

        if !report.is_intact {
            log_with_context!(
                tracing::Level::WARN,
                "E-signature audit trail integrity check failed",
                "document_id" => document_id,
                "tampered" => report.tampered_events.len()
            );
        }

        Ok(report)
    }

    async fn find_contract(&self, tenant_id: Uuid, document_id: &str) -> AppResult<Option<ContractModel>> {
        Ok(self
            .esign_repo
            .find_contract_by_document_key(document_id)
            .await?
            .filter(|contract| contract.tenant_id == tenant_id))
    }

    pub async fn generate_document_audit_report(
        &self,
        tenant_id: Uuid,
        document_id: &str,
    ) -> AppResult<DocumentAuditReport> {
        let events = self
            .esign_repo
            .find_events_for_entity(tenant_id, document_id)
            .await?;
        let contract = self.find_contract(tenant_id, document_id).await?;

        if events.is_empty() && contract.is_none() {
            return Err(not_found_error(
                "Documento não encontrado",
                document_id,
                "generate_document_audit_report",
            ));
        }

        let signers = match &contract {
            Some(contract) => self.esign_repo.find_signers(contract.id).await?,
            None => Vec::new(),
        };

        Ok(DocumentAuditReport {
            document_id: document_id.to_string(),
            integrity: self.check_events(document_id, &events),
            first_event_at: events.first().map(|event| event.timestamp),
            last_event_at: events.last().map(|event| event.timestamp),
            contract,
            signers,
            events,
            generated_at: Utc::now(),
        })
    }

    /// 署名の証拠一式 (署名イベントとその検証結果)
    pub async fn get_signature_proof(
        &self,
        tenant_id: Uuid,
        document_id: &str,
    ) -> AppResult<SignatureProof> {
        let events = self
            .esign_repo
            .find_events_for_entity(tenant_id, document_id)
            .await?;
        let contract = self.find_contract(tenant_id, document_id).await?;
        let signers = match &contract {
            Some(contract) => self.esign_repo.find_signers(contract.id).await?,
            None => Vec::new(),
        };

        let signed_events: Vec<&EventModel> = events
            .iter()
            .filter(|event| event.event_type == EsignEventType::DocumentSigned)
            .collect();
        if signed_events.is_empty() {
            return Err(not_found_error(
                "Nenhuma assinatura registrada para este documento",
                document_id,
                "get_signature_proof",
            ));
        }

        let signatures = signed_events
            .into_iter()
            .map(|event| {
                let email = event
                    .metadata
                    .get("signerEmail")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let signer = signers.iter().find(|signer| {
                    signer.email.eq_ignore_ascii_case(&email) && signer.status == SignerStatus::Signed
                });
                SignerProof {
                    name: signer.and_then(|signer| signer.name.clone()),
                    signed_at: signer.and_then(|signer| signer.signed_at).or(Some(event.timestamp)),
                    event_id: event.id,
                    digital_signature: event.digital_signature.clone(),
                    signature_valid: verify_event_signature(&self.signing_key, event),
                    email,
                }
            })
            .collect();

        Ok(SignatureProof {
            document_id: document_id.to_string(),
            contract_status: contract.map(|contract| contract.status.as_str().to_string()),
            signatures,
            integrity_verified: self.check_events(document_id, &events).is_intact,
            legal_basis: "MP 2.200-2/2001 e Lei nº 14.063/2020",
            generated_at: Utc::now(),
        })
    }

    /// 30日以内に期限切れになる ICP-Brasil 証明書
    pub async fn get_expiring_certificates(&self, tenant_id: Uuid) -> AppResult<Vec<ExpiringCertificate>> {
        let now = Utc::now();
        let certificates = self
            .esign_repo
            .find_certificates_expiring_between(tenant_id, now, now + Duration::days(EXPIRING_SOON_DAYS))
            .await?;

        Ok(certificates
            .into_iter()
            .map(|certificate| ExpiringCertificate {
                validation: certificate.validate_at(now),
                certificate,
            })
            .collect())
    }

    pub async fn get_recent_events(&self, tenant_id: Uuid, limit: u64) -> AppResult<Vec<EventModel>> {
        Ok(self
            .esign_repo
            .find_events_for_tenant(tenant_id, limit.min(1000))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-audit-signing-key-that-is-long-enough";

    fn event(metadata: Value) -> EventModel {
        let digital_signature = compute_digital_signature(
            KEY,
            EsignEventType::DocumentSigned,
            "doc-1",
            "document_signed",
            &metadata,
        );
        EventModel {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            event_type: EsignEventType::DocumentSigned,
            entity_type: "document".to_string(),
            entity_id: "doc-1".to_string(),
            user_id: None,
            action: "document_signed".to_string(),
            description: "Documento assinado".to_string(),
            timestamp: Utc::now(),
            ip_address: None,
            user_agent: None,
            metadata,
            compliance_level: ComplianceLevel::Legal,
            digital_signature,
        }
    }

    #[test]
    fn test_signature_verifies_untouched_event() {
        let event = event(json!({ "signerEmail": "ana@example.com" }));
        assert!(verify_event_signature(KEY, &event));
    }

    #[test]
    fn test_tampered_metadata_is_detected() {
        let mut event = event(json!({ "signerEmail": "ana@example.com" }));
        event.metadata = json!({ "signerEmail": "mallory@example.com" });
        assert!(!verify_event_signature(KEY, &event));
    }

    #[test]
    fn test_signature_depends_on_key() {
        let event = event(json!({}));
        assert!(!verify_event_signature(b"another-key", &event));
    }

    #[test]
    fn test_metadata_key_order_does_not_matter() {
        let a = compute_digital_signature(
            KEY,
            EsignEventType::DocumentViewed,
            "doc",
            "viewed",
            &json!({ "a": 1, "b": 2 }),
        );
        let b = compute_digital_signature(
            KEY,
            EsignEventType::DocumentViewed,
            "doc",
            "viewed",
            &serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_archive_key_layout() {
        let event = event(json!({}));
        let key = archive_storage_key(&event);
        assert!(key.starts_with(&format!("esign-archive/{}/", event.tenant_id)));
        assert!(key.ends_with(&format!("{}.json", event.id)));
    }
}
