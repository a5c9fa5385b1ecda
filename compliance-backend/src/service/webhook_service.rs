// compliance-backend/src/service/webhook_service.rs

//! 電子署名プロバイダー (Clicksign) からの Webhook 受信
//!
//! 署名と時刻の検証が両方通るまで、状態は一切変更しない。

use crate::domain::contract_signer_model::{
    self, Model as SignerModel, SignerStatus,
};
use crate::domain::esign_audit_event_model::{ComplianceLevel, EsignEventType};
use crate::domain::signature_contract_model::{self, ContractStatus, Model as ContractModel};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::repository::esign_repository::EsignRepository;
use crate::service::compliance_audit_service::AuditContext;
use crate::service::esign_audit_service::{EsignAuditService, EsignEventParams};
use crate::utils::token::verify_hmac_sha256;
use crate::utils::transaction::TransactionManager;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{ConnectionTrait, IntoActiveModel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "x-clicksign-signature";
pub const TIMESTAMP_HEADER: &str = "x-clicksign-timestamp";

const INVALID_SIGNATURE_MESSAGE: &str = "Assinatura do webhook inválida";

/// HMAC-SHA256 (16進数, `sha256=` 接頭辞は任意) を定数時間で検証する
pub fn verify_signature(secret: Option<&str>, payload: &[u8], header: Option<&str>) -> AppResult<()> {
    let Some(secret) = secret.filter(|secret| !secret.is_empty()) else {
        tracing::error!("Webhook secret is not configured; rejecting request");
        return Err(AppError::SecurityRejection(
            "Webhook não configurado".to_string(),
        ));
    };

    let header = header
        .map(str::trim)
        .filter(|header| !header.is_empty())
        .ok_or_else(|| AppError::SecurityRejection(INVALID_SIGNATURE_MESSAGE.to_string()))?;
    let hex_signature = header.strip_prefix("sha256=").unwrap_or(header);

    let expected = hex::decode(hex_signature)
        .map_err(|_| AppError::SecurityRejection(INVALID_SIGNATURE_MESSAGE.to_string()))?;

    if verify_hmac_sha256(secret.as_bytes(), payload, &expected) {
        Ok(())
    } else {
        Err(AppError::SecurityRejection(
            INVALID_SIGNATURE_MESSAGE.to_string(),
        ))
    }
}

/// UNIX秒のタイムスタンプが許容範囲内か検証する。ヘッダーが無い場合は警告のみ
pub fn verify_timestamp(
    header: Option<&str>,
    now: DateTime<Utc>,
    tolerance_secs: i64,
    max_future_skew_secs: i64,
) -> AppResult<()> {
    let Some(header) = header.map(str::trim).filter(|header| !header.is_empty()) else {
        tracing::warn!("Webhook received without timestamp header; replay protection skipped");
        return Ok(());
    };

    let timestamp: i64 = header
        .parse()
        .map_err(|_| AppError::SecurityRejection("Timestamp do webhook inválido".to_string()))?;
    let age = now
        .timestamp()
        .checked_sub(timestamp)
        .ok_or_else(|| AppError::SecurityRejection("Timestamp do webhook inválido".to_string()))?;

    if age > tolerance_secs {
        return Err(AppError::SecurityRejection(
            "Webhook expirado".to_string(),
        ));
    }
    if age < -max_future_skew_secs {
        return Err(AppError::SecurityRejection(
            "Timestamp do webhook no futuro".to_string(),
        ));
    }

    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: WebhookEvent,
    pub document: Option<WebhookDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookDocument {
    pub key: String,
    pub filename: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebhookSigner {
    key: Option<String>,
    email: String,
    name: Option<String>,
}

impl WebhookEvent {
    fn signer(&self) -> Option<WebhookSigner> {
        self.data
            .get("signer")
            .and_then(|signer| serde_json::from_value(signer.clone()).ok())
    }
}

/// プロバイダーのイベント名
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    Upload,
    AddSigner,
    Sign,
    Refusal,
    Close,
    Cancel,
    Deadline,
    Other(String),
}

impl WebhookEventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "upload" => Self::Upload,
            "add_signer" => Self::AddSigner,
            "sign" => Self::Sign,
            "refusal" => Self::Refusal,
            "auto_close" | "close" => Self::Close,
            "cancel" => Self::Cancel,
            "deadline" => Self::Deadline,
            other => Self::Other(other.to_string()),
        }
    }

    /// 終了状態への遷移先 (該当しないイベントは None)
    fn final_status(&self) -> Option<ContractStatus> {
        match self {
            Self::Refusal => Some(ContractStatus::Refused),
            Self::Close => Some(ContractStatus::Closed),
            Self::Cancel => Some(ContractStatus::Canceled),
            Self::Deadline => Some(ContractStatus::Expired),
            _ => None,
        }
    }

    fn audit_event(&self) -> (EsignEventType, ComplianceLevel) {
        match self {
            Self::Upload => (EsignEventType::DocumentUploaded, ComplianceLevel::Standard),
            Self::AddSigner => (EsignEventType::SignerAdded, ComplianceLevel::Enhanced),
            Self::Sign => (EsignEventType::DocumentSigned, ComplianceLevel::Legal),
            Self::Refusal => (EsignEventType::DocumentRefused, ComplianceLevel::Legal),
            Self::Close => (EsignEventType::ContractCompleted, ComplianceLevel::Legal),
            Self::Cancel => (EsignEventType::DocumentCancelled, ComplianceLevel::Enhanced),
            Self::Deadline => (EsignEventType::DocumentExpired, ComplianceLevel::Enhanced),
            Self::Other(_) => (EsignEventType::WebhookReceived, ComplianceLevel::Standard),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub received: bool,
    pub event: String,
    pub document_key: Option<String>,
    /// 対応する契約が見つかり、監査に記録されたか
    pub processed: bool,
}

pub struct WebhookService {
    db: DbPool,
    esign_repo: Arc<EsignRepository>,
    esign_audit: Arc<EsignAuditService>,
    secret: Option<String>,
    tolerance_secs: i64,
    max_future_skew_secs: i64,
}

impl WebhookService {
    pub fn new(
        db: DbPool,
        esign_repo: Arc<EsignRepository>,
        esign_audit: Arc<EsignAuditService>,
        secret: Option<String>,
        tolerance_secs: i64,
        max_future_skew_secs: i64,
    ) -> Self {
        Self {
            db,
            esign_repo,
            esign_audit,
            secret,
            tolerance_secs,
            max_future_skew_secs,
        }
    }

    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
        context: &AuditContext,
    ) -> AppResult<WebhookOutcome> {
        verify_signature(self.secret.as_deref(), payload, signature)?;
        verify_timestamp(
            timestamp,
            Utc::now(),
            self.tolerance_secs,
            self.max_future_skew_secs,
        )?;

        let payload: WebhookPayload = serde_json::from_slice(payload)
            .map_err(|e| AppError::BadRequest(format!("Payload do webhook inválido: {}", e)))?;
        let kind = WebhookEventKind::parse(&payload.event.name);

        let mut outcome = WebhookOutcome {
            received: true,
            event: payload.event.name.clone(),
            document_key: payload.document.as_ref().map(|document| document.key.clone()),
            processed: false,
        };

        let Some(document) = &payload.document else {
            log_with_context!(
                tracing::Level::WARN,
                "Webhook without document reference",
                "event" => &payload.event.name
            );
            return Ok(outcome);
        };

        let Some(contract) = self
            .esign_repo
            .find_contract_by_document_key(&document.key)
            .await?
        else {
            // テナントが特定できないため監査には残せない
            log_with_context!(
                tracing::Level::WARN,
                "Webhook for unknown document",
                "event" => &payload.event.name,
                "document_key" => &document.key
            );
            return Ok(outcome);
        };

        // 契約の状態と署名者の更新はまとめて反映する
        let tx_kind = kind.clone();
        let tx_event = payload.event.clone();
        let tx_contract = contract.clone();
        let signer = self
            .db
            .execute_in_transaction(move |txn| {
                Box::pin(async move { apply_event(txn, &tx_kind, &tx_event, &tx_contract).await })
            })
            .await?;
        self.record_event(&kind, &payload.event, document, &contract, signer.as_ref(), context)
            .await;

        log_with_context!(
            tracing::Level::INFO,
            "Webhook processed",
            "event" => &payload.event.name,
            "document_key" => &document.key,
            "tenant_id" => contract.tenant_id
        );

        outcome.processed = true;
        Ok(outcome)
    }

    async fn record_event(
        &self,
        kind: &WebhookEventKind,
        event: &WebhookEvent,
        document: &WebhookDocument,
        contract: &ContractModel,
        signer: Option<&SignerModel>,
        context: &AuditContext,
    ) {
        if *kind == WebhookEventKind::Sign {
            if let Some(signer) = signer {
                self.esign_audit
                    .log_document_signed(contract.tenant_id, &document.key, &signer.email, None, context)
                    .await;
                return;
            }
        }

        let (event_type, compliance_level) = kind.audit_event();
        let description = match kind {
            WebhookEventKind::Upload => "Documento enviado para assinatura".to_string(),
            WebhookEventKind::AddSigner => "Signatário adicionado".to_string(),
            WebhookEventKind::Sign => "Documento assinado".to_string(),
            WebhookEventKind::Refusal => "Assinatura recusada".to_string(),
            WebhookEventKind::Close => "Contrato finalizado".to_string(),
            WebhookEventKind::Cancel => "Documento cancelado".to_string(),
            WebhookEventKind::Deadline => "Prazo de assinatura expirado".to_string(),
            WebhookEventKind::Other(name) => format!("Evento de webhook recebido: {}", name),
        };

        let params = EsignEventParams::document(contract.tenant_id, event_type, &document.key, description)
            .metadata(json!({
                "webhookEvent": event.name,
                "occurredAt": event.occurred_at,
                "documentStatus": document.status,
                "filename": document.filename,
                "signerEmail": signer.map(|signer| signer.email.clone()),
            }))
            .compliance_level(compliance_level);

        self.esign_audit.log_event(params, context).await;
    }
}

/// 契約・署名者の状態を更新する (呼び出し側のトランザクション内で実行)
async fn apply_event<C: ConnectionTrait>(
    conn: &C,
    kind: &WebhookEventKind,
    event: &WebhookEvent,
    contract: &ContractModel,
) -> AppResult<Option<SignerModel>> {
    let occurred_at = event.occurred_at.unwrap_or_else(Utc::now);

    if *kind == WebhookEventKind::Upload && contract.status == ContractStatus::Draft {
        let mut active = contract.clone().into_active_model();
        active.status = Set(ContractStatus::Running);
        EsignRepository::update_contract(conn, active).await?;
    }

    if let Some(status) = kind.final_status() {
        if contract.status.is_finished() {
            log_with_context!(
                tracing::Level::DEBUG,
                "Contract already finished; status unchanged",
                "document_key" => &contract.document_key,
                "status" => contract.status.as_str()
            );
        } else {
            let mut active: signature_contract_model::ActiveModel =
                contract.clone().into_active_model();
            active.status = Set(status);
            if status == ContractStatus::Closed {
                active.closed_at = Set(Some(occurred_at));
            }
            EsignRepository::update_contract(conn, active).await?;
        }
    }

    let signer = match (kind, event.signer()) {
        (WebhookEventKind::AddSigner | WebhookEventKind::Sign | WebhookEventKind::Refusal, Some(signer)) => {
            Some(upsert_signer(conn, kind, &signer, contract, occurred_at).await?)
        }
        _ => None,
    };

    Ok(signer)
}

async fn upsert_signer<C: ConnectionTrait>(
    conn: &C,
    kind: &WebhookEventKind,
    signer: &WebhookSigner,
    contract: &ContractModel,
    occurred_at: DateTime<Utc>,
) -> AppResult<SignerModel> {
    let signer_key = signer.key.clone().unwrap_or_else(|| signer.email.to_lowercase());
    let existing = EsignRepository::find_signer(conn, contract.id, &signer_key).await?;

    let status = match kind {
        WebhookEventKind::Sign => SignerStatus::Signed,
        WebhookEventKind::Refusal => SignerStatus::Refused,
        _ => existing
            .as_ref()
            .map(|existing| existing.status)
            .unwrap_or(SignerStatus::Pending),
    };

    let model = match existing {
        Some(existing) => {
            let mut active: contract_signer_model::ActiveModel = existing.into_active_model();
            active.status = Set(status);
            if signer.name.is_some() {
                active.name = Set(signer.name.clone());
            }
            match status {
                SignerStatus::Signed => active.signed_at = Set(Some(occurred_at)),
                SignerStatus::Refused => active.refused_at = Set(Some(occurred_at)),
                SignerStatus::Pending => {}
            }
            EsignRepository::update_signer(conn, active).await?
        }
        None => {
            let now = Utc::now();
            let active = contract_signer_model::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(contract.tenant_id),
                contract_id: Set(contract.id),
                signer_key: Set(signer_key),
                name: Set(signer.name.clone()),
                email: Set(signer.email.to_lowercase()),
                status: Set(status),
                signed_at: Set((status == SignerStatus::Signed).then_some(occurred_at)),
                refused_at: Set((status == SignerStatus::Refused).then_some(occurred_at)),
                created_at: Set(now),
                updated_at: Set(now),
            };
            EsignRepository::create_signer(conn, active).await?
        }
    };

    Ok(model)
}
