// compliance-backend/src/service/certificate_service.rs

//! 削除証明書の生成と取得

use crate::domain::deletion_request_model::{DeletionType, Model as DeletionModel};
use crate::error::AppResult;
use crate::service::storage_service::StorageService;
use crate::utils::token::sha256_hex;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;

static CERTIFICATE_NUMBER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^DEL-\d+-[0-9A-F]{8}$").expect("Invalid certificate number regex")
});

/// 証明書番号 `DEL-<ミリ秒>-<8桁の16進大文字>`
pub fn generate_certificate_number(now: DateTime<Utc>) -> String {
    let random: u32 = rand::thread_rng().gen();
    format!("DEL-{}-{:08X}", now.timestamp_millis(), random)
}

pub fn is_valid_certificate_number(value: &str) -> bool {
    CERTIFICATE_NUMBER_REGEX.is_match(value)
}

pub fn certificate_storage_key(certificate_number: &str) -> String {
    format!("certificates/{}.txt", certificate_number)
}

/// 証明書に記載する処理内容
#[derive(Debug, Clone)]
pub struct CertificateDetails {
    pub certificate_number: String,
    pub request: DeletionModel,
    /// 対象者の仮名参照 (元の氏名・メールは記載しない)
    pub subject_reference: String,
    /// 処理したエンティティと件数
    pub entity_summary: Vec<(String, u64)>,
    pub issued_at: DateTime<Utc>,
}

pub fn render_certificate(details: &CertificateDetails) -> String {
    let operation = match details.request.deletion_type {
        DeletionType::Anonymize => "Anonimização dos dados pessoais",
        DeletionType::HardDelete => "Eliminação definitiva dos dados pessoais",
    };

    let summary = if details.entity_summary.is_empty() {
        "  (nenhum registro adicional)".to_string()
    } else {
        details
            .entity_summary
            .iter()
            .map(|(entity, count)| format!("  - {}: {}", entity, count))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let body = format!(
        "CERTIFICADO DE EXCLUSÃO DE DADOS PESSOAIS\n\
         =========================================\n\
         \n\
         Número do certificado: {number}\n\
         Solicitação: {request_id}\n\
         Titular (referência): {subject}\n\
         Data da solicitação: {requested}\n\
         Data de emissão: {issued}\n\
         \n\
         Operação realizada: {operation}\n\
         \n\
         Registros processados:\n\
         {summary}\n\
         \n\
         Retenção legal:\n\
         Registros financeiros, contratos e trilhas de auditoria foram preservados\n\
         pelo prazo exigido em lei, conforme art. 16 da LGPD.\n\
         \n\
         Base legal: Lei nº 13.709/2018 (LGPD), art. 18, VI (eliminação dos dados\n\
         pessoais tratados com o consentimento do titular) e art. 16.\n",
        number = details.certificate_number,
        request_id = details.request.id,
        subject = details.subject_reference,
        requested = details.request.created_at.to_rfc3339(),
        issued = details.issued_at.to_rfc3339(),
        operation = operation,
        summary = summary,
    );

    // 本文のフィンガープリントを末尾に付ける
    format!("{}\nImpressão digital (SHA-256): {}\n", body, sha256_hex(body.as_bytes()))
}

pub struct CertificateService {
    storage: Arc<dyn StorageService>,
    public_api_url: String,
}

impl CertificateService {
    pub fn new(storage: Arc<dyn StorageService>, public_api_url: impl Into<String>) -> Self {
        Self {
            storage,
            public_api_url: public_api_url.into(),
        }
    }

    pub fn certificate_url(&self, certificate_number: &str) -> String {
        format!(
            "{}/api/compliance/deletion-certificate/{}",
            self.public_api_url.trim_end_matches('/'),
            certificate_number
        )
    }

    /// 証明書を生成して保存し、URLを返す
    pub async fn store_certificate(&self, details: &CertificateDetails) -> AppResult<String> {
        let document = render_certificate(details);
        self.storage
            .upload(
                &certificate_storage_key(&details.certificate_number),
                document.into_bytes(),
                mime::TEXT_PLAIN_UTF_8.as_ref(),
            )
            .await?;
        Ok(self.certificate_url(&details.certificate_number))
    }

    pub async fn load_certificate(&self, certificate_number: &str) -> AppResult<Vec<u8>> {
        self.storage
            .download(&certificate_storage_key(certificate_number))
            .await
    }
}
