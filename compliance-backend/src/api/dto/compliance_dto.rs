// compliance-backend/src/api/dto/compliance_dto.rs

use crate::domain::deletion_request_model::DeletionType;
use crate::domain::export_request_model::ExportFormat;
use crate::service::consent_service::CookieFlags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// --- Request DTOs ---

#[derive(Deserialize, Serialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CookieConsentRequest {
    #[validate(length(min = 1, max = 128, message = "Sessão inválida"))]
    pub session_id: String,

    #[serde(default = "default_true")]
    pub essential: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default)]
    pub personalization: bool,

    #[validate(length(min = 1, max = 20, message = "Versão do consentimento inválida"))]
    pub consent_version: String,

    /// 未ログインの訪問者が同意を記録する場合のみ (tenantId とセット)
    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
    pub tenant_id: Option<Uuid>,
}

impl CookieConsentRequest {
    pub fn flags(&self) -> CookieFlags {
        CookieFlags {
            essential: self.essential,
            analytics: self.analytics,
            marketing: self.marketing,
            personalization: self.personalization,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CookiePreferencesQuery {
    pub session_id: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GiveConsentRequest {
    #[validate(length(min = 1, max = 20, message = "Versão do consentimento inválida"))]
    pub consent_version: String,

    #[validate(length(max = 500, message = "A finalidade deve ter no máximo 500 caracteres"))]
    pub purpose: Option<String>,

    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataExportRequest {
    #[serde(default)]
    pub format: ExportFormat,

    #[serde(default = "default_true")]
    pub include_related: bool,
}

#[derive(Deserialize, Serialize, Debug, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest {
    #[validate(length(max = 1000, message = "O motivo deve ter no máximo 1000 caracteres"))]
    pub reason: Option<String>,

    #[serde(default)]
    pub deletion_type: DeletionType,
}

fn default_true() -> bool {
    true
}

// --- Response DTOs ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CookieConsentResponse {
    pub preference_id: Uuid,
    pub consent_version: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConsentWithdrawnResponse {
    pub consent_id: Uuid,
    pub consent_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_consent_defaults() {
        let request: CookieConsentRequest = serde_json::from_str(
            r#"{"sessionId":"abc","marketing":true,"consentVersion":"1.0"}"#,
        )
        .unwrap();

        assert!(request.validate().is_ok());
        let flags = request.flags();
        assert!(flags.essential);
        assert!(flags.marketing);
        assert!(!flags.analytics);
    }

    #[test]
    fn test_export_request_defaults() {
        let request: DataExportRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.format, ExportFormat::Json);
        assert!(request.include_related);
    }

    #[test]
    fn test_delete_account_request_validation() {
        let request = DeleteAccountRequest {
            reason: Some("x".repeat(1001)),
            deletion_type: DeletionType::Anonymize,
        };
        assert!(request.validate().is_err());

        let request: DeleteAccountRequest =
            serde_json::from_str(r#"{"deletionType":"hard_delete"}"#).unwrap();
        assert_eq!(request.deletion_type, DeletionType::HardDelete);
    }
}
