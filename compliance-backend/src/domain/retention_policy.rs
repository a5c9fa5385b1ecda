// compliance-backend/src/domain/retention_policy.rs

//! エンティティ種別ごとの保存期間ルール

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// テナントの保存ポリシー。削除リクエスト作成時にスナップショットを取る
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub keep_financial_records: bool,
    pub keep_contract_records: bool,
    pub keep_audit_logs: bool,
    pub anonymize_instead_of_delete: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_financial_records: true,
            keep_contract_records: true,
            keep_audit_logs: true,
            anonymize_instead_of_delete: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRetentionRule {
    pub can_hard_delete: bool,
    pub must_anonymize: bool,
    pub retention_years: u32,
    pub reason: &'static str,
}

impl EntityRetentionRule {
    const fn new(
        can_hard_delete: bool,
        must_anonymize: bool,
        retention_years: u32,
        reason: &'static str,
    ) -> Self {
        Self {
            can_hard_delete,
            must_anonymize,
            retention_years,
            reason,
        }
    }
}

/// 既知のエンティティ種別
pub const KNOWN_ENTITY_TYPES: &[&str] = &[
    "user",
    "lead",
    "owner",
    "renter",
    "visit",
    "consent",
    "interaction",
    "session",
    "contract",
    "rentalContract",
    "rentalPayment",
    "propertySale",
    "financeEntry",
    "auditLog",
];

/// 物理削除の経路が触るエンティティ種別
pub const HARD_DELETE_ENTITIES: &[&str] = &["consent", "interaction", "session", "user"];

const DEFAULT_RULE: EntityRetentionRule =
    EntityRetentionRule::new(true, false, 0, "Sem regra específica de retenção");

pub fn get_data_retention_rules(entity_type: &str) -> EntityRetentionRule {
    match entity_type {
        "user" | "lead" => EntityRetentionRule::new(
            true,
            false,
            0,
            "Dados cadastrais sem obrigação legal de guarda",
        ),
        "consent" => EntityRetentionRule::new(
            true,
            false,
            0,
            "Registro de consentimento do próprio titular",
        ),
        "interaction" | "session" | "visit" => {
            EntityRetentionRule::new(true, false, 0, "Dados operacionais")
        }
        "owner" | "renter" => EntityRetentionRule::new(
            false,
            true,
            5,
            "Vinculado a contratos de locação (Código Civil, art. 206)",
        ),
        "contract" | "rentalContract" | "propertySale" => EntityRetentionRule::new(
            false,
            false,
            10,
            "Obrigação legal de guarda de contratos (Código Civil, art. 205)",
        ),
        "rentalPayment" | "financeEntry" => EntityRetentionRule::new(
            false,
            false,
            5,
            "Obrigação fiscal (CTN, art. 173)",
        ),
        "auditLog" => EntityRetentionRule::new(
            false,
            false,
            5,
            "Prestação de contas e auditoria (LGPD, art. 37)",
        ),
        unknown => {
            // 未登録の種別は物理削除可能になってしまうので目立つように出す
            warn!(
                entity_type = %unknown,
                "No retention rule registered for entity type, falling back to permissive default"
            );
            DEFAULT_RULE
        }
    }
}

/// 基準日から N 年後の保存期限
pub fn calculate_retention_expiry(years: u32, from: DateTime<Utc>) -> DateTime<Utc> {
    from.checked_add_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
