// compliance-backend/src/domain/anonymization.rs

//! 個人データの匿名化変換
//!
//! すべて純粋関数。同じ入力は常に同じ出力になり、匿名化済みの値を再度匿名化しても変わらない。

use super::{lead_model, owner_model, renter_model, user_model};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub const ANON_PREFIX: &str = "ANON_";
pub const ANON_USER_PREFIX: &str = "Usuário Anônimo ";
pub const ANON_EMAIL_PREFIX: &str = "anonymized_";
pub const ANON_EMAIL_DOMAIN: &str = "@deleted.user";

pub const PHONE_SENTINEL: &str = "(00) 00000-0000";
pub const CPF_CNPJ_SENTINEL: &str = "***.***.***-**";
pub const RG_SENTINEL: &str = "**.***.***-*";
pub const ADDRESS_SENTINEL: &str = "[ENDEREÇO REMOVIDO]";

/// 匿名化したレコードに付与する固定メモ
pub const ANONYMIZATION_NOTE: &str =
    "Dados pessoais anonimizados a pedido do titular (LGPD art. 18, VI).";

const SENTINELS: &[&str] = &[
    PHONE_SENTINEL,
    CPF_CNPJ_SENTINEL,
    RG_SENTINEL,
    ADDRESS_SENTINEL,
];

fn digest_hex(value: &str, len: usize) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(len);
    hex
}

/// 匿名化済みの値かどうか
pub fn is_anonymized(value: &str) -> bool {
    value.starts_with(ANON_PREFIX)
        || value.starts_with(ANON_USER_PREFIX)
        || (value.starts_with(ANON_EMAIL_PREFIX) && value.ends_with(ANON_EMAIL_DOMAIN))
        || SENTINELS.contains(&value)
}

fn transform(value: &str, f: impl FnOnce(&str) -> String) -> String {
    if value.is_empty() || is_anonymized(value) {
        value.to_string()
    } else {
        f(value)
    }
}

/// 一般的な文字列 → `ANON_<8桁hex>`
pub fn anonymize_string(value: &str) -> String {
    transform(value, |v| format!("{}{}", ANON_PREFIX, digest_hex(v, 8)))
}

/// ユーザー名 → `Usuário Anônimo <8桁hex>`
pub fn anonymize_name(value: &str) -> String {
    transform(value, |v| format!("{}{}", ANON_USER_PREFIX, digest_hex(v, 8)))
}

pub fn anonymize_email(value: &str) -> String {
    transform(value, |v| {
        format!(
            "{}{}{}",
            ANON_EMAIL_PREFIX,
            digest_hex(&v.trim().to_lowercase(), 12),
            ANON_EMAIL_DOMAIN
        )
    })
}

pub fn anonymize_phone(value: &str) -> String {
    transform(value, |_| PHONE_SENTINEL.to_string())
}

pub fn anonymize_cpf_cnpj(value: &str) -> String {
    transform(value, |_| CPF_CNPJ_SENTINEL.to_string())
}

pub fn anonymize_rg(value: &str) -> String {
    transform(value, |_| RG_SENTINEL.to_string())
}

pub fn anonymize_address(value: &str) -> String {
    transform(value, |_| ADDRESS_SENTINEL.to_string())
}

fn map_opt(value: &Option<String>, f: fn(&str) -> String) -> Option<String> {
    value.as_deref().map(f)
}

pub fn anonymize_user(user: &user_model::Model, now: DateTime<Utc>) -> user_model::Model {
    user_model::Model {
        name: anonymize_name(&user.name),
        email: anonymize_email(&user.email),
        phone: map_opt(&user.phone, anonymize_phone),
        cpf_cnpj: map_opt(&user.cpf_cnpj, anonymize_cpf_cnpj),
        rg: map_opt(&user.rg, anonymize_rg),
        address: map_opt(&user.address, anonymize_address),
        // 認証情報は残さない
        password_hash: None,
        is_active: false,
        notes: Some(ANONYMIZATION_NOTE.to_string()),
        anonymized_at: user.anonymized_at.or(Some(now)),
        ..user.clone()
    }
}

pub fn anonymize_lead(lead: &lead_model::Model, now: DateTime<Utc>) -> lead_model::Model {
    lead_model::Model {
        name: anonymize_string(&lead.name),
        email: map_opt(&lead.email, anonymize_email),
        phone: map_opt(&lead.phone, anonymize_phone),
        cpf_cnpj: map_opt(&lead.cpf_cnpj, anonymize_cpf_cnpj),
        assigned_to: None,
        notes: Some(ANONYMIZATION_NOTE.to_string()),
        anonymized_at: lead.anonymized_at.or(Some(now)),
        ..lead.clone()
    }
}

pub fn anonymize_owner(owner: &owner_model::Model, now: DateTime<Utc>) -> owner_model::Model {
    owner_model::Model {
        name: anonymize_string(&owner.name),
        email: map_opt(&owner.email, anonymize_email),
        phone: map_opt(&owner.phone, anonymize_phone),
        cpf_cnpj: map_opt(&owner.cpf_cnpj, anonymize_cpf_cnpj),
        rg: map_opt(&owner.rg, anonymize_rg),
        address: map_opt(&owner.address, anonymize_address),
        // 口座情報は完全に削除
        bank_name: None,
        bank_agency: None,
        bank_account: None,
        pix_key: None,
        notes: Some(ANONYMIZATION_NOTE.to_string()),
        anonymized_at: owner.anonymized_at.or(Some(now)),
        ..owner.clone()
    }
}

pub fn anonymize_renter(renter: &renter_model::Model, now: DateTime<Utc>) -> renter_model::Model {
    renter_model::Model {
        name: anonymize_string(&renter.name),
        email: map_opt(&renter.email, anonymize_email),
        phone: map_opt(&renter.phone, anonymize_phone),
        cpf_cnpj: map_opt(&renter.cpf_cnpj, anonymize_cpf_cnpj),
        rg: map_opt(&renter.rg, anonymize_rg),
        address: map_opt(&renter.address, anonymize_address),
        employer: None,
        guarantor_name: None,
        notes: Some(ANONYMIZATION_NOTE.to_string()),
        anonymized_at: renter.anonymized_at.or(Some(now)),
        ..renter.clone()
    }
}
