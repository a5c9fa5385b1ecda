// compliance-backend/src/domain/sensitive_fields.rs

//! 監査ログに保存する前に伏せ字にするフィールド名の一覧
//!
//! 新しい機微フィールドはここに追加する。比較は大文字小文字・区切り文字を無視する。

use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// 正規化済み (小文字・英数字のみ) のフィールド名
const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwordhash",
    "cpfcnpj",
    "cpf",
    "cnpj",
    "rg",
    "bankaccount",
    "bankagency",
    "pixkey",
    "token",
    "confirmationtoken",
    "tokenhash",
];

fn normalize(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn is_sensitive_field(field: &str) -> bool {
    let normalized = normalize(field);
    SENSITIVE_FIELDS.contains(&normalized.as_str())
}

/// JSONを再帰的に走査し、機微フィールドの値を置き換えたコピーを返す
pub fn redact_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    if is_sensitive_field(key) && !value.is_null() {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), redact_sensitive(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_name_variants() {
        assert!(is_sensitive_field("cpfCnpj"));
        assert!(is_sensitive_field("cpf_cnpj"));
        assert!(is_sensitive_field("PIX_KEY"));
        assert!(is_sensitive_field("bankAccount"));
        assert!(!is_sensitive_field("name"));
        assert!(!is_sensitive_field("email"));
    }

    #[test]
    fn test_redact_nested_before_after_diff() {
        let diff = json!({
            "before": { "name": "João", "cpfCnpj": "123.456.789-00", "password": "x" },
            "after": { "name": "João", "cpfCnpj": "987.654.321-00", "rg": null },
            "owners": [ { "pixKey": "joao@pix" } ]
        });

        let redacted = redact_sensitive(&diff);

        assert_eq!(redacted["before"]["name"], "João");
        assert_eq!(redacted["before"]["cpfCnpj"], REDACTED);
        assert_eq!(redacted["before"]["password"], REDACTED);
        assert_eq!(redacted["after"]["cpfCnpj"], REDACTED);
        assert!(redacted["after"]["rg"].is_null());
        assert_eq!(redacted["owners"][0]["pixKey"], REDACTED);
    }
}
