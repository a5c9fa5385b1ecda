// tests/common/test_data.rs

use chrono::{Duration, Utc};
use compliance_backend::domain::{
    digital_certificate_model::{self, CertificateStatus, CertificateType},
    finance_entry_model, lead_model, owner_model,
    signature_contract_model::{self, ContractStatus},
    user_model,
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use uuid::Uuid;

/// テスト用ユーザーを作成
pub async fn create_user(db: &DatabaseConnection, tenant_id: Uuid, role: &str) -> user_model::Model {
    let id = Uuid::new_v4();
    let now = Utc::now();

    user_model::ActiveModel {
        id: Set(id),
        tenant_id: Set(tenant_id),
        name: Set("Maria da Silva".to_string()),
        email: Set(format!("maria{}@example.com.br", &id.simple().to_string()[..8])),
        phone: Set(Some("+55 11 98765-4321".to_string())),
        cpf_cnpj: Set(Some("123.456.789-09".to_string())),
        rg: Set(Some("12.345.678-9".to_string())),
        address: Set(Some("Rua das Flores, 123 - São Paulo/SP".to_string())),
        password_hash: Set(Some("$argon2id$placeholder".to_string())),
        role: Set(role.to_string()),
        is_active: Set(true),
        notes: Set(None),
        anonymized_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_member(db: &DatabaseConnection, tenant_id: Uuid) -> user_model::Model {
    create_user(db, tenant_id, "agent").await
}

pub async fn create_dpo(db: &DatabaseConnection, tenant_id: Uuid) -> user_model::Model {
    create_user(db, tenant_id, "dpo").await
}

/// 利用者と同じメールアドレスのリード
pub async fn create_lead_for(db: &DatabaseConnection, user: &user_model::Model) -> lead_model::Model {
    let now = Utc::now();

    lead_model::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(user.tenant_id),
        name: Set(user.name.clone()),
        email: Set(Some(user.email.clone())),
        phone: Set(user.phone.clone()),
        cpf_cnpj: Set(user.cpf_cnpj.clone()),
        source: Set(Some("site".to_string())),
        status: Set("new".to_string()),
        assigned_to: Set(Some(user.id)),
        notes: Set(Some("Interessado em apartamento de 2 quartos".to_string())),
        anonymized_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_owner_for(db: &DatabaseConnection, user: &user_model::Model) -> owner_model::Model {
    let now = Utc::now();

    owner_model::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(user.tenant_id),
        name: Set(user.name.clone()),
        email: Set(Some(user.email.clone())),
        phone: Set(user.phone.clone()),
        cpf_cnpj: Set(user.cpf_cnpj.clone()),
        rg: Set(user.rg.clone()),
        address: Set(user.address.clone()),
        bank_name: Set(Some("Banco do Brasil".to_string())),
        bank_agency: Set(Some("1234-5".to_string())),
        bank_account: Set(Some("98765-4".to_string())),
        pix_key: Set(Some(user.email.clone())),
        notes: Set(None),
        anonymized_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_finance_entry(
    db: &DatabaseConnection,
    user: &user_model::Model,
    amount_cents: i64,
) -> finance_entry_model::Model {
    let now = Utc::now();

    finance_entry_model::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(user.tenant_id),
        user_id: Set(Some(user.id)),
        description: Set("Aluguel - outubro".to_string()),
        amount_cents: Set(amount_cents),
        entry_type: Set("income".to_string()),
        due_date: Set(now + Duration::days(5)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_contract(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    document_key: &str,
) -> signature_contract_model::Model {
    let now = Utc::now();

    signature_contract_model::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        document_key: Set(document_key.to_string()),
        title: Set("Contrato de locação".to_string()),
        status: Set(ContractStatus::Draft),
        created_by: Set(None),
        closed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_certificate(
    db: &DatabaseConnection,
    user: &user_model::Model,
    valid_for_days: i64,
) -> digital_certificate_model::Model {
    let now = Utc::now();

    digital_certificate_model::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(user.tenant_id),
        user_id: Set(user.id),
        certificate_type: Set(CertificateType::A1),
        holder_name: Set(user.name.clone()),
        holder_document: Set("123.456.789-09".to_string()),
        issuer: Set("AC Certisign RFB G5".to_string()),
        serial_number: Set(Uuid::new_v4().simple().to_string()),
        valid_from: Set(now - Duration::days(300)),
        valid_until: Set(now + Duration::days(valid_for_days)),
        status: Set(CertificateStatus::Active),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}
