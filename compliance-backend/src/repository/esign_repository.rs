// src/repository/esign_repository.rs

use crate::domain::contract_signer_model::{self, Entity as SignerEntity};
use crate::domain::digital_certificate_model::{
    self, CertificateStatus, Entity as CertificateEntity,
};
use crate::domain::esign_audit_event_model::{
    self, ActiveModel as EventActiveModel, Entity as EventEntity, Model as EventModel,
};
use crate::domain::signature_contract_model::{self, Entity as ContractEntity};
use chrono::{DateTime, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DbConn, DbErr};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EsignRepository {
    db: DbConn,
}

impl EsignRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    // --- 監査イベント (追記専用) ---

    pub async fn create_event(&self, event: EventActiveModel) -> Result<EventModel, DbErr> {
        event.insert(&self.db).await
    }

    /// 文書の全イベントを時系列順で取得
    pub async fn find_events_for_entity(
        &self,
        tenant_id: Uuid,
        entity_id: &str,
    ) -> Result<Vec<EventModel>, DbErr> {
        EventEntity::find()
            .filter(esign_audit_event_model::Column::TenantId.eq(tenant_id))
            .filter(esign_audit_event_model::Column::EntityId.eq(entity_id))
            .order_by_asc(esign_audit_event_model::Column::Timestamp)
            .all(&self.db)
            .await
    }

    pub async fn find_events_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> Result<Vec<EventModel>, DbErr> {
        EventEntity::find()
            .filter(esign_audit_event_model::Column::TenantId.eq(tenant_id))
            .order_by_desc(esign_audit_event_model::Column::Timestamp)
            .limit(limit)
            .all(&self.db)
            .await
    }

    // --- 契約・署名者 ---

    pub async fn create_contract(
        &self,
        contract: signature_contract_model::ActiveModel,
    ) -> Result<signature_contract_model::Model, DbErr> {
        contract.insert(&self.db).await
    }

    pub async fn find_contract_by_document_key(
        &self,
        document_key: &str,
    ) -> Result<Option<signature_contract_model::Model>, DbErr> {
        ContractEntity::find()
            .filter(signature_contract_model::Column::DocumentKey.eq(document_key))
            .one(&self.db)
            .await
    }

    pub async fn update_contract<C: ConnectionTrait>(
        conn: &C,
        contract: signature_contract_model::ActiveModel,
    ) -> Result<signature_contract_model::Model, DbErr> {
        contract.update(conn).await
    }

    pub async fn find_signers(
        &self,
        contract_id: Uuid,
    ) -> Result<Vec<contract_signer_model::Model>, DbErr> {
        SignerEntity::find()
            .filter(contract_signer_model::Column::ContractId.eq(contract_id))
            .order_by_asc(contract_signer_model::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn find_signer<C: ConnectionTrait>(
        conn: &C,
        contract_id: Uuid,
        signer_key: &str,
    ) -> Result<Option<contract_signer_model::Model>, DbErr> {
        SignerEntity::find()
            .filter(contract_signer_model::Column::ContractId.eq(contract_id))
            .filter(contract_signer_model::Column::SignerKey.eq(signer_key))
            .one(conn)
            .await
    }

    pub async fn create_signer<C: ConnectionTrait>(
        conn: &C,
        signer: contract_signer_model::ActiveModel,
    ) -> Result<contract_signer_model::Model, DbErr> {
        signer.insert(conn).await
    }

    pub async fn update_signer<C: ConnectionTrait>(
        conn: &C,
        signer: contract_signer_model::ActiveModel,
    ) -> Result<contract_signer_model::Model, DbErr> {
        signer.update(conn).await
    }

    // --- ICP-Brasil 証明書 ---

    pub async fn create_certificate(
        &self,
        certificate: digital_certificate_model::ActiveModel,
    ) -> Result<digital_certificate_model::Model, DbErr> {
        certificate.insert(&self.db).await
    }

    /// 指定期間内に期限を迎える有効な証明書
    pub async fn find_certificates_expiring_between(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<digital_certificate_model::Model>, DbErr> {
        CertificateEntity::find()
            .filter(digital_certificate_model::Column::TenantId.eq(tenant_id))
            .filter(digital_certificate_model::Column::Status.eq(CertificateStatus::Active))
            .filter(digital_certificate_model::Column::ValidUntil.gt(from))
            .filter(digital_certificate_model::Column::ValidUntil.lte(until))
            .order_by_asc(digital_certificate_model::Column::ValidUntil)
            .all(&self.db)
            .await
    }
}
