// src/repository/compliance_audit_log_repository.rs

use crate::domain::compliance_audit_log_model::{
    self, ActiveModel as AuditLogActiveModel, AuditSeverity, Entity as AuditLogEntity,
    Model as AuditLogModel,
};
use chrono::{DateTime, Utc};
use sea_orm::{entity::*, query::*, DbConn, DbErr};
use uuid::Uuid;

/// 監査ログは追記専用。更新・削除のメソッドは持たない
#[derive(Debug, Clone)]
pub struct ComplianceAuditLogRepository {
    db: DbConn,
}

impl ComplianceAuditLogRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create(&self, audit_log: AuditLogActiveModel) -> Result<AuditLogModel, DbErr> {
        audit_log.insert(&self.db).await
    }

    // 対象ユーザーの監査ログを取得
    pub async fn find_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        limit: u64,
    ) -> Result<Vec<AuditLogModel>, DbErr> {
        AuditLogEntity::find()
            .filter(compliance_audit_log_model::Column::TenantId.eq(tenant_id))
            .filter(compliance_audit_log_model::Column::UserId.eq(user_id))
            .order_by_desc(compliance_audit_log_model::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
    ) -> Result<Vec<AuditLogModel>, DbErr> {
        AuditLogEntity::find()
            .filter(compliance_audit_log_model::Column::TenantId.eq(tenant_id))
            .order_by_desc(compliance_audit_log_model::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn find_by_action(
        &self,
        tenant_id: Uuid,
        action: &str,
        limit: u64,
    ) -> Result<Vec<AuditLogModel>, DbErr> {
        AuditLogEntity::find()
            .filter(compliance_audit_log_model::Column::TenantId.eq(tenant_id))
            .filter(compliance_audit_log_model::Column::Action.eq(action))
            .order_by_desc(compliance_audit_log_model::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    fn range_query(
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Select<AuditLogEntity> {
        AuditLogEntity::find()
            .filter(compliance_audit_log_model::Column::TenantId.eq(tenant_id))
            .filter(compliance_audit_log_model::Column::CreatedAt.gte(start))
            .filter(compliance_audit_log_model::Column::CreatedAt.lte(end))
    }

    pub async fn find_in_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<AuditLogModel>, DbErr> {
        Self::range_query(tenant_id, start, end)
            .order_by_desc(compliance_audit_log_model::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64, DbErr> {
        AuditLogEntity::find()
            .filter(compliance_audit_log_model::Column::TenantId.eq(tenant_id))
            .count(&self.db)
            .await
    }

    pub async fn count_in_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        Self::range_query(tenant_id, start, end).count(&self.db).await
    }

    // 以下の集計は件数制限なしで期間内の全件を対象にする

    pub async fn count_by_action_in_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, DbErr> {
        Self::range_query(tenant_id, start, end)
            .select_only()
            .column(compliance_audit_log_model::Column::Action)
            .column_as(compliance_audit_log_model::Column::Id.count(), "count")
            .group_by(compliance_audit_log_model::Column::Action)
            .into_tuple()
            .all(&self.db)
            .await
    }

    pub async fn count_by_entity_type_in_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, DbErr> {
        Self::range_query(tenant_id, start, end)
            .select_only()
            .column(compliance_audit_log_model::Column::EntityType)
            .column_as(compliance_audit_log_model::Column::Id.count(), "count")
            .group_by(compliance_audit_log_model::Column::EntityType)
            .into_tuple()
            .all(&self.db)
            .await
    }

    pub async fn count_by_severity_in_range(
        &self,
        tenant_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(AuditSeverity, i64)>, DbErr> {
        Self::range_query(tenant_id, start, end)
            .select_only()
            .column(compliance_audit_log_model::Column::Severity)
            .column_as(compliance_audit_log_model::Column::Id.count(), "count")
            .group_by(compliance_audit_log_model::Column::Severity)
            .into_tuple()
            .all(&self.db)
            .await
    }
}
