// src/repository/data_breach_repository.rs

use crate::domain::data_breach_model::{
    self, ActiveModel as BreachActiveModel, BreachSeverity, BreachStatus, Entity as BreachEntity,
    Model as BreachModel,
};
use sea_orm::{entity::*, query::*, DbConn, DbErr};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DataBreachRepository {
    db: DbConn,
}

impl DataBreachRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create(&self, breach: BreachActiveModel) -> Result<BreachModel, DbErr> {
        breach.insert(&self.db).await
    }

    pub async fn update(&self, breach: BreachActiveModel) -> Result<BreachModel, DbErr> {
        breach.update(&self.db).await
    }

    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<BreachModel>, DbErr> {
        BreachEntity::find_by_id(id)
            .filter(data_breach_model::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await
    }

    pub async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<BreachStatus>,
    ) -> Result<Vec<BreachModel>, DbErr> {
        let mut query =
            BreachEntity::find().filter(data_breach_model::Column::TenantId.eq(tenant_id));
        if let Some(status) = status {
            query = query.filter(data_breach_model::Column::Status.eq(status));
        }
        query
            .order_by_desc(data_breach_model::Column::DetectedAt)
            .all(&self.db)
            .await
    }

    /// 未解決のインシデント数 (重大度別)
    pub async fn count_open_by_severity(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<(BreachSeverity, i64)>, DbErr> {
        BreachEntity::find()
            .select_only()
            .column(data_breach_model::Column::Severity)
            .column_as(data_breach_model::Column::Id.count(), "count")
            .filter(data_breach_model::Column::TenantId.eq(tenant_id))
            .filter(data_breach_model::Column::Status.ne(BreachStatus::Resolved))
            .group_by(data_breach_model::Column::Severity)
            .into_tuple()
            .all(&self.db)
            .await
    }
}
