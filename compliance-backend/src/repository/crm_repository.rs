// src/repository/crm_repository.rs

//! CRM側のテーブル (リード、オーナー、借主、訪問、やり取り、財務) へのアクセス

use crate::domain::{
    finance_entry_model, interaction_model, lead_model, owner_model, renter_model, visit_model,
};
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbConn, DbErr};
use uuid::Uuid;

/// テナント内のエンティティ件数 (データインベントリ用)
#[derive(Debug, Clone, Default)]
pub struct CrmCounts {
    pub leads: u64,
    pub owners: u64,
    pub renters: u64,
    pub visits: u64,
    pub interactions: u64,
    pub finance_entries: u64,
}

#[derive(Debug, Clone)]
pub struct CrmRepository {
    db: DbConn,
}

impl CrmRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    // --- メールアドレスで紐づく個人データ ---

    pub async fn find_leads_by_email<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Vec<lead_model::Model>, DbErr> {
        lead_model::Entity::find()
            .filter(lead_model::Column::TenantId.eq(tenant_id))
            .filter(lead_model::Column::Email.eq(email))
            .all(conn)
            .await
    }

    pub async fn find_owners_by_email<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Vec<owner_model::Model>, DbErr> {
        owner_model::Entity::find()
            .filter(owner_model::Column::TenantId.eq(tenant_id))
            .filter(owner_model::Column::Email.eq(email))
            .all(conn)
            .await
    }

    pub async fn find_renters_by_email<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Vec<renter_model::Model>, DbErr> {
        renter_model::Entity::find()
            .filter(renter_model::Column::TenantId.eq(tenant_id))
            .filter(renter_model::Column::Email.eq(email))
            .all(conn)
            .await
    }

    pub async fn overwrite_lead<C: ConnectionTrait>(
        conn: &C,
        lead: lead_model::Model,
    ) -> Result<lead_model::Model, DbErr> {
        lead.into_active_model().reset_all().update(conn).await
    }

    pub async fn overwrite_owner<C: ConnectionTrait>(
        conn: &C,
        owner: owner_model::Model,
    ) -> Result<owner_model::Model, DbErr> {
        owner.into_active_model().reset_all().update(conn).await
    }

    pub async fn overwrite_renter<C: ConnectionTrait>(
        conn: &C,
        renter: renter_model::Model,
    ) -> Result<renter_model::Model, DbErr> {
        renter.into_active_model().reset_all().update(conn).await
    }

    // --- 担当の解除 (物理削除時に参照を残さない) ---

    pub async fn unassign_leads<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let result = lead_model::Entity::update_many()
            .col_expr(lead_model::Column::AssignedTo, Expr::value(Option::<Uuid>::None))
            .filter(lead_model::Column::TenantId.eq(tenant_id))
            .filter(lead_model::Column::AssignedTo.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn unassign_visits<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let result = visit_model::Entity::update_many()
            .col_expr(visit_model::Column::AssignedTo, Expr::value(Option::<Uuid>::None))
            .filter(visit_model::Column::TenantId.eq(tenant_id))
            .filter(visit_model::Column::AssignedTo.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_interactions_for_user<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let result = interaction_model::Entity::delete_many()
            .filter(interaction_model::Column::TenantId.eq(tenant_id))
            .filter(interaction_model::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    // --- エクスポート用の読み取り ---

    pub async fn find_interactions_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<interaction_model::Model>, DbErr> {
        interaction_model::Entity::find()
            .filter(interaction_model::Column::TenantId.eq(tenant_id))
            .filter(interaction_model::Column::UserId.eq(user_id))
            .order_by_desc(interaction_model::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn find_assigned_leads(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<lead_model::Model>, DbErr> {
        lead_model::Entity::find()
            .filter(lead_model::Column::TenantId.eq(tenant_id))
            .filter(lead_model::Column::AssignedTo.eq(user_id))
            .order_by_desc(lead_model::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    pub async fn find_assigned_visits(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<visit_model::Model>, DbErr> {
        visit_model::Entity::find()
            .filter(visit_model::Column::TenantId.eq(tenant_id))
            .filter(visit_model::Column::AssignedTo.eq(user_id))
            .order_by_desc(visit_model::Column::ScheduledAt)
            .all(&self.db)
            .await
    }

    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<CrmCounts, DbErr> {
        Ok(CrmCounts {
            leads: lead_model::Entity::find()
                .filter(lead_model::Column::TenantId.eq(tenant_id))
                .count(&self.db)
                .await?,
            owners: owner_model::Entity::find()
                .filter(owner_model::Column::TenantId.eq(tenant_id))
                .count(&self.db)
                .await?,
            renters: renter_model::Entity::find()
                .filter(renter_model::Column::TenantId.eq(tenant_id))
                .count(&self.db)
                .await?,
            visits: visit_model::Entity::find()
                .filter(visit_model::Column::TenantId.eq(tenant_id))
                .count(&self.db)
                .await?,
            interactions: interaction_model::Entity::find()
                .filter(interaction_model::Column::TenantId.eq(tenant_id))
                .count(&self.db)
                .await?,
            finance_entries: finance_entry_model::Entity::find()
                .filter(finance_entry_model::Column::TenantId.eq(tenant_id))
                .count(&self.db)
                .await?,
        })
    }
}
