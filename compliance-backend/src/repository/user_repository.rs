// src/repository/user_repository.rs

use crate::domain::session_model::{self, Entity as SessionEntity};
use crate::domain::user_model::{self, ActiveModel as UserActiveModel, Entity as UserEntity};
use sea_orm::entity::*;
use sea_orm::{ConnectionTrait, DbConn, DbErr, PaginatorTrait, QueryFilter};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct UserRepository {
    db: DbConn,
}

impl UserRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// ユーザーをIDで検索 (テナント内のみ)
    pub async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<user_model::Model>, DbErr> {
        Self::find_by_id_in(&self.db, tenant_id, id).await
    }

    pub async fn find_by_id_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<user_model::Model>, DbErr> {
        UserEntity::find_by_id(id)
            .filter(user_model::Column::TenantId.eq(tenant_id))
            .one(conn)
            .await
    }

    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64, DbErr> {
        UserEntity::find()
            .filter(user_model::Column::TenantId.eq(tenant_id))
            .count(&self.db)
            .await
    }

    /// 匿名化済みのモデルで行全体を上書きする (主キーは維持)
    pub async fn overwrite<C: ConnectionTrait>(
        conn: &C,
        user: user_model::Model,
    ) -> Result<user_model::Model, DbErr> {
        let active_model: UserActiveModel = user.into_active_model().reset_all();
        active_model.update(conn).await
    }

    /// ユーザー行を物理削除
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = UserEntity::delete_by_id(id).exec(conn).await?;
        Ok(result.rows_affected)
    }

    // --- セッション ---

    /// ユーザーの全セッションを削除 (強制ログアウト)
    pub async fn delete_sessions<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> Result<u64, DbErr> {
        let result = SessionEntity::delete_many()
            .filter(session_model::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
