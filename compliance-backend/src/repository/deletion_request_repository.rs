// src/repository/deletion_request_repository.rs

//! 削除リクエストの状態遷移はすべて「期待する現状態」を条件にした UPDATE で行う

use crate::domain::deletion_request_model::{
    self, ActiveModel as DeletionActiveModel, DeletionStatus, Entity as DeletionEntity,
    Model as DeletionModel,
};
use chrono::{DateTime, Utc};
use sea_orm::{entity::*, query::*, ConnectionTrait, DbConn, DbErr};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeletionRequestRepository {
    db: DbConn,
}

impl DeletionRequestRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    /// 作成 (未完了リクエストが既にあれば部分ユニークインデックス違反になる)
    pub async fn create(&self, request: DeletionActiveModel) -> Result<DeletionModel, DbErr> {
        request.insert(&self.db).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<DeletionModel>, DbErr> {
        DeletionEntity::find_by_id(id).one(&self.db).await
    }

    pub async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<DeletionModel>, DbErr> {
        DeletionEntity::find()
            .filter(deletion_request_model::Column::TokenHash.eq(token_hash))
            .one(&self.db)
            .await
    }

    pub async fn find_by_certificate_number(
        &self,
        certificate_number: &str,
    ) -> Result<Option<DeletionModel>, DbErr> {
        DeletionEntity::find()
            .filter(deletion_request_model::Column::CertificateNumber.eq(certificate_number))
            .filter(deletion_request_model::Column::Status.eq(DeletionStatus::Completed))
            .one(&self.db)
            .await
    }

    /// ユーザーの未完了リクエスト
    pub async fn find_open_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DeletionModel>, DbErr> {
        DeletionEntity::find()
            .filter(deletion_request_model::Column::TenantId.eq(tenant_id))
            .filter(deletion_request_model::Column::UserId.eq(user_id))
            .filter(deletion_request_model::Column::Status.is_in(DeletionStatus::open_statuses()))
            .one(&self.db)
            .await
    }

    pub async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<DeletionStatus>,
    ) -> Result<Vec<DeletionModel>, DbErr> {
        let mut query = DeletionEntity::find()
            .filter(deletion_request_model::Column::TenantId.eq(tenant_id));
        if let Some(status) = status {
            query = query.filter(deletion_request_model::Column::Status.eq(status));
        }
        query
            .order_by_desc(deletion_request_model::Column::CreatedAt)
            .all(&self.db)
            .await
    }

    /// 起動時に再開すべきリクエスト (全テナント)
    pub async fn find_resumable(&self) -> Result<Vec<DeletionModel>, DbErr> {
        DeletionEntity::find()
            .filter(deletion_request_model::Column::Status.is_in([
                DeletionStatus::Confirmed,
                DeletionStatus::Processing,
            ]))
            .order_by_asc(deletion_request_model::Column::ConfirmedAt)
            .all(&self.db)
            .await
    }

    /// 指定日時より前に作成され、まだ完了していないリクエスト数
    pub async fn count_open_created_before(
        &self,
        tenant_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        DeletionEntity::find()
            .filter(deletion_request_model::Column::TenantId.eq(tenant_id))
            .filter(deletion_request_model::Column::Status.is_in(DeletionStatus::open_statuses()))
            .filter(deletion_request_model::Column::CreatedAt.lt(before))
            .count(&self.db)
            .await
    }

    /// 処理に失敗して pending に戻されたリクエスト数
    pub async fn count_failed_pending(&self, tenant_id: Uuid) -> Result<u64, DbErr> {
        DeletionEntity::find()
            .filter(deletion_request_model::Column::TenantId.eq(tenant_id))
            .filter(deletion_request_model::Column::Status.eq(DeletionStatus::Pending))
            .filter(deletion_request_model::Column::Notes.is_not_null())
            .count(&self.db)
            .await
    }

    // --- 状態遷移 (compare-and-swap) ---

    async fn transition<C: ConnectionTrait>(
        conn: &C,
        condition: Condition,
        from: &[DeletionStatus],
        changes: DeletionActiveModel,
    ) -> Result<bool, DbErr> {
        let result = DeletionEntity::update_many()
            .set(changes)
            .filter(condition)
            .filter(deletion_request_model::Column::Status.is_in(from.iter().copied()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// トークンが一致し pending のものだけを confirmed にする
    pub async fn confirm_by_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        Self::transition(
            &self.db,
            Condition::all().add(deletion_request_model::Column::TokenHash.eq(token_hash)),
            &[DeletionStatus::Pending],
            DeletionActiveModel {
                status: Set(DeletionStatus::Confirmed),
                confirmed_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    /// confirmed → processing (再開時は processing のままでも可)
    pub async fn mark_processing(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        Self::transition(
            &self.db,
            Condition::all().add(deletion_request_model::Column::Id.eq(id)),
            &[DeletionStatus::Confirmed, DeletionStatus::Processing],
            DeletionActiveModel {
                status: Set(DeletionStatus::Processing),
                processed_at: Set(Some(now)),
                notes: Set(None),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_completed<C: ConnectionTrait>(
        conn: &C,
        id: Uuid,
        certificate_number: &str,
        certificate_url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        Self::transition(
            conn,
            Condition::all().add(deletion_request_model::Column::Id.eq(id)),
            &[DeletionStatus::Processing],
            DeletionActiveModel {
                status: Set(DeletionStatus::Completed),
                completed_at: Set(Some(now)),
                certificate_number: Set(Some(certificate_number.to_string())),
                certificate_url: Set(Some(certificate_url.to_string())),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    /// 処理失敗時に pending へ戻し、確認トークンを差し替える
    pub async fn revert_to_pending(
        &self,
        id: Uuid,
        new_token_hash: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        Self::transition(
            &self.db,
            Condition::all().add(deletion_request_model::Column::Id.eq(id)),
            &[DeletionStatus::Confirmed, DeletionStatus::Processing],
            DeletionActiveModel {
                status: Set(DeletionStatus::Pending),
                token_hash: Set(new_token_hash.to_string()),
                confirmed_at: Set(None),
                notes: Set(Some(notes.to_string())),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    /// 本人の pending リクエストのみ取り消せる
    pub async fn cancel(&self, id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        Self::transition(
            &self.db,
            Condition::all()
                .add(deletion_request_model::Column::Id.eq(id))
                .add(deletion_request_model::Column::UserId.eq(user_id)),
            &[DeletionStatus::Pending],
            DeletionActiveModel {
                status: Set(DeletionStatus::Cancelled),
                cancelled_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }
}
