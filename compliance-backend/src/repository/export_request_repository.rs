// src/repository/export_request_repository.rs

use crate::domain::export_request_model::{
    self, ActiveModel as ExportActiveModel, Entity as ExportEntity, ExportStatus,
    Model as ExportModel,
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, DbConn, DbErr};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExportRequestRepository {
    db: DbConn,
}

impl ExportRequestRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: ExportActiveModel) -> Result<ExportModel, DbErr> {
        request.insert(&self.db).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ExportModel>, DbErr> {
        ExportEntity::find_by_id(id).one(&self.db).await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[ExportStatus],
        changes: ExportActiveModel,
    ) -> Result<bool, DbErr> {
        let result = ExportEntity::update_many()
            .set(changes)
            .filter(export_request_model::Column::Id.eq(id))
            .filter(export_request_model::Column::Status.is_in(from.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// pending → processing (リトライ時は processing のまま)
    pub async fn mark_processing(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        self.transition(
            id,
            &[ExportStatus::Pending, ExportStatus::Processing],
            ExportActiveModel {
                status: Set(ExportStatus::Processing),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_completed(
        &self,
        id: Uuid,
        file_name: &str,
        file_size: i64,
        file_url: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        self.transition(
            id,
            &[ExportStatus::Processing],
            ExportActiveModel {
                status: Set(ExportStatus::Completed),
                file_name: Set(Some(file_name.to_string())),
                file_size: Set(Some(file_size)),
                file_url: Set(Some(file_url.to_string())),
                completed_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        self.transition(
            id,
            &[ExportStatus::Pending, ExportStatus::Processing],
            ExportActiveModel {
                status: Set(ExportStatus::Failed),
                error_message: Set(Some(error_message.to_string())),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    /// 期限切れの completed を failed にする (ファイル参照も外す)
    pub async fn mark_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DbErr> {
        self.transition(
            id,
            &[ExportStatus::Completed],
            ExportActiveModel {
                status: Set(ExportStatus::Failed),
                error_message: Set(Some("Export expired".to_string())),
                file_url: Set(None),
                updated_at: Set(now),
                ..Default::default()
            },
        )
        .await
    }

    /// ダウンロード回数を加算
    pub async fn record_download(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), DbErr> {
        ExportEntity::update_many()
            .col_expr(
                export_request_model::Column::DownloadCount,
                Expr::col(export_request_model::Column::DownloadCount).add(1),
            )
            .col_expr(export_request_model::Column::DownloadedAt, Expr::value(Some(now)))
            .col_expr(export_request_model::Column::UpdatedAt, Expr::value(now))
            .filter(export_request_model::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// 期限を過ぎた completed のエクスポート
    pub async fn find_expired_completed(
        &self,
        now: DateTime<Utc>,
        tenant_id: Option<Uuid>,
    ) -> Result<Vec<ExportModel>, DbErr> {
        let mut query = ExportEntity::find()
            .filter(export_request_model::Column::Status.eq(ExportStatus::Completed))
            .filter(export_request_model::Column::ExpiresAt.lt(now));
        if let Some(tenant_id) = tenant_id {
            query = query.filter(export_request_model::Column::TenantId.eq(tenant_id));
        }
        query.all(&self.db).await
    }

    pub async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64, DbErr> {
        ExportEntity::find()
            .filter(export_request_model::Column::TenantId.eq(tenant_id))
            .count(&self.db)
            .await
    }
}
