// src/repository/consent_repository.rs

use crate::domain::consent_record_model::{
    self, ActiveModel as ConsentActiveModel, ConsentStatus, ConsentType, Entity as ConsentEntity,
    Model as ConsentModel,
};
use crate::domain::cookie_preference_model::{
    self, ActiveModel as CookiePreferenceActiveModel, Entity as CookiePreferenceEntity,
};
use crate::domain::user_model;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Query;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbConn, DbErr};
use uuid::Uuid;

/// 同意の対象者 (ログインユーザーまたはメールアドレスのみの見込み客)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentSubject {
    User(Uuid),
    Email(String),
}

impl ConsentSubject {
    fn condition(&self) -> Condition {
        match self {
            ConsentSubject::User(user_id) => {
                Condition::all().add(consent_record_model::Column::UserId.eq(*user_id))
            }
            ConsentSubject::Email(email) => Condition::all()
                .add(consent_record_model::Column::UserId.is_null())
                .add(consent_record_model::Column::Email.eq(email.as_str())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsentRepository {
    db: DbConn,
}

impl ConsentRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }

    pub async fn create(&self, consent: ConsentActiveModel) -> Result<ConsentModel, DbErr> {
        consent.insert(&self.db).await
    }

    pub async fn update(&self, consent: ConsentActiveModel) -> Result<ConsentModel, DbErr> {
        consent.update(&self.db).await
    }

    /// (対象者, 種別) の有効な同意を取得
    pub async fn find_active(
        &self,
        tenant_id: Uuid,
        subject: &ConsentSubject,
        consent_type: ConsentType,
    ) -> Result<Option<ConsentModel>, DbErr> {
        ConsentEntity::find()
            .filter(consent_record_model::Column::TenantId.eq(tenant_id))
            .filter(subject.condition())
            .filter(consent_record_model::Column::ConsentType.eq(consent_type))
            .filter(consent_record_model::Column::Status.eq(ConsentStatus::Active))
            .one(&self.db)
            .await
    }

    pub async fn find_active_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<ConsentModel>, DbErr> {
        ConsentEntity::find()
            .filter(consent_record_model::Column::TenantId.eq(tenant_id))
            .filter(consent_record_model::Column::UserId.eq(user_id))
            .filter(consent_record_model::Column::Status.eq(ConsentStatus::Active))
            .order_by_asc(consent_record_model::Column::ConsentType)
            .all(&self.db)
            .await
    }

    /// 全履歴 (新しい順)
    pub async fn find_history_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<ConsentModel>, DbErr> {
        ConsentEntity::find()
            .filter(consent_record_model::Column::TenantId.eq(tenant_id))
            .filter(consent_record_model::Column::UserId.eq(user_id))
            .order_by_desc(consent_record_model::Column::UpdatedAt)
            .all(&self.db)
            .await
    }

    /// ユーザーの有効な同意をまとめて撤回
    pub async fn withdraw_all_for_user<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = ConsentEntity::update_many()
            .set(ConsentActiveModel {
                status: Set(ConsentStatus::Withdrawn),
                withdrawn_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(consent_record_model::Column::TenantId.eq(tenant_id))
            .filter(consent_record_model::Column::UserId.eq(user_id))
            .filter(consent_record_model::Column::Status.eq(ConsentStatus::Active))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_all_for_user<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let result = ConsentEntity::delete_many()
            .filter(consent_record_model::Column::TenantId.eq(tenant_id))
            .filter(consent_record_model::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// ポリシー改定で旧バージョンの有効な同意を失効させる
    pub async fn expire_for_policy(
        &self,
        consent_type: ConsentType,
        old_version: &str,
        tenant_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let mut update = ConsentEntity::update_many()
            .set(ConsentActiveModel {
                status: Set(ConsentStatus::Expired),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(consent_record_model::Column::ConsentType.eq(consent_type))
            .filter(consent_record_model::Column::ConsentVersion.eq(old_version))
            .filter(consent_record_model::Column::Status.eq(ConsentStatus::Active));

        if let Some(tenant_id) = tenant_id {
            update = update.filter(consent_record_model::Column::TenantId.eq(tenant_id));
        }

        Ok(update.exec(&self.db).await?.rows_affected)
    }

    /// 種別×状態ごとの件数
    pub async fn count_by_type_and_status(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<(ConsentType, ConsentStatus, i64)>, DbErr> {
        ConsentEntity::find()
            .select_only()
            .column(consent_record_model::Column::ConsentType)
            .column(consent_record_model::Column::Status)
            .column_as(consent_record_model::Column::Id.count(), "count")
            .filter(consent_record_model::Column::TenantId.eq(tenant_id))
            .group_by(consent_record_model::Column::ConsentType)
            .group_by(consent_record_model::Column::Status)
            .into_tuple()
            .all(&self.db)
            .await
    }

    /// 有効なプライバシーポリシー同意を持たないユーザー数
    pub async fn count_users_without_privacy_consent(&self, tenant_id: Uuid) -> Result<u64, DbErr> {
        let consented = Query::select()
            .column(consent_record_model::Column::UserId)
            .from(ConsentEntity)
            .and_where(consent_record_model::Column::TenantId.eq(tenant_id))
            .and_where(consent_record_model::Column::ConsentType.eq(ConsentType::Privacy))
            .and_where(consent_record_model::Column::Status.eq(ConsentStatus::Active))
            .and_where(consent_record_model::Column::UserId.is_not_null())
            .to_owned();

        user_model::Entity::find()
            .filter(user_model::Column::TenantId.eq(tenant_id))
            .filter(user_model::Column::AnonymizedAt.is_null())
            .filter(user_model::Column::Id.not_in_subquery(consented))
            .count(&self.db)
            .await
    }

    // --- Cookie設定 ---

    pub async fn create_cookie_preference(
        &self,
        preference: CookiePreferenceActiveModel,
    ) -> Result<cookie_preference_model::Model, DbErr> {
        preference.insert(&self.db).await
    }

    pub async fn find_latest_cookie_preference_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<cookie_preference_model::Model>, DbErr> {
        CookiePreferenceEntity::find()
            .filter(cookie_preference_model::Column::SessionId.eq(session_id))
            .order_by_desc(cookie_preference_model::Column::CreatedAt)
            .one(&self.db)
            .await
    }

    pub async fn find_latest_cookie_preference_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<cookie_preference_model::Model>, DbErr> {
        CookiePreferenceEntity::find()
            .filter(cookie_preference_model::Column::TenantId.eq(tenant_id))
            .filter(cookie_preference_model::Column::UserId.eq(user_id))
            .order_by_desc(cookie_preference_model::Column::CreatedAt)
            .one(&self.db)
            .await
    }
}
