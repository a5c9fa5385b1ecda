// compliance-backend/src/service/consent_service.rs

use crate::domain::compliance_audit_log_model::{
    ActorType, AuditAction, AuditSeverity, ComplianceAuditBuilder,
};
use crate::domain::consent_record_model::{
    ActiveModel as ConsentActiveModel, ConsentStatus, ConsentType, Model as ConsentModel,
};
use crate::domain::cookie_preference_model::{
    ActiveModel as CookiePreferenceActiveModel, Model as CookiePreferenceModel,
};
use crate::error::{AppError, AppResult};
use crate::repository::consent_repository::{ConsentRepository, ConsentSubject};
use crate::service::compliance_audit_service::{AuditContext, ComplianceAuditService};
use crate::utils::error_helper::not_found_error;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::IntoActiveModel;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 同意付与の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentOutcome {
    Created,
    Updated,
    AlreadyRegistered,
}

impl ConsentOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            ConsentOutcome::Created => "Consentimento registrado com sucesso",
            ConsentOutcome::Updated => "Consentimento atualizado para a nova versão",
            ConsentOutcome::AlreadyRegistered => "Consentimento já registrado",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveConsentResult {
    pub consent_id: Uuid,
    pub outcome: ConsentOutcome,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct GiveConsentParams {
    pub tenant_id: Uuid,
    pub subject: ConsentSubject,
    pub consent_type: ConsentType,
    pub consent_version: String,
    pub purpose: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, serde::Deserialize)]
pub struct CookieFlags {
    pub essential: bool,
    pub analytics: bool,
    pub marketing: bool,
    pub personalization: bool,
}

impl CookieFlags {
    /// 個別に同意記録を作る (必須Cookie以外の) 種別
    pub fn consent_types(&self) -> Vec<ConsentType> {
        let mut types = Vec::new();
        if self.analytics {
            types.push(ConsentType::Analytics);
        }
        if self.marketing {
            types.push(ConsentType::Marketing);
        }
        // パーソナライズ用Cookieは cookies 種別で記録する
        if self.personalization {
            types.push(ConsentType::Cookies);
        }
        types
    }
}

#[derive(Debug, Clone)]
pub struct CookieConsentParams {
    pub session_id: String,
    pub flags: CookieFlags,
    pub consent_version: String,
    /// 同意を記録する対象者 (ログインユーザー、またはメールを伝えた訪問者)
    pub subject: Option<(Uuid, ConsentSubject)>,
}

impl CookieConsentParams {
    fn tenant_id(&self) -> Option<Uuid> {
        self.subject.as_ref().map(|(tenant_id, _)| *tenant_id)
    }

    fn user_id(&self) -> Option<Uuid> {
        match &self.subject {
            Some((_, ConsentSubject::User(user_id))) => Some(*user_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentStatusCounts {
    pub active: i64,
    pub withdrawn: i64,
    pub expired: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentStatistics {
    pub tenant_id: Uuid,
    pub by_type: BTreeMap<String, ConsentStatusCounts>,
    pub total_active: i64,
    pub total_withdrawn: i64,
    pub total_expired: i64,
}

pub struct ConsentService {
    consent_repo: Arc<ConsentRepository>,
    audit_service: Arc<ComplianceAuditService>,
}

impl ConsentService {
    pub fn new(
        consent_repo: Arc<ConsentRepository>,
        audit_service: Arc<ComplianceAuditService>,
    ) -> Self {
        Self {
            consent_repo,
            audit_service,
        }
    }

    /// 同意を付与する
    ///
    /// 同じバージョンの有効な同意があれば何もしない。バージョンが異なれば既存レコードを更新する。
    pub async fn give_consent(
        &self,
        params: GiveConsentParams,
        context: &AuditContext,
    ) -> AppResult<GiveConsentResult> {
        // 同時リクエストで部分ユニークインデックスに衝突した場合は、もう一度読み直して判定する
        for _ in 0..2 {
            let existing = self
                .consent_repo
                .find_active(params.tenant_id, &params.subject, params.consent_type)
                .await?;

            let result = match existing {
                Some(record) if record.consent_version == params.consent_version => {
                    return Ok(GiveConsentResult {
                        consent_id: record.id,
                        outcome: ConsentOutcome::AlreadyRegistered,
                        message: ConsentOutcome::AlreadyRegistered.message().to_string(),
                    });
                }
                Some(record) => self.update_version(record, &params, context).await,
                None => self.create_record(&params, context).await,
            };

            match result {
                Err(AppError::DbErr(ref e)) if AppError::is_unique_violation(e) => continue,
                other => {
                    let (record, outcome) = other?;
                    self.audit_service
                        .log_consent_event(
                            params.tenant_id,
                            record.user_id,
                            record.id,
                            record.consent_type,
                            AuditAction::ConsentGiven,
                            json!({
                                "version": record.consent_version,
                                "outcome": outcome,
                            }),
                            context,
                        )
                        .await;

                    return Ok(GiveConsentResult {
                        consent_id: record.id,
                        outcome,
                        message: outcome.message().to_string(),
                    });
                }
            }
        }

        Err(AppError::Conflict(
            "Consentimento sendo registrado por outra requisição".to_string(),
        ))
    }

    async fn create_record(
        &self,
        params: &GiveConsentParams,
        context: &AuditContext,
    ) -> AppResult<(ConsentModel, ConsentOutcome)> {
        let now = Utc::now();
        let (user_id, email) = match &params.subject {
            ConsentSubject::User(user_id) => (Some(*user_id), None),
            ConsentSubject::Email(email) => (None, Some(email.clone())),
        };

        let record = self
            .consent_repo
            .create(ConsentActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(params.tenant_id),
                user_id: Set(user_id),
                email: Set(email),
                consent_type: Set(params.consent_type),
                consent_version: Set(params.consent_version.clone()),
                status: Set(ConsentStatus::Active),
                purpose: Set(params.purpose.clone()),
                accepted_at: Set(now),
                withdrawn_at: Set(None),
                ip_address: Set(context.ip_address.clone()),
                user_agent: Set(context.user_agent.clone()),
                metadata: Set(params.metadata.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await?;

        Ok((record, ConsentOutcome::Created))
    }

    async fn update_version(
        &self,
        record: ConsentModel,
        params: &GiveConsentParams,
        context: &AuditContext,
    ) -> AppResult<(ConsentModel, ConsentOutcome)> {
        let now = Utc::now();
        let previous_version = record.consent_version.clone();
        let mut active_model = record.into_active_model();
        active_model.consent_version = Set(params.consent_version.clone());
        active_model.accepted_at = Set(now);
        active_model.withdrawn_at = Set(None);
        active_model.updated_at = Set(now);
        active_model.ip_address = Set(context.ip_address.clone());
        active_model.user_agent = Set(context.user_agent.clone());
        if params.purpose.is_some() {
            active_model.purpose = Set(params.purpose.clone());
        }
        if params.metadata.is_some() {
            active_model.metadata = Set(params.metadata.clone());
        }

        let record = self.consent_repo.update(active_model).await?;

        if let Some(user_id) = record.user_id {
            self.audit_service
                .log_data_modification(
                    record.tenant_id,
                    user_id,
                    Some(user_id),
                    ActorType::User,
                    "consent",
                    record.id,
                    Some(json!({ "consentVersion": previous_version })),
                    Some(json!({ "consentVersion": record.consent_version })),
                    context,
                )
                .await;
        }

        Ok((record, ConsentOutcome::Updated))
    }

    /// 同意を撤回する (有効な同意がなければ NotFound)
    pub async fn withdraw_consent(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        consent_type: ConsentType,
        context: &AuditContext,
    ) -> AppResult<ConsentModel> {
        let record = self
            .consent_repo
            .find_active(tenant_id, &ConsentSubject::User(user_id), consent_type)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Nenhum consentimento ativo encontrado para este tipo",
                    consent_type.as_str(),
                    "consent_service::withdraw_consent",
                )
            })?;

        let now = Utc::now();
        let mut active_model = record.into_active_model();
        active_model.status = Set(ConsentStatus::Withdrawn);
        active_model.withdrawn_at = Set(Some(now));
        active_model.updated_at = Set(now);
        let record = self.consent_repo.update(active_model).await?;

        self.audit_service
            .log_consent_event(
                tenant_id,
                Some(user_id),
                record.id,
                consent_type,
                AuditAction::ConsentWithdrawn,
                json!({ "version": record.consent_version }),
                context,
            )
            .await;

        Ok(record)
    }

    pub async fn has_active_consent(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        consent_type: ConsentType,
    ) -> AppResult<bool> {
        Ok(self
            .consent_repo
            .find_active(tenant_id, &ConsentSubject::User(user_id), consent_type)
            .await?
            .is_some())
    }

    pub async fn get_active_consents(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<ConsentModel>> {
        Ok(self.consent_repo.find_active_by_user(tenant_id, user_id).await?)
    }

    pub async fn get_consent_history(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Vec<ConsentModel>> {
        Ok(self.consent_repo.find_history_by_user(tenant_id, user_id).await?)
    }

    /// ポリシー改定: 旧バージョンの有効な同意を expired にする (再取得は別のフロー)
    pub async fn update_consents_for_new_policy(
        &self,
        consent_type: ConsentType,
        old_version: &str,
        new_version: &str,
        tenant_id: Option<Uuid>,
        actor_id: Option<Uuid>,
        context: &AuditContext,
    ) -> AppResult<u64> {
        let expired = self
            .consent_repo
            .expire_for_policy(consent_type, old_version, tenant_id, Utc::now())
            .await?;

        info!(
            consent_type = consent_type.as_str(),
            old_version = %old_version,
            new_version = %new_version,
            expired,
            "Consents expired for new policy version"
        );

        // 全テナント対象の場合は nil テナントで記録する
        let builder = ComplianceAuditBuilder::new(
            tenant_id.unwrap_or(Uuid::nil()),
            AuditAction::ConsentPolicyUpdated,
            "consent",
        )
        .actor(
            if actor_id.is_some() {
                ActorType::Admin
            } else {
                ActorType::System
            },
            actor_id,
        )
        .details(json!({
            "consentType": consent_type.as_str(),
            "oldVersion": old_version,
            "newVersion": new_version,
            "expiredCount": expired,
        }))
        .severity(AuditSeverity::Warning)
        .ip_address(context.ip_address.clone())
        .user_agent(context.user_agent.clone());
        self.audit_service.log(builder).await;

        Ok(expired)
    }

    /// Cookie設定を保存し、許可された種別ごとに同意を記録する
    pub async fn set_cookie_consent(
        &self,
        params: CookieConsentParams,
        context: &AuditContext,
    ) -> AppResult<CookiePreferenceModel> {
        let now = Utc::now();
        let preference = self
            .consent_repo
            .create_cookie_preference(CookiePreferenceActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(params.tenant_id()),
                user_id: Set(params.user_id()),
                session_id: Set(params.session_id.clone()),
                // 必須Cookieは常に有効
                essential: Set(true),
                analytics: Set(params.flags.analytics),
                marketing: Set(params.flags.marketing),
                personalization: Set(params.flags.personalization),
                consent_version: Set(params.consent_version.clone()),
                ip_address: Set(context.ip_address.clone()),
                user_agent: Set(context.user_agent.clone()),
                created_at: Set(now),
            })
            .await?;

        // 対象者を特定できないセッションは設定の保存のみ
        if let Some((tenant_id, subject)) = params.subject.clone() {
            for consent_type in params.flags.consent_types() {
                self.give_consent(
                    GiveConsentParams {
                        tenant_id,
                        subject: subject.clone(),
                        consent_type,
                        consent_version: params.consent_version.clone(),
                        purpose: Some("Preferências de cookies".to_string()),
                        metadata: Some(json!({
                            "cookiePreferenceId": preference.id,
                            "sessionId": preference.session_id,
                        })),
                    },
                    context,
                )
                .await?;
            }

            let mut builder =
                ComplianceAuditBuilder::new(tenant_id, AuditAction::CookieConsentSet, "cookie_preference")
                    .entity_id(preference.id)
                    .details(json!({
                        "analytics": preference.analytics,
                        "marketing": preference.marketing,
                        "personalization": preference.personalization,
                        "version": preference.consent_version,
                    }))
                    .ip_address(context.ip_address.clone())
                    .user_agent(context.user_agent.clone());
            if let ConsentSubject::User(user_id) = subject {
                builder = builder.user_id(user_id).actor(ActorType::User, Some(user_id));
            }
            self.audit_service.log(builder).await;
        }

        Ok(preference)
    }

    /// 最新のCookie設定 (ログイン中はユーザー、そうでなければセッションで検索)
    pub async fn get_cookie_preferences(
        &self,
        session_id: Option<&str>,
        principal: Option<(Uuid, Uuid)>,
    ) -> AppResult<Option<CookiePreferenceModel>> {
        if let Some((tenant_id, user_id)) = principal {
            if let Some(preference) = self
                .consent_repo
                .find_latest_cookie_preference_by_user(tenant_id, user_id)
                .await?
            {
                return Ok(Some(preference));
            }
        }

        match session_id {
            Some(session_id) => Ok(self
                .consent_repo
                .find_latest_cookie_preference_by_session(session_id)
                .await?),
            None => Ok(None),
        }
    }

    pub async fn get_consent_statistics(&self, tenant_id: Uuid) -> AppResult<ConsentStatistics> {
        let rows = self.consent_repo.count_by_type_and_status(tenant_id).await?;

        let mut by_type: BTreeMap<String, ConsentStatusCounts> = BTreeMap::new();
        let (mut total_active, mut total_withdrawn, mut total_expired) = (0, 0, 0);

        for (consent_type, status, count) in rows {
            let entry = by_type.entry(consent_type.as_str().to_string()).or_default();
            match status {
                ConsentStatus::Active => {
                    entry.active += count;
                    total_active += count;
                }
                ConsentStatus::Withdrawn => {
                    entry.withdrawn += count;
                    total_withdrawn += count;
                }
                ConsentStatus::Expired => {
                    entry.expired += count;
                    total_expired += count;
                }
            }
        }

        Ok(ConsentStatistics {
            tenant_id,
            by_type,
            total_active,
            total_withdrawn,
            total_expired,
        })
    }
}
