// compliance-backend/src/service/deletion_service.rs

//! アカウント削除ワークフロー
//!
//! `pending → confirmed → processing → completed`。確認前のみ取り消し可能。
//! 処理はバックグラウンドジョブで行い、最終的に失敗した場合は新しい確認トークンを発行して
//! `pending` に戻す (古いトークンは使えなくなる)。

use crate::db::DbPool;
use crate::domain::anonymization::{
    anonymize_lead, anonymize_name, anonymize_owner, anonymize_renter, anonymize_user,
};
use crate::domain::compliance_audit_log_model::{
    ActorType, AuditAction, AuditSeverity, ComplianceAuditBuilder, LegalBasis,
};
use crate::domain::deletion_request_model::{
    ActiveModel as DeletionActiveModel, DeletionStatus, DeletionType, Model as DeletionModel,
};
use crate::domain::retention_policy::{
    get_data_retention_rules, RetentionPolicy, HARD_DELETE_ENTITIES,
};
use crate::domain::user_model::Model as UserModel;
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::repository::consent_repository::ConsentRepository;
use crate::repository::crm_repository::CrmRepository;
use crate::repository::deletion_request_repository::DeletionRequestRepository;
use crate::repository::user_repository::UserRepository;
use crate::service::certificate_service::{
    generate_certificate_number, is_valid_certificate_number, CertificateDetails,
    CertificateService,
};
use crate::service::compliance_audit_service::{AuditContext, ComplianceAuditService};
use crate::service::job_runner::JobRunner;
use crate::utils::email::EmailService;
use crate::utils::error_helper::{conflict_error, forbidden_error, not_found_error};
use crate::utils::token::{generate_secure_token, hash_token};
use crate::utils::transaction::TransactionManager;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, ConnectionTrait};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub const DUPLICATE_REQUEST_MESSAGE: &str =
    "Já existe uma solicitação de exclusão pendente para este usuário";
pub const ALREADY_PROCESSED_MESSAGE: &str = "Esta solicitação de exclusão já foi processada";
pub const INVALID_TOKEN_MESSAGE: &str = "Token de confirmação inválido ou expirado";

#[derive(Debug, Clone)]
pub struct RequestDeletionParams {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub reason: Option<String>,
    pub deletion_type: DeletionType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequestCreated {
    pub request_id: Uuid,
    pub status: DeletionStatus,
    pub deletion_type: DeletionType,
    /// 確認用URL (生トークンを含むのはここだけ)
    #[serde(skip_serializing)]
    pub confirmation_url: String,
    pub message: String,
}

/// 処理したエンティティごとの内訳
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOperation {
    Anonymized,
    Deleted,
    Unassigned,
    Withdrawn,
}

impl EntityOperation {
    fn label(&self) -> &'static str {
        match self {
            EntityOperation::Anonymized => "anonimizado",
            EntityOperation::Deleted => "excluído",
            EntityOperation::Unassigned => "desvinculado",
            EntityOperation::Withdrawn => "revogado",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    pub entity_type: &'static str,
    pub operation: EntityOperation,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingSummary {
    pub changes: Vec<EntityChange>,
}

impl ProcessingSummary {
    fn record(&mut self, entity_type: &'static str, operation: EntityOperation, count: u64) {
        self.changes.push(EntityChange {
            entity_type,
            operation,
            count,
        });
    }

    fn certificate_lines(&self) -> Vec<(String, u64)> {
        self.changes
            .iter()
            .map(|change| {
                (
                    format!("{} ({})", change.entity_type, change.operation.label()),
                    change.count,
                )
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct DeletionService {
    db: DbPool,
    deletion_repo: Arc<DeletionRequestRepository>,
    user_repo: Arc<UserRepository>,
    audit_service: Arc<ComplianceAuditService>,
    certificate_service: Arc<CertificateService>,
    email_service: Arc<EmailService>,
    job_runner: Arc<JobRunner>,
    frontend_url: String,
}

impl DeletionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DbPool,
        deletion_repo: Arc<DeletionRequestRepository>,
        user_repo: Arc<UserRepository>,
        audit_service: Arc<ComplianceAuditService>,
        certificate_service: Arc<CertificateService>,
        email_service: Arc<EmailService>,
        job_runner: Arc<JobRunner>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            deletion_repo,
            user_repo,
            audit_service,
            certificate_service,
            email_service,
            job_runner,
            frontend_url: frontend_url.into(),
        }
    }

    fn confirmation_url(&self, token: &str) -> String {
        format!(
            "{}/privacidade/confirmar-exclusao/{}",
            self.frontend_url.trim_end_matches('/'),
            token
        )
    }

    /// 削除リクエストを作成する (データはまだ変更しない)
    pub async fn request_account_deletion(
        &self,
        params: RequestDeletionParams,
        context: &AuditContext,
    ) -> AppResult<DeletionRequestCreated> {
        let user = self
            .user_repo
            .find_by_id(params.tenant_id, params.user_id)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Usuário não encontrado",
                    &params.user_id.to_string(),
                    "request_account_deletion",
                )
            })?;

        let token = generate_secure_token();
        let now = Utc::now();
        let retention = serde_json::to_value(RetentionPolicy::default())
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        // 未完了リクエストの重複は部分ユニークインデックスで弾く
        let request = self
            .deletion_repo
            .create(DeletionActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(params.tenant_id),
                user_id: Set(params.user_id),
                token_hash: Set(hash_token(&token)),
                status: Set(DeletionStatus::Pending),
                reason: Set(params.reason.clone()),
                deletion_type: Set(params.deletion_type),
                data_retention: Set(retention),
                confirmed_at: Set(None),
                processed_at: Set(None),
                completed_at: Set(None),
                cancelled_at: Set(None),
                certificate_number: Set(None),
                certificate_url: Set(None),
                ip_address: Set(context.ip_address.clone()),
                notes: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await
            .map_err(|e| {
                if AppError::is_unique_violation(&e) {
                    conflict_error(DUPLICATE_REQUEST_MESSAGE, "request_account_deletion")
                } else {
                    AppError::DbErr(e)
                }
            })?;

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(
                    request.tenant_id,
                    AuditAction::AccountDeletionRequested,
                    "deletion_request",
                )
                .entity_id(request.id)
                .user_id(request.user_id)
                .actor(ActorType::User, Some(request.user_id))
                .details(json!({
                    "deletionType": request.deletion_type.as_str(),
                    "reason": request.reason,
                }))
                .legal_basis(LegalBasis::LegalObligation)
                .severity(AuditSeverity::Warning),
                context,
            )
            .await;

        let confirmation_url = self.confirmation_url(&token);
        if let Err(e) = self
            .email_service
            .send_deletion_confirmation_email(&user.email, &user.name, &confirmation_url)
            .await
        {
            log_with_context!(
                tracing::Level::WARN,
                "Failed to send deletion confirmation email",
                "request_id" => request.id,
                "error" => &e.to_string()
            );
        }

        log_with_context!(
            tracing::Level::INFO,
            "Account deletion requested",
            "request_id" => request.id,
            "user_id" => request.user_id,
            "deletion_type" => request.deletion_type.as_str()
        );

        Ok(DeletionRequestCreated {
            request_id: request.id,
            status: request.status,
            deletion_type: request.deletion_type,
            confirmation_url,
            message: "Solicitação registrada. Enviamos um link de confirmação para o seu e-mail"
                .to_string(),
        })
    }

    /// 確認トークンでリクエストを確定し、バックグラウンド処理を開始する
    pub async fn confirm_account_deletion(
        &self,
        token: &str,
        context: &AuditContext,
    ) -> AppResult<DeletionModel> {
        let token_hash = hash_token(token);
        let request = self
            .deletion_repo
            .find_by_token_hash(&token_hash)
            .await?
            .ok_or_else(|| AppError::NotFound(INVALID_TOKEN_MESSAGE.to_string()))?;

        if request.status != DeletionStatus::Pending {
            return Err(conflict_error(ALREADY_PROCESSED_MESSAGE, "confirm_account_deletion"));
        }

        let now = Utc::now();
        // 同じトークンでの同時確認は1件だけが成功する
        if !self.deletion_repo.confirm_by_token(&token_hash, now).await? {
            return Err(conflict_error(ALREADY_PROCESSED_MESSAGE, "confirm_account_deletion"));
        }

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(
                    request.tenant_id,
                    AuditAction::AccountDeletionConfirmed,
                    "deletion_request",
                )
                .entity_id(request.id)
                .user_id(request.user_id)
                .actor(ActorType::User, Some(request.user_id))
                .legal_basis(LegalBasis::LegalObligation)
                .severity(AuditSeverity::Warning),
                context,
            )
            .await;

        self.dispatch_processing(request.id);

        Ok(DeletionModel {
            status: DeletionStatus::Confirmed,
            confirmed_at: Some(now),
            updated_at: now,
            ..request
        })
    }

    fn dispatch_processing(&self, request_id: Uuid) {
        let worker = self.clone();
        let recovery = self.clone();
        self.job_runner.dispatch(
            format!("account_deletion:{}", request_id),
            move || {
                let worker = worker.clone();
                async move { worker.process_account_deletion(request_id).await }
            },
            move |error| async move {
                recovery.handle_processing_failure(request_id, error).await;
            },
        );
    }

    /// 起動時に confirmed / processing のまま残っているリクエストを再投入する
    pub async fn resume_interrupted(&self) -> AppResult<usize> {
        let requests = self.deletion_repo.find_resumable().await?;
        for request in &requests {
            log_with_context!(
                tracing::Level::INFO,
                "Resuming interrupted account deletion",
                "request_id" => request.id,
                "status" => request.status.as_str()
            );
            self.dispatch_processing(request.id);
        }
        Ok(requests.len())
    }

    /// 削除処理本体 (バックグラウンドジョブから呼ばれる)
    pub async fn process_account_deletion(&self, request_id: Uuid) -> AppResult<()> {
        let request = self
            .deletion_repo
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Solicitação de exclusão não encontrada",
                    &request_id.to_string(),
                    "process_account_deletion",
                )
            })?;

        if !matches!(
            request.status,
            DeletionStatus::Confirmed | DeletionStatus::Processing
        ) {
            log_with_context!(
                tracing::Level::INFO,
                "Skipping deletion request that is not awaiting processing",
                "request_id" => request.id,
                "status" => request.status.as_str()
            );
            return Ok(());
        }

        let started_at = Utc::now();
        if !self.deletion_repo.mark_processing(request.id, started_at).await? {
            return Ok(());
        }

        let user = self
            .user_repo
            .find_by_id(request.tenant_id, request.user_id)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Usuário não encontrado",
                    &request.user_id.to_string(),
                    "process_account_deletion",
                )
            })?;

        let certificate_number = generate_certificate_number(started_at);
        let original_email = user.email.clone();
        let subject_reference = anonymize_name(&user.name);
        let certificates = self.certificate_service.clone();
        let deletion_type = request.deletion_type;
        let tx_request = DeletionModel {
            status: DeletionStatus::Processing,
            processed_at: Some(started_at),
            ..request.clone()
        };
        let tx_number = certificate_number.clone();

        // データ変更・証明書保存・完了遷移を1トランザクションで行う
        let (summary, certificate_url) = self
            .db
            .execute_in_transaction(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let summary = match deletion_type {
                        DeletionType::HardDelete => hard_delete_user(txn, &user).await?,
                        DeletionType::Anonymize => anonymize_user_data(txn, &user, now).await?,
                    };

                    let certificate_url = certificates
                        .store_certificate(&CertificateDetails {
                            certificate_number: tx_number.clone(),
                            request: tx_request.clone(),
                            subject_reference,
                            entity_summary: summary.certificate_lines(),
                            issued_at: now,
                        })
                        .await?;

                    let completed = DeletionRequestRepository::mark_completed(
                        txn,
                        tx_request.id,
                        &tx_number,
                        &certificate_url,
                        now,
                    )
                    .await?;
                    if !completed {
                        return Err(AppError::Conflict(ALREADY_PROCESSED_MESSAGE.to_string()));
                    }

                    Ok((summary, certificate_url))
                })
            })
            .await?;

        self.audit_service
            .log(
                ComplianceAuditBuilder::new(
                    request.tenant_id,
                    AuditAction::AccountDeletionCompleted,
                    "deletion_request",
                )
                .entity_id(request.id)
                .user_id(request.user_id)
                .actor(ActorType::System, None)
                .details(json!({
                    "deletionType": request.deletion_type.as_str(),
                    "certificateNumber": certificate_number,
                    "changes": summary.changes,
                }))
                .legal_basis(LegalBasis::LegalObligation)
                .severity(AuditSeverity::Critical),
            )
            .await;

        if let Err(e) = self
            .email_service
            .send_deletion_completed_email(&original_email, &certificate_number, &certificate_url)
            .await
        {
            log_with_context!(
                tracing::Level::WARN,
                "Failed to send deletion completed email",
                "request_id" => request.id,
                "error" => &e.to_string()
            );
        }

        log_with_context!(
            tracing::Level::INFO,
            "Account deletion completed",
            "request_id" => request.id,
            "certificate_number" => &certificate_number
        );

        Ok(())
    }

    /// 再試行し尽くした場合: pending に戻し、新しい確認リンクを送る
    async fn handle_processing_failure(&self, request_id: Uuid, error: AppError) {
        let request = match self.deletion_repo.find_by_id(request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                log_with_context!(
                    tracing::Level::ERROR,
                    "Failed to load deletion request after processing failure",
                    "request_id" => request_id,
                    "error" => &e.to_string()
                );
                return;
            }
        };

        let token = generate_secure_token();
        let notes = format!("Falha no processamento: {}", error);
        match self
            .deletion_repo
            .revert_to_pending(request.id, &hash_token(&token), &notes, Utc::now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                log_with_context!(
                    tracing::Level::WARN,
                    "Deletion request was not reverted; status already changed",
                    "request_id" => request.id
                );
                return;
            }
            Err(e) => {
                log_with_context!(
                    tracing::Level::ERROR,
                    "Failed to revert deletion request to pending",
                    "request_id" => request.id,
                    "error" => &e.to_string()
                );
                return;
            }
        }

        self.audit_service
            .log(
                ComplianceAuditBuilder::new(
                    request.tenant_id,
                    AuditAction::AccountDeletionFailed,
                    "deletion_request",
                )
                .entity_id(request.id)
                .user_id(request.user_id)
                .actor(ActorType::System, None)
                .details(json!({ "error": error.to_string(), "tokenRotated": true }))
                .severity(AuditSeverity::Critical),
            )
            .await;

        if let Ok(Some(user)) = self
            .user_repo
            .find_by_id(request.tenant_id, request.user_id)
            .await
        {
            let url = self.confirmation_url(&token);
            if let Err(e) = self
                .email_service
                .send_deletion_retry_email(&user.email, &user.name, &url)
                .await
            {
                log_with_context!(
                    tracing::Level::WARN,
                    "Failed to send deletion retry email",
                    "request_id" => request.id,
                    "error" => &e.to_string()
                );
            }
        }
    }

    /// 確認前のリクエストを本人が取り消す
    pub async fn cancel_deletion_request(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        user_id: Uuid,
        context: &AuditContext,
    ) -> AppResult<DeletionModel> {
        let request = self
            .deletion_repo
            .find_by_id(request_id)
            .await?
            .filter(|request| request.tenant_id == tenant_id)
            .ok_or_else(|| {
                not_found_error(
                    "Solicitação de exclusão não encontrada",
                    &request_id.to_string(),
                    "cancel_deletion_request",
                )
            })?;

        if request.user_id != user_id {
            return Err(forbidden_error(
                "Você não tem permissão para cancelar esta solicitação",
                "cancel_deletion_request",
                Some(&user_id.to_string()),
            ));
        }

        let cannot_cancel = "Somente solicitações pendentes podem ser canceladas";
        if request.status != DeletionStatus::Pending {
            return Err(conflict_error(cannot_cancel, "cancel_deletion_request"));
        }

        let now = Utc::now();
        if !self.deletion_repo.cancel(request.id, user_id, now).await? {
            return Err(conflict_error(cannot_cancel, "cancel_deletion_request"));
        }

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(
                    tenant_id,
                    AuditAction::AccountDeletionCancelled,
                    "deletion_request",
                )
                .entity_id(request.id)
                .user_id(user_id)
                .actor(ActorType::User, Some(user_id))
                .severity(AuditSeverity::Info),
                context,
            )
            .await;

        Ok(DeletionModel {
            status: DeletionStatus::Cancelled,
            cancelled_at: Some(now),
            updated_at: now,
            ..request
        })
    }

    /// 未完了のリクエスト (なければ None)
    pub async fn get_deletion_status(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<DeletionModel>> {
        Ok(self.deletion_repo.find_open_by_user(tenant_id, user_id).await?)
    }

    /// 証明書番号で証明書を取得する (番号そのものがアクセス権)
    pub async fn get_certificate(&self, certificate_number: &str) -> AppResult<Vec<u8>> {
        let not_found = || {
            not_found_error(
                "Certificado não encontrado",
                certificate_number,
                "get_certificate",
            )
        };
        if !is_valid_certificate_number(certificate_number) {
            return Err(not_found());
        }

        self.deletion_repo
            .find_by_certificate_number(certificate_number)
            .await?
            .ok_or_else(not_found)?;

        self.certificate_service
            .load_certificate(certificate_number)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => not_found(),
                other => other,
            })
    }

    pub async fn list_requests(
        &self,
        tenant_id: Uuid,
        status: Option<DeletionStatus>,
    ) -> AppResult<Vec<DeletionModel>> {
        Ok(self.deletion_repo.find_by_tenant(tenant_id, status).await?)
    }
}

/// 物理削除: 同意・やり取り・セッション・ユーザー本体のみ削除し、担当リンクは外す
async fn hard_delete_user<C: ConnectionTrait>(
    conn: &C,
    user: &UserModel,
) -> AppResult<ProcessingSummary> {
    for entity in HARD_DELETE_ENTITIES {
        if !get_data_retention_rules(entity).can_hard_delete {
            return Err(AppError::InternalServerError(format!(
                "Retention rule forbids hard delete of {}",
                entity
            )));
        }
    }

    let mut summary = ProcessingSummary::default();

    let consents = ConsentRepository::delete_all_for_user(conn, user.tenant_id, user.id).await?;
    summary.record("consent", EntityOperation::Deleted, consents);

    let interactions =
        CrmRepository::delete_interactions_for_user(conn, user.tenant_id, user.id).await?;
    summary.record("interaction", EntityOperation::Deleted, interactions);

    let leads = CrmRepository::unassign_leads(conn, user.tenant_id, user.id).await?;
    summary.record("lead", EntityOperation::Unassigned, leads);

    let visits = CrmRepository::unassign_visits(conn, user.tenant_id, user.id).await?;
    summary.record("visit", EntityOperation::Unassigned, visits);

    let sessions = UserRepository::delete_sessions(conn, user.id).await?;
    summary.record("session", EntityOperation::Deleted, sessions);

    let users = UserRepository::delete(conn, user.id).await?;
    summary.record("user", EntityOperation::Deleted, users);

    Ok(summary)
}

/// 匿名化: 主キーを保ったまま個人情報を置き換える。財務・契約・監査ログには触れない
async fn anonymize_user_data<C: ConnectionTrait>(
    conn: &C,
    user: &UserModel,
    now: DateTime<Utc>,
) -> AppResult<ProcessingSummary> {
    let mut summary = ProcessingSummary::default();

    // メールで紐づく顧客データは元のメールアドレスで検索する
    let email = user.email.clone();

    UserRepository::overwrite(conn, anonymize_user(user, now)).await?;
    summary.record("user", EntityOperation::Anonymized, 1);

    let leads = CrmRepository::find_leads_by_email(conn, user.tenant_id, &email).await?;
    let lead_count = leads.len() as u64;
    for lead in leads {
        CrmRepository::overwrite_lead(conn, anonymize_lead(&lead, now)).await?;
    }
    summary.record("lead", EntityOperation::Anonymized, lead_count);

    let owners = CrmRepository::find_owners_by_email(conn, user.tenant_id, &email).await?;
    let owner_count = owners.len() as u64;
    for owner in owners {
        CrmRepository::overwrite_owner(conn, anonymize_owner(&owner, now)).await?;
    }
    summary.record("owner", EntityOperation::Anonymized, owner_count);

    let renters = CrmRepository::find_renters_by_email(conn, user.tenant_id, &email).await?;
    let renter_count = renters.len() as u64;
    for renter in renters {
        CrmRepository::overwrite_renter(conn, anonymize_renter(&renter, now)).await?;
    }
    summary.record("renter", EntityOperation::Anonymized, renter_count);

    let consents =
        ConsentRepository::withdraw_all_for_user(conn, user.tenant_id, user.id, now).await?;
    summary.record("consent", EntityOperation::Withdrawn, consents);

    let sessions = UserRepository::delete_sessions(conn, user.id).await?;
    summary.record("session", EntityOperation::Deleted, sessions);

    Ok(summary)
}
