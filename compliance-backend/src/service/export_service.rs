// compliance-backend/src/service/export_service.rs

//! 個人データのエクスポート (LGPD art. 18, II / V)

use crate::domain::compliance_audit_log_model::{
    ActorType, AuditAction, AuditSeverity, ComplianceAuditBuilder, LegalBasis,
};
use crate::domain::export_request_model::{
    ActiveModel as ExportActiveModel, ExportFormat, ExportScope, ExportStatus,
    Model as ExportModel,
};
use crate::error::{AppError, AppResult};
use crate::log_with_context;
use crate::repository::consent_repository::ConsentRepository;
use crate::repository::crm_repository::CrmRepository;
use crate::repository::export_request_repository::ExportRequestRepository;
use crate::repository::user_repository::UserRepository;
use crate::service::compliance_audit_service::{
    AuditContext, ComplianceAuditService, AUDIT_REPORT_DETAIL_LIMIT,
};
use crate::service::job_runner::JobRunner;
use crate::service::storage_service::StorageService;
use crate::utils::archive::{build_tar_gz, json_sections_to_csv, ArchiveEntry};
use crate::utils::email::EmailService;
use crate::utils::error_helper::{external_service_error, forbidden_error, not_found_error};
use crate::utils::token::{generate_secure_token, hash_token};
use chrono::{Duration, Utc};
use sea_orm::ActiveValue::Set;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const EXPORT_NOT_READY_MESSAGE: &str = "A exportação ainda não está pronta";
pub const EXPORT_EXPIRED_MESSAGE: &str = "O prazo para download desta exportação expirou";

const RIGHTS_NOTICE: &str = "\
SEUS DADOS PESSOAIS - EXPORTAÇÃO

Este arquivo contém os dados pessoais que mantemos sobre você, fornecidos em
atendimento ao art. 18 da Lei nº 13.709/2018 (LGPD).

Seus direitos como titular:
  - Confirmação da existência de tratamento (art. 18, I)
  - Acesso aos dados (art. 18, II)
  - Correção de dados incompletos, inexatos ou desatualizados (art. 18, III)
  - Anonimização, bloqueio ou eliminação de dados desnecessários (art. 18, IV)
  - Portabilidade dos dados (art. 18, V)
  - Eliminação dos dados tratados com consentimento (art. 18, VI)
  - Informação sobre compartilhamento (art. 18, VII)
  - Revogação do consentimento (art. 18, IX)

Registros financeiros, contratos e trilhas de auditoria podem ser mantidos pelo
prazo exigido em lei mesmo após uma solicitação de exclusão (art. 16).

Para exercer seus direitos, acesse a área de privacidade da sua conta ou entre em
contato com o Encarregado de Proteção de Dados (DPO).
";

#[derive(Debug, Clone)]
pub struct RequestExportParams {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub format: ExportFormat,
    pub include_related: bool,
}

/// ダウンロード用のファイル
#[derive(Debug, Clone)]
pub struct ExportDownload {
    pub file_name: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCleanupReport {
    pub scanned: usize,
    pub expired: usize,
    pub failed: usize,
}

pub fn export_storage_key(tenant_id: Uuid, request_id: Uuid) -> String {
    format!("exports/{}/{}.tar.gz", tenant_id, request_id)
}

#[derive(Clone)]
pub struct ExportService {
    export_repo: Arc<ExportRequestRepository>,
    user_repo: Arc<UserRepository>,
    consent_repo: Arc<ConsentRepository>,
    crm_repo: Arc<CrmRepository>,
    audit_service: Arc<ComplianceAuditService>,
    storage: Arc<dyn StorageService>,
    email_service: Arc<EmailService>,
    job_runner: Arc<JobRunner>,
    ttl_days: i64,
}

impl ExportService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        export_repo: Arc<ExportRequestRepository>,
        user_repo: Arc<UserRepository>,
        consent_repo: Arc<ConsentRepository>,
        crm_repo: Arc<CrmRepository>,
        audit_service: Arc<ComplianceAuditService>,
        storage: Arc<dyn StorageService>,
        email_service: Arc<EmailService>,
        job_runner: Arc<JobRunner>,
        ttl_days: i64,
    ) -> Self {
        Self {
            export_repo,
            user_repo,
            consent_repo,
            crm_repo,
            audit_service,
            storage,
            email_service,
            job_runner,
            ttl_days,
        }
    }

    /// エクスポートを受け付け、パッケージ作成をバックグラウンドで開始する
    pub async fn request_data_export(
        &self,
        params: RequestExportParams,
        context: &AuditContext,
    ) -> AppResult<ExportModel> {
        self.user_repo
            .find_by_id(params.tenant_id, params.user_id)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Usuário não encontrado",
                    &params.user_id.to_string(),
                    "request_data_export",
                )
            })?;

        let now = Utc::now();
        let scope = serde_json::to_value(ExportScope {
            include_related: params.include_related,
        })
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let request = self
            .export_repo
            .create(ExportActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(params.tenant_id),
                user_id: Set(params.user_id),
                request_token: Set(hash_token(&generate_secure_token())),
                status: Set(ExportStatus::Pending),
                format: Set(params.format),
                data_scope: Set(scope),
                file_name: Set(None),
                file_size: Set(None),
                file_url: Set(None),
                expires_at: Set(now + Duration::days(self.ttl_days)),
                completed_at: Set(None),
                downloaded_at: Set(None),
                download_count: Set(0),
                error_message: Set(None),
                ip_address: Set(context.ip_address.clone()),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .await?;

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(
                    request.tenant_id,
                    AuditAction::DataExportRequested,
                    "export_request",
                )
                .entity_id(request.id)
                .user_id(request.user_id)
                .actor(ActorType::User, Some(request.user_id))
                .details(json!({
                    "format": request.format.as_str(),
                    "includeRelated": params.include_related,
                }))
                .legal_basis(LegalBasis::LegalObligation),
                context,
            )
            .await;

        self.dispatch_processing(request.id);

        Ok(request)
    }

    fn dispatch_processing(&self, request_id: Uuid) {
        let worker = self.clone();
        let recovery = self.clone();
        self.job_runner.dispatch(
            format!("data_export:{}", request_id),
            move || {
                let worker = worker.clone();
                async move { worker.process_export(request_id).await }
            },
            move |error| async move {
                recovery.handle_processing_failure(request_id, error).await;
            },
        );
    }

    /// データを収集してアーカイブを作成し、ストレージに保存する
    pub async fn process_export(&self, request_id: Uuid) -> AppResult<()> {
        let request = self
            .export_repo
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Exportação não encontrada",
                    &request_id.to_string(),
                    "process_export",
                )
            })?;

        if !matches!(request.status, ExportStatus::Pending | ExportStatus::Processing) {
            return Ok(());
        }
        if !self.export_repo.mark_processing(request.id, Utc::now()).await? {
            return Ok(());
        }

        let scope: ExportScope = serde_json::from_value(request.data_scope.clone()).unwrap_or_default();
        let document = self.collect_user_data(&request, &scope).await?;

        let data_file = match request.format {
            ExportFormat::Json => serde_json::to_vec_pretty(&document)
                .map_err(|e| AppError::InternalServerError(e.to_string()))?,
            ExportFormat::Csv => json_sections_to_csv(&document).into_bytes(),
        };

        let generated_at = Utc::now();
        let archive = build_tar_gz(
            &[
                ArchiveEntry::new(request.format.data_file_name(), data_file),
                ArchiveEntry::new("LEIA-ME.txt", RIGHTS_NOTICE),
            ],
            generated_at,
        )
        .map_err(|e| external_service_error(e, "build export archive"))?;

        let file_size = archive.len() as i64;
        let key = export_storage_key(request.tenant_id, request.id);
        self.storage
            .upload(&key, archive, "application/gzip")
            .await?;

        let file_name = format!("dados-pessoais-{}.tar.gz", generated_at.format("%Y%m%d"));
        if !self
            .export_repo
            .mark_completed(request.id, &file_name, file_size, &key, Utc::now())
            .await?
        {
            return Ok(());
        }

        self.audit_service
            .log(
                ComplianceAuditBuilder::new(
                    request.tenant_id,
                    AuditAction::DataExportCompleted,
                    "export_request",
                )
                .entity_id(request.id)
                .user_id(request.user_id)
                .actor(ActorType::System, None)
                .details(json!({
                    "format": request.format.as_str(),
                    "fileSize": file_size,
                }))
                .legal_basis(LegalBasis::LegalObligation),
            )
            .await;

        if let Ok(Some(user)) = self
            .user_repo
            .find_by_id(request.tenant_id, request.user_id)
            .await
        {
            if let Err(e) = self
                .email_service
                .send_export_ready_email(&user.email, &user.name, self.ttl_days)
                .await
            {
                log_with_context!(
                    tracing::Level::WARN,
                    "Failed to send export ready email",
                    "request_id" => request.id,
                    "error" => &e.to_string()
                );
            }
        }

        log_with_context!(
            tracing::Level::INFO,
            "Data export completed",
            "request_id" => request.id,
            "file_size" => file_size
        );

        Ok(())
    }

    /// エクスポートに含めるデータをセクションごとに集める
    async fn collect_user_data(&self, request: &ExportModel, scope: &ExportScope) -> AppResult<Value> {
        let user = self
            .user_repo
            .find_by_id(request.tenant_id, request.user_id)
            .await?
            .ok_or_else(|| {
                not_found_error(
                    "Usuário não encontrado",
                    &request.user_id.to_string(),
                    "collect_user_data",
                )
            })?;

        let to_value = |value: Result<Value, serde_json::Error>| {
            value.map_err(|e| AppError::InternalServerError(e.to_string()))
        };

        let mut sections = Map::new();
        sections.insert(
            "exportacao".to_string(),
            json!({
                "requestId": request.id,
                "generatedAt": Utc::now(),
                "format": request.format.as_str(),
            }),
        );
        // パスワードハッシュはシリアライズされない
        sections.insert("usuario".to_string(), to_value(serde_json::to_value(&user))?);

        if scope.include_related {
            let consents = self
                .consent_repo
                .find_history_by_user(request.tenant_id, request.user_id)
                .await?;
            sections.insert("consentimentos".to_string(), to_value(serde_json::to_value(consents))?);

            let interactions = self
                .crm_repo
                .find_interactions_by_user(request.tenant_id, request.user_id)
                .await?;
            sections.insert("interacoes".to_string(), to_value(serde_json::to_value(interactions))?);

            let audit_logs = self
                .audit_service
                .get_user_logs(request.tenant_id, request.user_id, AUDIT_REPORT_DETAIL_LIMIT)
                .await?;
            sections.insert(
                "registrosDeAuditoria".to_string(),
                to_value(serde_json::to_value(audit_logs))?,
            );

            if user.is_elevated() {
                let leads = self
                    .crm_repo
                    .find_assigned_leads(request.tenant_id, request.user_id)
                    .await?;
                sections.insert("leadsAtribuidos".to_string(), to_value(serde_json::to_value(leads))?);

                let visits = self
                    .crm_repo
                    .find_assigned_visits(request.tenant_id, request.user_id)
                    .await?;
                sections.insert(
                    "visitasAtribuidas".to_string(),
                    to_value(serde_json::to_value(visits))?,
                );
            }
        }

        Ok(Value::Object(sections))
    }

    async fn handle_processing_failure(&self, request_id: Uuid, error: AppError) {
        let message = error.to_string();
        match self.export_repo.mark_failed(request_id, &message, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                log_with_context!(
                    tracing::Level::ERROR,
                    "Failed to mark export as failed",
                    "request_id" => request_id,
                    "error" => &e.to_string()
                );
                return;
            }
        }

        if let Ok(Some(request)) = self.export_repo.find_by_id(request_id).await {
            self.audit_service
                .log(
                    ComplianceAuditBuilder::new(
                        request.tenant_id,
                        AuditAction::DataExportFailed,
                        "export_request",
                    )
                    .entity_id(request.id)
                    .user_id(request.user_id)
                    .actor(ActorType::System, None)
                    .details(json!({ "error": message }))
                    .severity(AuditSeverity::Warning),
                )
                .await;
        }
    }

    /// 所有者のみ参照可能
    async fn find_owned(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        request_id: Uuid,
        context: &str,
    ) -> AppResult<ExportModel> {
        let request = self
            .export_repo
            .find_by_id(request_id)
            .await?
            .filter(|request| request.tenant_id == tenant_id)
            .ok_or_else(|| {
                not_found_error("Exportação não encontrada", &request_id.to_string(), context)
            })?;

        if request.user_id != user_id {
            return Err(forbidden_error(
                "Você não tem permissão para acessar esta exportação",
                context,
                Some(&user_id.to_string()),
            ));
        }

        Ok(request)
    }

    pub async fn get_export_status(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        request_id: Uuid,
    ) -> AppResult<ExportModel> {
        self.find_owned(tenant_id, user_id, request_id, "get_export_status")
            .await
    }

    pub async fn download_export(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        request_id: Uuid,
        context: &AuditContext,
    ) -> AppResult<ExportDownload> {
        let request = self
            .find_owned(tenant_id, user_id, request_id, "download_export")
            .await?;

        if request.status != ExportStatus::Completed {
            return Err(AppError::BadRequest(EXPORT_NOT_READY_MESSAGE.to_string()));
        }

        let now = Utc::now();
        if request.is_expired_at(now) {
            return Err(AppError::Gone(EXPORT_EXPIRED_MESSAGE.to_string()));
        }

        let key = request
            .file_url
            .clone()
            .ok_or_else(|| AppError::Gone(EXPORT_EXPIRED_MESSAGE.to_string()))?;
        let contents = self.storage.download(&key).await.map_err(|e| match e {
            AppError::NotFound(_) => AppError::Gone(EXPORT_EXPIRED_MESSAGE.to_string()),
            other => other,
        })?;

        self.export_repo.record_download(request.id, now).await?;

        self.audit_service
            .log_in_context(
                ComplianceAuditBuilder::new(
                    tenant_id,
                    AuditAction::DataExportDownloaded,
                    "export_request",
                )
                .entity_id(request.id)
                .user_id(user_id)
                .actor(ActorType::User, Some(user_id))
                .details(json!({ "downloadCount": request.download_count + 1 }))
                .legal_basis(LegalBasis::LegalObligation),
                context,
            )
            .await;

        Ok(ExportDownload {
            file_name: request
                .file_name
                .unwrap_or_else(|| format!("dados-pessoais-{}.tar.gz", request.id)),
            contents,
        })
    }

    /// 期限切れの完了済みエクスポートを回収する (何度実行しても同じ結果になる)
    pub async fn cleanup_expired_exports(
        &self,
        tenant_id: Option<Uuid>,
    ) -> AppResult<ExportCleanupReport> {
        let now = Utc::now();
        let expired = self.export_repo.find_expired_completed(now, tenant_id).await?;
        let mut report = ExportCleanupReport {
            scanned: expired.len(),
            ..Default::default()
        };

        for request in expired {
            if let Some(key) = &request.file_url {
                // ファイル削除に失敗したものは次回に回す
                if let Err(e) = self.storage.delete(key).await {
                    log_with_context!(
                        tracing::Level::WARN,
                        "Failed to delete expired export file",
                        "request_id" => request.id,
                        "error" => &e.to_string()
                    );
                    report.failed += 1;
                    continue;
                }
            }

            if self.export_repo.mark_expired(request.id, now).await? {
                report.expired += 1;
                self.audit_service
                    .log(
                        ComplianceAuditBuilder::new(
                            request.tenant_id,
                            AuditAction::DataExportExpired,
                            "export_request",
                        )
                        .entity_id(request.id)
                        .user_id(request.user_id)
                        .actor(ActorType::System, None),
                    )
                    .await;
            }
        }

        log_with_context!(
            tracing::Level::INFO,
            "Expired exports cleaned up",
            "scanned" => report.scanned,
            "expired" => report.expired,
            "failed" => report.failed
        );

        Ok(report)
    }
}
