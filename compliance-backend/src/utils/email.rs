// compliance-backend/src/utils/email.rs

use crate::error::{AppError, AppResult};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::env;
use thiserror::Error;
use tracing::info;

/// メール送信エラー
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("SMTP configuration error: {0}")]
    ConfigurationError(String),

    #[error("Missing email configuration")]
    MissingConfiguration,
}

/// メール設定
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
    /// STARTTLS を使用するか
    pub use_tls: bool,
    /// 開発モードかどうか（ログ出力のみ）
    pub development_mode: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: "user".to_string(),
            smtp_password: "password".to_string(),
            from_email: "privacidade@example.com.br".to_string(),
            from_name: "Privacidade e Proteção de Dados".to_string(),
            use_tls: true,
            development_mode: true, // 開発環境ではデフォルトで true
        }
    }
}

impl EmailConfig {
    /// 環境変数から設定を読み込み
    pub fn from_env() -> Result<Self, EmailError> {
        let development_mode = env::var("EMAIL_DEVELOPMENT_MODE")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        // 開発モードの場合はデフォルト設定を返す
        if development_mode {
            return Ok(Self::default());
        }

        let smtp_host = env::var("SMTP_HOST").map_err(|_| EmailError::MissingConfiguration)?;
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .map_err(|_| EmailError::ConfigurationError("Invalid SMTP port".to_string()))?;
        let smtp_username =
            env::var("SMTP_USERNAME").map_err(|_| EmailError::MissingConfiguration)?;
        let smtp_password =
            env::var("SMTP_PASSWORD").map_err(|_| EmailError::MissingConfiguration)?;
        let from_email = env::var("EMAIL_FROM").map_err(|_| EmailError::MissingConfiguration)?;
        let from_name = env::var("EMAIL_FROM_NAME")
            .unwrap_or_else(|_| "Privacidade e Proteção de Dados".to_string());
        let use_tls = env::var("SMTP_USE_TLS")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Self {
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            from_email,
            from_name,
            use_tls,
            development_mode: false,
        })
    }
}

/// メール送信内容
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// 利用者への通知メール送信サービス
pub struct EmailService {
    config: EmailConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    /// 新しいEmailServiceを作成
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        if config.development_mode {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        if config.smtp_host.is_empty() || config.from_email.is_empty() {
            return Err(EmailError::ConfigurationError(
                "SMTP host and sender are required".to_string(),
            ));
        }

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| EmailError::ConfigurationError(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    /// 環境変数から設定を読み込んでEmailServiceを作成
    pub fn from_env() -> Result<Self, EmailError> {
        Self::new(EmailConfig::from_env()?)
    }

    /// 開発モード (送信せずログ出力のみ)
    pub fn development() -> Self {
        Self {
            config: EmailConfig::default(),
            transport: None,
        }
    }

    /// メールを送信
    pub async fn send_email(&self, message: EmailMessage) -> AppResult<()> {
        let to: Mailbox = match &message.to_name {
            Some(name) => format!("{} <{}>", name, message.to_email).parse(),
            None => message.to_email.parse(),
        }
        .map_err(|_| AppError::BadRequest(format!("E-mail inválido: {}", message.to_email)))?;

        let Some(transport) = &self.transport else {
            // 開発モードではログ出力のみ
            self.log_email(&message);
            return Ok(());
        };

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| AppError::InternalServerError(format!("Invalid sender: {}", e)))?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.text_body.clone(),
                message.html_body.clone(),
            ))
            .map_err(|e| AppError::InternalServerError(format!("Failed to build email: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("SMTP send failed: {}", e)))?;

        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "Email sent successfully"
        );

        Ok(())
    }

    /// 削除リクエストの確認メール
    pub async fn send_deletion_confirmation_email(
        &self,
        to_email: &str,
        to_name: &str,
        confirmation_url: &str,
    ) -> AppResult<()> {
        let subject = "Confirme a exclusão da sua conta".to_string();
        let lines = [
            format!("Olá {},", to_name),
            "Recebemos uma solicitação de exclusão da sua conta e dos seus dados pessoais, nos termos do art. 18 da LGPD.".to_string(),
            "Para confirmar, acesse o link abaixo. Se você não fez esta solicitação, ignore este e-mail e nenhuma ação será tomada.".to_string(),
        ];
        self.send_email(EmailMessage {
            to_email: to_email.to_string(),
            to_name: Some(to_name.to_string()),
            html_body: render_html(&subject, &lines, Some(confirmation_url)),
            text_body: render_text(&subject, &lines, Some(confirmation_url)),
            subject,
        })
        .await
    }

    /// 処理失敗時の再確認メール (新しい確認リンク)
    pub async fn send_deletion_retry_email(
        &self,
        to_email: &str,
        to_name: &str,
        confirmation_url: &str,
    ) -> AppResult<()> {
        let subject = "Não foi possível concluir a exclusão da sua conta".to_string();
        let lines = [
            format!("Olá {},", to_name),
            "Ocorreu uma falha ao processar a exclusão da sua conta. Nenhum dado foi perdido e sua solicitação continua pendente.".to_string(),
            "Para tentar novamente, confirme pelo novo link abaixo. O link anterior não é mais válido.".to_string(),
        ];
        self.send_email(EmailMessage {
            to_email: to_email.to_string(),
            to_name: Some(to_name.to_string()),
            html_body: render_html(&subject, &lines, Some(confirmation_url)),
            text_body: render_text(&subject, &lines, Some(confirmation_url)),
            subject,
        })
        .await
    }

    /// 削除完了の通知 (証明書番号つき)
    pub async fn send_deletion_completed_email(
        &self,
        to_email: &str,
        certificate_number: &str,
        certificate_url: &str,
    ) -> AppResult<()> {
        let subject = "Exclusão de dados concluída".to_string();
        let lines = [
            "Sua solicitação de exclusão de dados foi concluída.".to_string(),
            format!("Número do certificado: {}", certificate_number),
            "Guarde este número. Ele é a única forma de acessar o certificado de exclusão.".to_string(),
        ];
        self.send_email(EmailMessage {
            to_email: to_email.to_string(),
            to_name: None,
            html_body: render_html(&subject, &lines, Some(certificate_url)),
            text_body: render_text(&subject, &lines, Some(certificate_url)),
            subject,
        })
        .await
    }

    /// エクスポート完了の通知
    pub async fn send_export_ready_email(
        &self,
        to_email: &str,
        to_name: &str,
        expires_in_days: i64,
    ) -> AppResult<()> {
        let subject = "Seus dados estão prontos para download".to_string();
        let lines = [
            format!("Olá {},", to_name),
            "A exportação dos seus dados pessoais foi concluída e está disponível na área de privacidade da sua conta.".to_string(),
            format!("O arquivo ficará disponível por {} dias.", expires_in_days),
        ];
        self.send_email(EmailMessage {
            to_email: to_email.to_string(),
            to_name: Some(to_name.to_string()),
            html_body: render_html(&subject, &lines, None),
            text_body: render_text(&subject, &lines, None),
            subject,
        })
        .await
    }

    /// 開発モードでのメールログ出力
    fn log_email(&self, message: &EmailMessage) {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "📧 EMAIL (Development Mode)"
        );
        info!("{}", message.text_body);
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_html(title: &str, lines: &[String], link: Option<&str>) -> String {
    let paragraphs: String = lines
        .iter()
        .map(|line| format!("<p>{}</p>", html_escape(line)))
        .collect();
    let link = link
        .map(|url| {
            let url = html_escape(url);
            format!(r#"<p><a href="{url}">{url}</a></p>"#)
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="max-width: 600px; margin: 0 auto; padding: 20px;">
<h1>{title}</h1>
{paragraphs}
{link}
</div>
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn render_text(title: &str, lines: &[String], link: Option<&str>) -> String {
    let mut body = format!("{}\n\n{}\n", title, lines.join("\n\n"));
    if let Some(url) = link {
        body.push_str(&format!("\n{}\n", url));
    }
    body
}
