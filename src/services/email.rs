use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;

/// メール送信サービス
///
/// `email` フィーチャー無効時、または SMTP 未設定時はログ出力のみ。
/// いずれの場合もリセットURL・認証コードはログに出力しない。
#[derive(Clone)]
pub struct EmailService {
    config: Arc<Config>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// パスワードリセットメールを送信
    pub async fn send_password_reset_email(
        &self,
        to: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        let body = format!(
            "パスワードをリセットするには、以下のリンクを開いてください。\n\n{reset_url}\n\n\
             心当たりがない場合は、このメールを破棄してください。"
        );
        self.deliver(to, "パスワードリセットのご案内", body).await
    }

    /// 認証コード（OTP）メールを送信
    pub async fn send_otp_email(&self, to: &str, code: &str) -> Result<(), AppError> {
        let body = format!(
            "認証コード: {code}\n\n\
             このコードの有効期限は短時間です。第三者には教えないでください。"
        );
        self.deliver(to, "認証コードのお知らせ", body).await
    }

    #[cfg(not(feature = "email"))]
    async fn deliver(&self, to: &str, subject: &str, _body: String) -> Result<(), AppError> {
        // 開発モード: 宛先と件名のみ記録
        tracing::info!(
            to = %to,
            subject = %subject,
            smtp_configured = self.config.smtp_configured(),
            "メール送信（開発モード）"
        );
        Ok(())
    }

    #[cfg(feature = "email")]
    async fn deliver(&self, to: &str, subject: &str, body: String) -> Result<(), AppError> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
            message::{Mailbox, header::ContentType},
            transport::smtp::authentication::Credentials,
        };
        use secrecy::ExposeSecret;

        let (Some(host), Some(username), Some(password), Some(from)) = (
            &self.config.smtp_host,
            &self.config.smtp_username,
            &self.config.smtp_password,
            &self.config.smtp_from_address,
        ) else {
            tracing::info!(to = %to, subject = %subject, "SMTP未設定のため送信をスキップ");
            return Ok(());
        };

        let from: Mailbox = from
            .parse()
            .map_err(|e| AppError::Mail(format!("invalid from address: {e}")))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| AppError::Mail(format!("invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Mail(format!("message build error: {e}")))?;

        let credentials = Credentials::new(
            username.expose_secret().clone(),
            password.expose_secret().clone(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::Mail(format!("smtp relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| AppError::Mail(format!("smtp send error: {e}")))?;

        tracing::info!(to = %to, subject = %subject, "メール送信完了");

        Ok(())
    }
}
