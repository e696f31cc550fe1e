use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::TokenPurpose;
use crate::repositories::{AccountStore, ActiveTokenStore, PasswordTokenRepository, UserRepository};
use crate::services::EmailService;
use crate::services::otp::is_well_formed;
use crate::services::password_reset::{DUMMY_TOKEN_HASH, UNKNOWN_USER_ID};
use crate::services::token_lifecycle::TokenLifecycle;

/// メールで届けるワンタイムパスコードのサービス
#[derive(Clone)]
pub struct OtpService<T = PasswordTokenRepository, U = UserRepository> {
    accounts: U,
    tokens: T,
    lifecycle: TokenLifecycle<T>,
    email_service: EmailService,
    clock: Arc<dyn Clock>,
}

impl<T, U> OtpService<T, U>
where
    T: ActiveTokenStore,
    U: AccountStore,
    AppError: From<T::Error> + From<U::Error>,
{
    pub fn new(
        accounts: U,
        tokens: T,
        lifecycle: TokenLifecycle<T>,
        email_service: EmailService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            lifecycle,
            email_service,
            clock,
        }
    }

    /// 認証コードを発行してメール送信
    ///
    /// # Security
    /// ユーザー不在でも成功を返す。コードはログに出力しない
    pub async fn request_code(&self, email: &str) -> Result<(), AppError> {
        let Some(user_id) = self.accounts.find_id_by_email(email).await? else {
            tracing::info!(email = %email, "OTP: ユーザー不在（成功レスポンス返却）");
            return Ok(());
        };

        let issued = self
            .lifecycle
            .issue(user_id, TokenPurpose::Otp, self.clock.as_ref())
            .await?;

        self.email_service
            .send_otp_email(email, issued.raw.expose_secret())
            .await?;

        tracing::info!(user_id, token_id = %issued.record.id, "OTP送信完了");

        Ok(())
    }

    /// 認証コードを検証し、成功したらユーザーIDを返す
    ///
    /// 成功したコードは使用済みになる。
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<i64, AppError> {
        if !is_well_formed(code) {
            return Err(AppError::OtpInvalid);
        }

        let now = self.clock.now();

        let Some(user_id) = self.accounts.find_id_by_email(email).await? else {
            let _ = self
                .tokens
                .find_latest_active(UNKNOWN_USER_ID, TokenPurpose::Otp, now)
                .await?;
            let _ = self.lifecycle.verify(code, DUMMY_TOKEN_HASH);
            tracing::warn!(email = %email, "OTP検証: ユーザー不在");
            return Err(AppError::OtpInvalid);
        };

        let Some(record) = self
            .tokens
            .find_latest_active(user_id, TokenPurpose::Otp, now)
            .await?
        else {
            tracing::warn!(user_id, "有効なOTPなし");
            return Err(AppError::OtpInvalid);
        };

        if !self.lifecycle.verify(code, &record.token_hash) {
            tracing::warn!(user_id, token_id = %record.id, "OTP不一致");
            return Err(AppError::OtpInvalid);
        }

        if !self.tokens.mark_as_used(record.id, now).await? {
            tracing::warn!(token_id = %record.id, "使用済みOTP");
            return Err(AppError::OtpInvalid);
        }

        tracing::info!(user_id, "OTP検証成功");

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Config;
    use crate::repositories::InMemoryTokenStore;
    use crate::services::TtlPolicy;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);
    const EMAIL: &str = "guest@example.com";

    fn store() -> InMemoryTokenStore {
        let store = InMemoryTokenStore::with_clock(Arc::new(FixedClock(NOW)));
        store.add_user(3, EMAIL, "hash");
        store
    }

    fn service_at(
        store: &InMemoryTokenStore,
        now: OffsetDateTime,
    ) -> OtpService<InMemoryTokenStore, InMemoryTokenStore> {
        let config = Config::from_iter(vec![(
            "DATABASE_URL".to_string(),
            "postgres://localhost/app".to_string(),
        )])
        .unwrap();
        OtpService::new(
            store.clone(),
            store.clone(),
            TokenLifecycle::new(store.clone(), TtlPolicy::from_minutes(5)),
            EmailService::new(Arc::new(config)),
            Arc::new(FixedClock(now)),
        )
    }

    async fn issue(store: &InMemoryTokenStore, purpose: TokenPurpose) -> String {
        TokenLifecycle::new(store.clone(), TtlPolicy::from_minutes(5))
            .issue(3, purpose, &FixedClock(NOW))
            .await
            .unwrap()
            .raw
            .expose_secret()
            .to_string()
    }

    /// 6桁のうち、発行済みコードと異なるもの
    fn other_code(code: &str) -> String {
        let other = if code == "123456" { "654321" } else { "123456" };
        other.to_string()
    }

    #[tokio::test]
    async fn test_request_code_issues_otp() {
        let store = store();
        service_at(&store, NOW).request_code(EMAIL).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, 3);
        assert_eq!(records[0].purpose, "otp");
        assert_eq!(records[0].expires_at, NOW + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_request_code_unknown_email_succeeds_silently() {
        let store = store();
        assert!(service_at(&store, NOW).request_code("nobody@example.com").await.is_ok());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_verify_code_only_once() {
        let store = store();
        let service = service_at(&store, NOW);
        let code = issue(&store, TokenPurpose::Otp).await;

        assert_eq!(service.verify_code(EMAIL, &code).await.unwrap(), 3);

        let replay = service.verify_code(EMAIL, &code).await;
        assert!(matches!(replay, Err(AppError::OtpInvalid)));
    }

    #[tokio::test]
    async fn test_verify_code_mismatch_keeps_code_usable() {
        let store = store();
        let service = service_at(&store, NOW);
        let code = issue(&store, TokenPurpose::Otp).await;

        let wrong = service.verify_code(EMAIL, &other_code(&code)).await;
        assert!(matches!(wrong, Err(AppError::OtpInvalid)));

        assert_eq!(service.verify_code(EMAIL, &code).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_verify_code_checks_newest_only() {
        let store = store();
        let service = service_at(&store, NOW);
        let older = issue(&store, TokenPurpose::Otp).await;
        let newest = issue(&store, TokenPurpose::Otp).await;

        if older != newest {
            let result = service.verify_code(EMAIL, &older).await;
            assert!(matches!(result, Err(AppError::OtpInvalid)));
        }
        assert_eq!(service.verify_code(EMAIL, &newest).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_verify_code_rejects_expired() {
        let store = store();
        let code = issue(&store, TokenPurpose::Otp).await;

        let result = service_at(&store, NOW + Duration::minutes(5))
            .verify_code(EMAIL, &code)
            .await;

        assert!(matches!(result, Err(AppError::OtpInvalid)));
        assert!(store.records()[0].used_at.is_none());
    }

    #[tokio::test]
    async fn test_verify_code_rejects_malformed_and_unknown() {
        let store = store();
        let service = service_at(&store, NOW);
        let code = issue(&store, TokenPurpose::Otp).await;

        for malformed in ["", "12345", "1234567", "12a456"] {
            let result = service.verify_code(EMAIL, malformed).await;
            assert!(matches!(result, Err(AppError::OtpInvalid)));
        }
        let unknown = service.verify_code("nobody@example.com", &code).await;
        assert!(matches!(unknown, Err(AppError::OtpInvalid)));
        assert!(store.records()[0].used_at.is_none());
    }
}
