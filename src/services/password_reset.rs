use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::models::TokenPurpose;
use crate::repositories::{AccountStore, ActiveTokenStore, PasswordTokenRepository, UserRepository};
use crate::services::token_lifecycle::TokenLifecycle;
use crate::services::{EmailService, auth::hash_password};

const DEFAULT_RESET_URL_BASE: &str = "http://localhost:3000/password-reset";

/// ユーザー不在時の照合に使うダミーハッシュ
pub(crate) const DUMMY_TOKEN_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// ユーザー不在時の検索に使うID（BIGSERIAL は1から採番される）
pub(crate) const UNKNOWN_USER_ID: i64 = 0;

/// パスワードリセットサービス
#[derive(Clone)]
pub struct PasswordResetService<T = PasswordTokenRepository, U = UserRepository> {
    accounts: U,
    tokens: T,
    lifecycle: TokenLifecycle<T>,
    email_service: EmailService,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl<T, U> PasswordResetService<T, U>
where
    T: ActiveTokenStore,
    U: AccountStore,
    AppError: From<T::Error> + From<U::Error>,
{
    /// 新しい PasswordResetService を作成
    pub fn new(
        accounts: U,
        tokens: T,
        lifecycle: TokenLifecycle<T>,
        email_service: EmailService,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            lifecycle,
            email_service,
            config,
            clock,
        }
    }

    /// パスワードリセットをリクエスト
    ///
    /// # Security
    /// - ユーザーが存在しない場合も常に成功を返す（情報漏洩防止）
    /// - トークン（平文）はログに出力しない
    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        tracing::info!(email = %email, "パスワードリセットリクエスト");

        let Some(user_id) = self.accounts.find_id_by_email(email).await? else {
            tracing::info!(email = %email, "パスワードリセット: ユーザー不在（成功レスポンス返却）");
            return Ok(());
        };

        let issued = self
            .lifecycle
            .issue(user_id, TokenPurpose::PasswordReset, self.clock.as_ref())
            .await?;

        let reset_url = build_reset_url(
            self.config.password_reset_url_base.as_deref(),
            issued.raw.expose_secret(),
            email,
        );

        self.email_service
            .send_password_reset_email(email, &reset_url)
            .await?;

        tracing::info!(
            user_id,
            token_id = %issued.record.id,
            "パスワードリセットメール送信完了"
        );

        Ok(())
    }

    /// パスワードをリセット
    ///
    /// 有効なトークンは1回だけ使用できる。照合失敗・期限切れ・使用済みは
    /// すべて `TokenExpired` として扱う。トークンの消費とパスワード更新は
    /// 同時に反映され、どちらかだけが残ることはない。
    ///
    /// # Security
    /// - トークン・新パスワードはログに出力しない
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let now = self.clock.now();

        let Some(user_id) = self.accounts.find_id_by_email(email).await? else {
            // 存在時と同じ検索・照合を通して応答時間の差を縮める
            let _ = self
                .tokens
                .find_latest_active(UNKNOWN_USER_ID, TokenPurpose::PasswordReset, now)
                .await?;
            let _ = self.lifecycle.verify(token, DUMMY_TOKEN_HASH);
            tracing::warn!(email = %email, "パスワードリセット: ユーザー不在");
            return Err(AppError::TokenExpired);
        };

        let Some(record) = self
            .tokens
            .find_latest_active(user_id, TokenPurpose::PasswordReset, now)
            .await?
        else {
            tracing::warn!(user_id, "有効なリセットトークンなし");
            return Err(AppError::TokenExpired);
        };

        if !self.lifecycle.verify(token, &record.token_hash) {
            tracing::warn!(user_id, token_id = %record.id, "リセットトークン不一致");
            return Err(AppError::TokenExpired);
        }

        // argon2 はトランザクション外で計算しておく
        let password_hash = hash_password(new_password)?;

        let Some(revoked) = self
            .accounts
            .apply_password_reset(user_id, record.id, &password_hash, now)
            .await?
        else {
            tracing::warn!(token_id = %record.id, "使用済みトークン");
            return Err(AppError::TokenExpired);
        };

        tracing::info!(user_id, revoked, "パスワードリセット完了");

        Ok(())
    }
}

/// リセットURLを構築
fn build_reset_url(base: Option<&str>, token: &str, email: &str) -> String {
    format!(
        "{}?token={}&email={}",
        base.unwrap_or(DEFAULT_RESET_URL_BASE),
        token,
        urlencoding::encode(email)
    )
}
