use secrecy::SecretString;

use crate::clock::Clock;
use crate::models::{NewPasswordToken, PasswordToken, TokenPurpose};
use crate::repositories::TokenStore;
use crate::services::otp::generate_otp;
use crate::services::token_codec::{self, generate_raw_token};
use crate::services::ttl_policy::TtlPolicy;

/// 発行結果
///
/// `raw` は呼び出し側に一度だけ返す平文（メール等で届ける）。
/// `Debug` 出力でも中身は表示されない。
#[derive(Debug)]
pub struct IssuedToken {
    pub raw: SecretString,
    pub record: PasswordToken,
}

/// トークンの発行と照合
///
/// 呼び出し間で状態を持たない。期限切れ・使用済みの判定は
/// 保存済みレコードを取得する側（各フロー）で行う。
#[derive(Clone)]
pub struct TokenLifecycle<S> {
    store: S,
    ttl_policy: TtlPolicy,
}

impl<S: TokenStore> TokenLifecycle<S> {
    pub fn new(store: S, ttl_policy: TtlPolicy) -> Self {
        Self { store, ttl_policy }
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl_policy
    }

    /// 資格情報を発行して保存
    ///
    /// 用途に応じて生成方法を選ぶ（リセット: 64桁16進 / OTP: 6桁数字）。
    /// 保存は1回のみ。失敗時はリトライせずそのまま返す。
    ///
    /// # Security
    /// 平文はログに出力しない
    pub async fn issue(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        clock: &dyn Clock,
    ) -> Result<IssuedToken, S::Error> {
        let raw = match purpose {
            TokenPurpose::PasswordReset => generate_raw_token(),
            TokenPurpose::Otp => generate_otp(),
        };
        let token_hash = token_codec::digest(&raw);
        let expires_at = self.ttl_policy.compute_expiry(clock.now());

        let record = self
            .store
            .create(NewPasswordToken {
                user_id,
                purpose,
                token_hash,
                expires_at,
            })
            .await?;

        tracing::debug!(
            token_id = %record.id,
            user_id,
            purpose = %purpose,
            expires_at = %record.expires_at,
            "トークン発行"
        );

        Ok(IssuedToken {
            raw: SecretString::from(raw),
            record,
        })
    }

    /// 平文と保存済みハッシュを照合（不一致は false）
    pub fn verify(&self, raw: &str, stored_hash: &str) -> bool {
        token_codec::verify(raw, stored_hash)
    }
}
