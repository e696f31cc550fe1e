use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// 資格情報の用途
///
/// DB上は文字列（"reset" / "otp"）で保存する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// パスワードリセットリンク（64桁の16進トークン）
    PasswordReset,
    /// ワンタイムパスコード（6桁の数字）
    Otp,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordReset => "reset",
            Self::Otp => "otp",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("不明なトークン用途: {0}")]
pub struct UnknownPurpose(pub String);

impl FromStr for TokenPurpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reset" => Ok(Self::PasswordReset),
            "otp" => Ok(Self::Otp),
            other => Err(UnknownPurpose(other.to_string())),
        }
    }
}

/// 保存前のトークン（`TokenStore::create` への入力）
#[derive(Debug, Clone)]
pub struct NewPasswordToken {
    pub user_id: i64,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

/// 発行済みトークン
///
/// トークン自体はハッシュ化してDBに保存（token_hash）
/// 平文トークンはユーザーにメールで送信し、DBには保存しない
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PasswordToken {
    pub id: Uuid,
    pub user_id: i64,
    pub purpose: String,
    #[serde(skip)]
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
    pub used_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl PasswordToken {
    /// 保存されている用途文字列を解釈する
    pub fn purpose(&self) -> Result<TokenPurpose, UnknownPurpose> {
        self.purpose.parse()
    }

    /// `now` 時点で期限切れか
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}
