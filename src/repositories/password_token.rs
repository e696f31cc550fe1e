use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{NewPasswordToken, PasswordToken, TokenPurpose};

/// 発行済みトークンの保存先
///
/// 発行処理が必要とするのは1行の INSERT のみ。
#[async_trait]
pub trait TokenStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// トークンを1件保存し、採番済みの行を返す
    async fn create(&self, token: NewPasswordToken) -> Result<PasswordToken, Self::Error>;
}

/// 照合・消費・掃除の各フローが使う操作
#[async_trait]
pub trait ActiveTokenStore: TokenStore {
    /// 未使用かつ有効期限内（`expires_at > now`）の最新トークンを検索
    ///
    /// # Arguments
    /// * `user_id` - 対象ユーザーのID
    /// * `purpose` - トークン用途
    /// * `now` - 期限判定に使う現在時刻
    async fn find_latest_active(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        now: OffsetDateTime,
    ) -> Result<Option<PasswordToken>, Self::Error>;

    /// トークンを使用済みにマーク
    ///
    /// # Returns
    /// 既に使用済みだった場合は false（同時リクエストによる再利用を防ぐ）
    async fn mark_as_used(&self, id: Uuid, used_at: OffsetDateTime) -> Result<bool, Self::Error>;

    /// 期限切れ（`expires_at <= now`）のトークンを削除し、削除件数を返す
    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, Self::Error>;
}

#[derive(Clone)]
pub struct PasswordTokenRepository {
    pool: PgPool,
}

impl PasswordTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PasswordTokenRepository {
    type Error = sqlx::Error;

    async fn create(&self, token: NewPasswordToken) -> Result<PasswordToken, sqlx::Error> {
        sqlx::query_as::<_, PasswordToken>(
            r#"
            INSERT INTO password_tokens (user_id, purpose, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, purpose, token_hash, expires_at, used_at, created_at
            "#,
        )
        .bind(token.user_id)
        .bind(token.purpose.as_str())
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .fetch_one(&self.pool)
        .await
    }
}

#[async_trait]
impl ActiveTokenStore for PasswordTokenRepository {
    async fn find_latest_active(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        now: OffsetDateTime,
    ) -> Result<Option<PasswordToken>, sqlx::Error> {
        sqlx::query_as::<_, PasswordToken>(
            r#"
            SELECT id, user_id, purpose, token_hash, expires_at, used_at, created_at
            FROM password_tokens
            WHERE user_id = $1
              AND purpose = $2
              AND used_at IS NULL
              AND expires_at > $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_as_used(&self, id: Uuid, used_at: OffsetDateTime) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE password_tokens
            SET used_at = $2
            WHERE id = $1 AND used_at IS NULL
            "#,
        )
        .bind(id)
        .bind(used_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM password_tokens
            WHERE expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
