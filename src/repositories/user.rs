use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::TokenPurpose;

/// 資格情報フローが必要とするユーザー側の操作
#[async_trait]
pub trait AccountStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// メールアドレスからユーザーIDを引く
    async fn find_id_by_email(&self, email: &str) -> Result<Option<i64>, Self::Error>;

    /// リセットトークンを消費してパスワードハッシュを差し替える
    ///
    /// トークンの使用済み化、ハッシュ更新、残りのリセットトークンの失効を
    /// まとめて行う。途中で失敗した場合はどれも反映されない。
    ///
    /// # Returns
    /// - `Some(revoked)`: 完了。`revoked` は同時に失効させた他のトークン数
    /// - `None`: トークンが既に使用済み（何も変更しない）
    async fn apply_password_reset(
        &self,
        user_id: i64,
        token_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<u64>, Self::Error>;
}

/// ユーザーテーブルへのアクセス
///
/// ユーザーの登録・編集はゲーム側のバックエンドが担う。
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for UserRepository {
    type Error = sqlx::Error;

    async fn find_id_by_email(&self, email: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// password_hash はログに出力しないこと
    async fn apply_password_reset(
        &self,
        user_id: i64,
        token_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<u64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            r#"
            UPDATE password_tokens
            SET used_at = $2
            WHERE id = $1 AND used_at IS NULL
            "#,
        )
        .bind(token_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if consumed != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let revoked = sqlx::query(
            r#"
            UPDATE password_tokens
            SET used_at = $3
            WHERE user_id = $1 AND purpose = $2 AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(TokenPurpose::PasswordReset.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(Some(revoked))
    }
}
