use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::AppError;
use crate::models::{NewPasswordToken, PasswordToken, TokenPurpose};
use crate::repositories::{AccountStore, ActiveTokenStore, TokenStore};

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("ストアが利用できません")]
    Unavailable,
}

impl From<MemoryStoreError> for AppError {
    fn from(e: MemoryStoreError) -> Self {
        AppError::Internal(e.into())
    }
}

#[derive(Debug, Clone)]
struct MemoryUser {
    id: i64,
    email: String,
    password_hash: String,
}

#[derive(Default)]
struct MemoryState {
    tokens: Vec<PasswordToken>,
    users: Vec<MemoryUser>,
    fail_token_writes: bool,
    fail_account_writes: bool,
}

/// プロセス内メモリに保存するトークン・ユーザーのストア
///
/// テストやローカルでの動作確認用。clone したものは同じデータを共有する。
/// 1つの Mutex で全体を守るので、各操作は Postgres 版の1トランザクションと
/// 同じく全部反映されるか何も反映されないかのどちらかになる。
/// `created_at` は保持している `Clock` から採る。
#[derive(Clone)]
pub struct InMemoryTokenStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// トークンの書き込みが常に失敗するストア
    pub fn failing() -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.fail_token_writes = true;
        }
        store
    }

    /// ユーザーを登録
    pub fn add_user(&self, id: i64, email: &str, password_hash: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.users.push(MemoryUser {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
            });
        }
    }

    /// `true` の間、`apply_password_reset` は何も変更せずに失敗する
    pub fn set_account_writes_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_account_writes = failing;
        }
    }

    /// 保存済みトークンのスナップショット
    pub fn records(&self) -> Vec<PasswordToken> {
        self.state
            .lock()
            .map(|state| state.tokens.clone())
            .unwrap_or_default()
    }

    pub fn password_hash_of(&self, user_id: i64) -> Option<String> {
        let state = self.state.lock().ok()?;
        state
            .users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.password_hash.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, MemoryStoreError> {
        self.state.lock().map_err(|_| MemoryStoreError::Unavailable)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    type Error = MemoryStoreError;

    async fn create(&self, token: NewPasswordToken) -> Result<PasswordToken, MemoryStoreError> {
        let mut state = self.lock()?;
        if state.fail_token_writes {
            return Err(MemoryStoreError::Unavailable);
        }

        let record = PasswordToken {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            purpose: token.purpose.as_str().to_string(),
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            used_at: None,
            created_at: self.clock.now(),
        };
        state.tokens.push(record.clone());

        Ok(record)
    }
}

#[async_trait]
impl ActiveTokenStore for InMemoryTokenStore {
    async fn find_latest_active(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        now: OffsetDateTime,
    ) -> Result<Option<PasswordToken>, MemoryStoreError> {
        let state = self.lock()?;
        // created_at が同じなら後から保存したものを優先
        Ok(state
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.purpose == purpose.as_str())
            .filter(|t| t.used_at.is_none() && t.expires_at > now)
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn mark_as_used(
        &self,
        id: Uuid,
        used_at: OffsetDateTime,
    ) -> Result<bool, MemoryStoreError> {
        let mut state = self.lock()?;
        match state
            .tokens
            .iter_mut()
            .find(|t| t.id == id && t.used_at.is_none())
        {
            Some(token) => {
                token.used_at = Some(used_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, MemoryStoreError> {
        let mut state = self.lock()?;
        let before = state.tokens.len();
        state.tokens.retain(|t| t.expires_at > now);
        Ok((before - state.tokens.len()) as u64)
    }
}

#[async_trait]
impl AccountStore for InMemoryTokenStore {
    type Error = MemoryStoreError;

    async fn find_id_by_email(&self, email: &str) -> Result<Option<i64>, MemoryStoreError> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .find(|user| user.email == email)
            .map(|user| user.id))
    }

    async fn apply_password_reset(
        &self,
        user_id: i64,
        token_id: Uuid,
        password_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<u64>, MemoryStoreError> {
        let mut state = self.lock()?;
        if state.fail_account_writes {
            return Err(MemoryStoreError::Unavailable);
        }

        let Some(token) = state
            .tokens
            .iter_mut()
            .find(|t| t.id == token_id && t.used_at.is_none())
        else {
            return Ok(None);
        };
        token.used_at = Some(now);

        if let Some(user) = state.users.iter_mut().find(|user| user.id == user_id) {
            user.password_hash = password_hash.to_string();
        }

        let mut revoked = 0;
        for token in state.tokens.iter_mut().filter(|t| {
            t.user_id == user_id
                && t.purpose == TokenPurpose::PasswordReset.as_str()
                && t.used_at.is_none()
        }) {
            token.used_at = Some(now);
            revoked += 1;
        }

        Ok(Some(revoked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use time::Duration;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2020-01-01 00:00:00 UTC);

    fn new_token(user_id: i64, purpose: TokenPurpose, expires_at: OffsetDateTime) -> NewPasswordToken {
        NewPasswordToken {
            user_id,
            purpose,
            token_hash: "0".repeat(64),
            expires_at,
        }
    }

    fn otp(user_id: i64) -> NewPasswordToken {
        new_token(user_id, TokenPurpose::Otp, NOW + Duration::minutes(15))
    }

    fn reset(user_id: i64) -> NewPasswordToken {
        new_token(user_id, TokenPurpose::PasswordReset, NOW + Duration::minutes(15))
    }

    fn fixed_store() -> InMemoryTokenStore {
        InMemoryTokenStore::with_clock(Arc::new(FixedClock(NOW)))
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = InMemoryTokenStore::new();
        let a = store.create(otp(1)).await.unwrap();
        let b = store.create(otp(1)).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.purpose, "otp");
        assert!(a.used_at.is_none());
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_created_at_comes_from_store_clock() {
        let record = fixed_store().create(otp(1)).await.unwrap();
        assert_eq!(record.created_at, NOW);
    }

    #[tokio::test]
    async fn test_failing_store_writes_nothing() {
        let store = InMemoryTokenStore::failing();
        let result = store.create(otp(1)).await;

        assert!(matches!(result, Err(MemoryStoreError::Unavailable)));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = InMemoryTokenStore::new();
        let other = store.clone();
        other.create(otp(9)).await.unwrap();
        assert_eq!(store.records()[0].user_id, 9);
    }

    #[tokio::test]
    async fn test_find_latest_active_filters() {
        let store = fixed_store();
        store
            .create(new_token(1, TokenPurpose::Otp, NOW))
            .await
            .unwrap();
        store.create(reset(1)).await.unwrap();
        store.create(otp(2)).await.unwrap();

        // 期限ちょうど・用途違い・別ユーザーは対象外
        let found = store
            .find_latest_active(1, TokenPurpose::Otp, NOW)
            .await
            .unwrap();
        assert!(found.is_none());

        let active = store.create(otp(1)).await.unwrap();
        let found = store
            .find_latest_active(1, TokenPurpose::Otp, NOW)
            .await
            .unwrap();
        assert_eq!(found.map(|t| t.id), Some(active.id));

        store.mark_as_used(active.id, NOW).await.unwrap();
        let found = store
            .find_latest_active(1, TokenPurpose::Otp, NOW)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_latest_active_prefers_newest() {
        let store = fixed_store();
        store.create(otp(1)).await.unwrap();
        let newest = store.create(otp(1)).await.unwrap();

        let found = store
            .find_latest_active(1, TokenPurpose::Otp, NOW)
            .await
            .unwrap();
        assert_eq!(found.map(|t| t.id), Some(newest.id));
    }

    #[tokio::test]
    async fn test_mark_as_used_only_once() {
        let store = fixed_store();
        let record = store.create(otp(1)).await.unwrap();

        assert!(store.mark_as_used(record.id, NOW).await.unwrap());
        assert!(!store.mark_as_used(record.id, NOW).await.unwrap());
        assert!(!store.mark_as_used(Uuid::new_v4(), NOW).await.unwrap());
        assert_eq!(store.records()[0].used_at, Some(NOW));
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_tokens() {
        let store = fixed_store();
        store
            .create(new_token(1, TokenPurpose::Otp, NOW - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .create(new_token(1, TokenPurpose::Otp, NOW))
            .await
            .unwrap();
        let live = store.create(otp(1)).await.unwrap();

        assert_eq!(store.delete_expired(NOW).await.unwrap(), 2);
        let remaining = store.records();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id);
    }

    #[tokio::test]
    async fn test_apply_password_reset_revokes_other_reset_tokens() {
        let store = fixed_store();
        store.add_user(1, "guest@example.com", "old");
        let older = store.create(reset(1)).await.unwrap();
        let used = store.create(reset(1)).await.unwrap();
        let code = store.create(otp(1)).await.unwrap();

        let revoked = store
            .apply_password_reset(1, used.id, "new", NOW)
            .await
            .unwrap();

        assert_eq!(revoked, Some(1));
        assert_eq!(store.password_hash_of(1).as_deref(), Some("new"));
        let records = store.records();
        let used_at = |id| records.iter().find(|t| t.id == id).and_then(|t| t.used_at);
        assert_eq!(used_at(older.id), Some(NOW));
        assert_eq!(used_at(used.id), Some(NOW));
        assert_eq!(used_at(code.id), None);

        // 2回目は何も変更しない
        let again = store
            .apply_password_reset(1, used.id, "newer", NOW)
            .await
            .unwrap();
        assert_eq!(again, None);
        assert_eq!(store.password_hash_of(1).as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_failed_password_reset_changes_nothing() {
        let store = fixed_store();
        store.add_user(1, "guest@example.com", "old");
        let token = store.create(reset(1)).await.unwrap();
        store.set_account_writes_failing(true);

        let result = store.apply_password_reset(1, token.id, "new", NOW).await;

        assert!(matches!(result, Err(MemoryStoreError::Unavailable)));
        assert_eq!(store.password_hash_of(1).as_deref(), Some("old"));
        assert!(store.records()[0].used_at.is_none());
    }

    #[tokio::test]
    async fn test_find_id_by_email() {
        let store = InMemoryTokenStore::new();
        store.add_user(7, "guest@example.com", "hash");

        assert_eq!(store.find_id_by_email("guest@example.com").await.unwrap(), Some(7));
        assert_eq!(store.find_id_by_email("other@example.com").await.unwrap(), None);
    }
}
