use time::{Duration, OffsetDateTime};

/// 有効期限（分）が未設定・不正な場合のデフォルト
pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// トークン有効期限ポリシー
///
/// 設定値は構築時に注入する。0 や負の値もそのまま採用する
/// （発行と同時に期限切れになる）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    ttl_minutes: i64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }
}

impl TtlPolicy {
    /// 分単位の値から作成
    ///
    /// `Duration` で表現できない値はデフォルトにフォールバックする。
    pub fn from_minutes(ttl_minutes: i64) -> Self {
        if ttl_minutes.checked_mul(60).is_none() {
            tracing::warn!(ttl_minutes, "トークン有効期限が範囲外（デフォルトを使用）");
            return Self::default();
        }
        Self { ttl_minutes }
    }

    /// 設定文字列（PASSWORD_TOKEN_TTL_MIN）から作成
    pub fn from_setting(setting: Option<&str>) -> Self {
        let Some(raw) = setting.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        match raw.parse::<i64>() {
            Ok(minutes) => Self::from_minutes(minutes),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "トークン有効期限の設定が不正（デフォルトを使用）");
                Self::default()
            }
        }
    }

    pub fn resolve_ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// `now` に有効期限を加算した時刻
    pub fn compute_expiry(&self, now: OffsetDateTime) -> OffsetDateTime {
        let ttl = Duration::minutes(self.ttl_minutes);
        now.checked_add(ttl).unwrap_or_else(|| {
            // 日付の表現範囲を超える場合は発行時刻で打ち切る（即時失効）
            tracing::warn!(ttl_minutes = self.ttl_minutes, "有効期限が日付の範囲外");
            now
        })
    }
}
