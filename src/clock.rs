use time::OffsetDateTime;

/// 現在時刻の取得元
///
/// 有効期限の計算や検証時の期限判定はすべてこのトレイト経由で行う。
/// テストでは `FixedClock` を注入して時刻を固定する。
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// システム時刻（UTC）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// 固定時刻を返すクロック
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}
