use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// # Summary
/// 时间供给器接口，用于隔离物理系统时钟。
/// 看门狗的触发时刻与回放驱动都通过此接口读取当前时间。
pub trait TimeProvider: Send + Sync {
    /// 获取当前时间
    fn now(&self) -> DateTime<Utc>;

    /// 获取当前时间的毫秒时间戳
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// # Summary
/// 实时运行使用的真实时钟，直接返回操作系统当前时间。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 回放与测试专用的虚拟时钟，以毫秒时间戳保存当前时间，由驱动方主动拨动。
///
/// # Invariants
/// - 并发安全：内部利用 `RwLock` 提供多线程读写。
/// - 时钟本身不限制方向，单调性由调用方（如 `ManualScheduler`）保证。
pub struct FakeClockProvider {
    current_millis: RwLock<i64>,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self::from_millis(initial_time.timestamp_millis())
    }

    /// 使用毫秒时间戳创建虚拟时钟
    pub fn from_millis(initial_millis: i64) -> Self {
        Self {
            current_millis: RwLock::new(initial_millis),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        self.set_millis(new_time.timestamp_millis());
    }

    pub fn set_millis(&self, millis: i64) {
        let mut current = self
            .current_millis
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *current = millis;
    }

    /// 将时钟向前拨动指定毫秒数
    pub fn advance_millis(&self, delta: i64) {
        let mut current = self
            .current_millis
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *current = current.saturating_add(delta);
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_millis()).unwrap_or_default()
    }

    fn now_millis(&self) -> i64 {
        *self.current_millis.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fake_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap();
        let clock = FakeClockProvider::new(start);
        assert_eq!(clock.now(), start);

        clock.advance_millis(61_000);
        assert_eq!(clock.now_millis(), start.timestamp_millis() + 61_000);

        clock.set_millis(0);
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH);
    }
}
