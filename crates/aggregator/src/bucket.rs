use barwatch_core::bar::error::ConfigError;
use barwatch_core::common::{BarInterval, BucketAlignment};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc};

/// # Summary
/// 时间分桶函数：把时间戳向下取整到所属桶的起点。
///
/// # Invariants
/// - 无状态，可在多个分区间并发共享。
/// - 对齐的是日历字段（在配置的 UTC 偏移下），而不是对 epoch 取模。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucketizer {
    // 日历所在时区
    offset: FixedOffset,
}

impl Default for Bucketizer {
    fn default() -> Self {
        Self::utc()
    }
}

impl Bucketizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// 以秒为单位的 UTC 偏移构造，超出 ±24 小时返回错误。
    pub fn from_offset_seconds(seconds: i32) -> Result<Self, ConfigError> {
        FixedOffset::east_opt(seconds)
            .map(Self::new)
            .ok_or(ConfigError::InvalidUtcOffset(seconds))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// # Summary
    /// 计算时间戳所属桶的起点。
    ///
    /// # Logic
    /// 1. 将时间戳转换为配置时区下的本地日历时间。
    /// 2. 秒与亚秒字段始终清零。
    /// 3. 按周期的对齐粒度清零：原始周期大于一分钟时清零分钟，大于一小时时清零小时，
    ///    大于一天时回到当年第一天。
    /// 4. 转换回 epoch 毫秒。
    ///
    /// # Arguments
    /// * `timestamp_ms`: 事件时间。
    /// * `interval`: 周期。
    ///
    /// # Returns
    /// 桶起点的 epoch 毫秒；时间戳超出日历范围时返回 `ConfigError::MalformedTimestamp`。
    pub fn bucket_start(&self, timestamp_ms: i64, interval: BarInterval) -> Result<i64, ConfigError> {
        let malformed = || ConfigError::MalformedTimestamp(timestamp_ms);
        let local = DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or_else(malformed)?
            .with_timezone(&self.offset)
            .naive_local();

        let (date, hour, minute) = match interval.alignment() {
            BucketAlignment::Minute => (local.date(), local.hour(), local.minute()),
            BucketAlignment::Hour => (local.date(), local.hour(), 0),
            BucketAlignment::Day => (local.date(), 0, 0),
            BucketAlignment::Year => (
                NaiveDate::from_yo_opt(local.year(), 1).ok_or_else(malformed)?,
                0,
                0,
            ),
        };

        let floored = date.and_hms_opt(hour, minute, 0).ok_or_else(malformed)?;
        floored
            .and_local_timezone(self.offset)
            .single()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(malformed)
    }
}
