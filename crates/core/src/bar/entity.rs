use crate::bar::error::ConfigError;
use crate::common::{BarInterval, PartitionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单条带时间戳的观测值（例如一笔成交价）。
///
/// # Invariants
/// - 只能通过 `Observation::new` 构造，`value` 一定是有限值，
///   `timestamp_ms` 一定能映射为日历时间。
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    // 事件时间 (epoch 毫秒)
    timestamp_ms: i64,
    // 观测值
    value: f64,
    // 分区键
    partition_key: Option<PartitionKey>,
    // 所属周期
    interval: BarInterval,
}

impl Observation {
    /// # Summary
    /// 校验并构造观测值。
    ///
    /// # Logic
    /// 1. 拒绝 NaN 与无穷值。
    /// 2. 拒绝超出日历范围的时间戳。
    ///
    /// # Arguments
    /// * `timestamp_ms`: 事件时间。
    /// * `value`: 观测值。
    /// * `partition_key`: 可选分区键。
    /// * `interval`: 周期。
    ///
    /// # Returns
    /// 成功返回观测值，否则返回 `ConfigError`。
    pub fn new(
        timestamp_ms: i64,
        value: f64,
        partition_key: Option<PartitionKey>,
        interval: BarInterval,
    ) -> Result<Self, ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::NonFiniteValue(value));
        }
        if DateTime::from_timestamp_millis(timestamp_ms).is_none() {
            return Err(ConfigError::MalformedTimestamp(timestamp_ms));
        }
        Ok(Self {
            timestamp_ms,
            value,
            partition_key,
            interval,
        })
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn partition_key(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    pub fn interval(&self) -> BarInterval {
        self.interval
    }
}

/// # Summary
/// 一个时间桶的汇总记录。
///
/// # Invariants
/// - `low <= open, close <= high`。
/// - 构造后不可变，每次 flush 产生一个实例。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    // 桶起始时间 (epoch 毫秒)
    pub bucket_start: i64,
    // 第一个观测值
    pub open: f64,
    // 最后一个观测值
    pub close: f64,
    // 最大值
    pub high: f64,
    // 最小值
    pub low: f64,
    // 分区键
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<PartitionKey>,
}

impl Bar {
    /// 桶起始时间的 UTC 表示
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.bucket_start)
    }
}

/// # Summary
/// 更新对：新 Bar 以及它在逻辑上替代的上一根 Bar。
///
/// # Invariants
/// - 分区内第一根 Bar 的 `previous` 为 None。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarUpdate {
    pub bar: Bar,
    pub previous: Option<Bar>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_rejects_non_finite_value() {
        let res = Observation::new(0, f64::NAN, None, BarInterval::MINUTE1);
        assert!(matches!(res, Err(ConfigError::NonFiniteValue(_))));
    }

    #[test]
    fn test_observation_rejects_out_of_range_timestamp() {
        let res = Observation::new(i64::MAX, 1.0, None, BarInterval::MINUTE1);
        assert_eq!(res, Err(ConfigError::MalformedTimestamp(i64::MAX)));
    }

    #[test]
    fn test_bar_json_shape() {
        let bar = Bar {
            bucket_start: 60_000,
            open: 10.0,
            close: 12.0,
            high: 12.0,
            low: 10.0,
            partition_key: Some(PartitionKey::new("BTC/USD")),
        };
        let json = serde_json::to_value(&bar).unwrap();
        assert_eq!(json["bucketStart"], 60_000);
        assert_eq!(json["partitionKey"], "BTC/USD");
        assert_eq!(bar.time().unwrap().timestamp(), 60);
    }
}
