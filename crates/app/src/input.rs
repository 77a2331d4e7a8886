use barwatch_core::bar::entity::Observation;
use barwatch_core::bar::error::ConfigError;
use barwatch_core::common::{BarInterval, PartitionKey};
use serde::Deserialize;
use thiserror::Error;

/// 输入行解析错误
#[derive(Error, Debug)]
pub enum InputError {
    // 不是合法的 JSON 记录
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    // 字段值非法
    #[error("invalid record: {0}")]
    Invalid(#[from] ConfigError),
}

/// # Summary
/// 一行 JSON 输入记录。
///
/// # Invariants
/// - `partitionKey` 与 `intervalSeconds` 可省略，省略周期时使用默认周期。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    // 事件时间 (epoch 毫秒)
    pub timestamp: i64,
    // 观测值
    pub value: f64,
    // 分区键
    #[serde(default)]
    pub partition_key: Option<String>,
    // 周期（秒）
    #[serde(default)]
    pub interval_seconds: Option<f64>,
}

impl ObservationRecord {
    /// 校验并转换为观测值
    pub fn into_observation(
        self,
        default_interval: BarInterval,
    ) -> Result<Observation, ConfigError> {
        let interval = match self.interval_seconds {
            Some(seconds) => BarInterval::try_from(seconds)?,
            None => default_interval,
        };
        Observation::new(
            self.timestamp,
            self.value,
            self.partition_key.map(PartitionKey::from),
            interval,
        )
    }
}

/// # Summary
/// 解析一行输入。
///
/// # Returns
/// 空行返回 `Ok(None)`，否则返回观测值或解析错误。
pub fn parse_line(
    line: &str,
    default_interval: BarInterval,
) -> Result<Option<Observation>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let record: ObservationRecord = serde_json::from_str(line)?;
    Ok(Some(record.into_observation(default_interval)?))
}
