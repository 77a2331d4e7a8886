use crate::bar::error::ConfigError;
use crate::common::{BarInterval, MAX_INTERVAL_SECS};
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub aggregator: AggregatorConfig,
    pub input: InputConfig,
    pub view: ViewConfig,
    pub log: LogConfig,
}

/// # Summary
/// 聚合器的时间参数。
///
/// # Invariants
/// - 通过 `validate` 后才能用于构造聚合器工厂。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    // 看门狗在桶结束后额外等待的宽限期
    pub late_slack_seconds: i64,
    // 看门狗刷新失败后的重试间隔
    pub flush_retry_seconds: i64,
    // 桶对齐所用日历的 UTC 偏移
    pub utc_offset_seconds: i32,
}

impl AggregatorConfig {
    /// # Summary
    /// 校验时间参数。
    ///
    /// # Logic
    /// 1. 宽限期不得为负。
    /// 2. 重试间隔必须为正。
    /// 3. 宽限期与重试间隔都不得超过最大周期，保证看门狗时刻的计算不会溢出。
    /// 4. UTC 偏移必须在 ±24 小时以内。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = i64::from(MAX_INTERVAL_SECS);
        if self.late_slack_seconds < 0 {
            return Err(ConfigError::NegativeSlack(self.late_slack_seconds));
        }
        if self.late_slack_seconds > max {
            return Err(ConfigError::SlackTooLarge(self.late_slack_seconds));
        }
        if self.flush_retry_seconds <= 0 {
            return Err(ConfigError::NonPositiveRetry(self.flush_retry_seconds));
        }
        if self.flush_retry_seconds > max {
            return Err(ConfigError::RetryTooLarge(self.flush_retry_seconds));
        }
        if chrono::FixedOffset::east_opt(self.utc_offset_seconds).is_none() {
            return Err(ConfigError::InvalidUtcOffset(self.utc_offset_seconds));
        }
        Ok(())
    }

    pub fn late_slack_millis(&self) -> i64 {
        self.late_slack_seconds.saturating_mul(1_000)
    }

    pub fn flush_retry_millis(&self) -> i64 {
        self.flush_retry_seconds.saturating_mul(1_000)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            late_slack_seconds: 5,
            flush_retry_seconds: 5,
            utc_offset_seconds: 0,
        }
    }
}

/// 输入驱动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    // 真实时钟，边读边聚合
    Live,
    // 模拟时钟跟随事件时间回放
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub mode: InputMode,
    // 观测值未携带周期时使用的默认周期，秒数或 "90s"/"5m"/"1h"/"1d"
    pub default_interval: BarInterval,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mode: InputMode::Live,
            default_interval: BarInterval::MINUTE1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    // 每个分区保留的历史 Bar 数量
    pub history_capacity: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            history_capacity: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    // 设置后按天滚动写入该目录，否则写 stderr
    pub dir: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.aggregator.late_slack_seconds, 5);
        assert_eq!(config.aggregator.flush_retry_seconds, 5);
        assert_eq!(config.aggregator.utc_offset_seconds, 0);
        assert_eq!(config.input.mode, InputMode::Live);
        assert_eq!(config.input.default_interval, BarInterval::MINUTE1);
        assert_eq!(config.view.history_capacity, 200);
        assert_eq!(config.log.level, "info");
        assert!(config.aggregator.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AggregatorConfig {
            late_slack_seconds: -1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NegativeSlack(-1)));

        config.late_slack_seconds = 0;
        config.flush_retry_seconds = 0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveRetry(0)));

        config.late_slack_seconds = i64::MAX / 1_000;
        config.flush_retry_seconds = 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::SlackTooLarge(i64::MAX / 1_000))
        );

        config.late_slack_seconds = 5;
        config.flush_retry_seconds = i64::MAX;
        assert_eq!(config.validate(), Err(ConfigError::RetryTooLarge(i64::MAX)));

        config.flush_retry_seconds = 1;
        config.utc_offset_seconds = 90_000;
        assert_eq!(config.validate(), Err(ConfigError::InvalidUtcOffset(90_000)));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"aggregator":{"late_slack_seconds":2},"input":{"mode":"replay"}}"#)
                .unwrap();
        assert_eq!(config.aggregator.late_slack_seconds, 2);
        assert_eq!(config.aggregator.flush_retry_seconds, 5);
        assert_eq!(config.input.mode, InputMode::Replay);
        assert_eq!(config.input.default_interval, BarInterval::MINUTE1);
    }

    #[test]
    fn test_default_interval_accepts_text_or_seconds() {
        let config: AppConfig =
            serde_json::from_str(r#"{"input":{"default_interval":"5m"}}"#).unwrap();
        assert_eq!(config.input.default_interval.seconds(), 300);

        let config: AppConfig =
            serde_json::from_str(r#"{"input":{"default_interval":3600}}"#).unwrap();
        assert_eq!(config.input.default_interval, BarInterval::HOUR1);

        assert!(serde_json::from_str::<AppConfig>(r#"{"input":{"default_interval":0}}"#).is_err());
    }
}
