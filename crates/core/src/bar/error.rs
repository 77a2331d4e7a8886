use crate::schedule::error::SchedulerError;
use thiserror::Error;

/// # Summary
/// 配置与输入边界错误，必须在进入聚合器之前快速失败。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    // 周期非正数或非有限值
    #[error("Interval must be a positive finite number of seconds, got {0}")]
    NonPositiveInterval(f64),
    // 周期超过允许的上限
    #[error("Interval too large: {0} seconds")]
    IntervalTooLarge(f64),
    // 无法解析的周期文本
    #[error("Unknown interval: {0}")]
    UnknownInterval(String),
    // 时间戳无法映射为日历时间
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(i64),
    // 观测值为 NaN 或无穷
    #[error("Observation value must be finite, got {0}")]
    NonFiniteValue(f64),
    // 迟到宽限期为负
    #[error("Late slack must not be negative, got {0}s")]
    NegativeSlack(i64),
    // 迟到宽限期超过上限
    #[error("Late slack too large: {0}s")]
    SlackTooLarge(i64),
    // 刷新重试间隔非正
    #[error("Flush retry delay must be positive, got {0}s")]
    NonPositiveRetry(i64),
    // 刷新重试间隔超过上限
    #[error("Flush retry delay too large: {0}s")]
    RetryTooLarge(i64),
    // UTC 偏移超出范围
    #[error("Invalid UTC offset: {0}s")]
    InvalidUtcOffset(i32),
}

/// # Summary
/// 下游 Sink 发布失败。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    // 下游暂不可用，可重试
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
    // 序列化失败
    #[error("Serialize error: {0}")]
    Serialize(String),
    // 写出失败
    #[error("IO error: {0}")]
    Io(String),
}

/// # Summary
/// 聚合器操作错误。
///
/// # Invariants
/// - 返回任何错误时，聚合器内存状态保持不变，调用方可原样重试。
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}
