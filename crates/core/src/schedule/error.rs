use thiserror::Error;

/// # Summary
/// 定时服务错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    // 底层定时服务不可用（例如没有运行中的 runtime）
    #[error("Scheduler unavailable: {0}")]
    Unavailable(String),
    // 定时服务已关闭，不再接受新任务
    #[error("Scheduler closed")]
    Closed,
}
