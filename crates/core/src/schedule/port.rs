use crate::schedule::error::SchedulerError;
use std::time::Duration;

/// # Summary
/// 到期后执行一次的看门狗任务。
pub type WatchdogTask = Box<dyn FnOnce() + Send + 'static>;

/// # Summary
/// 已调度任务的可取消句柄。
///
/// # Invariants
/// - 同一个 Scheduler 实例内唯一，不跨实例复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// # Summary
/// 定时调度能力接口 (Port)，与具体定时器实现解耦。
///
/// # Invariants
/// - 所有方法均为非阻塞调用。
/// - 任务不得在持有 Scheduler 内部锁时执行，任务内可以再次调用 `schedule`/`cancel`。
/// - 实现既可以是真实时钟，也可以是模拟时钟（确定性测试与回放）。
pub trait Scheduler: Send + Sync {
    /// # Summary
    /// 获取调度器视角下的当前时间。
    ///
    /// # Returns
    /// 毫秒时间戳。
    fn now(&self) -> i64;

    /// # Summary
    /// 在指定延迟后执行任务。
    ///
    /// # Arguments
    /// * `after`: 延迟时长。
    /// * `task`: 到期后执行的任务。
    ///
    /// # Returns
    /// 成功返回可取消句柄，调度服务不可用时返回 `SchedulerError`。
    fn schedule(&self, after: Duration, task: WatchdogTask) -> Result<TaskHandle, SchedulerError>;

    /// # Summary
    /// 取消尚未执行的任务。
    ///
    /// # Logic
    /// 任务已执行或句柄未知时静默忽略。
    fn cancel(&self, handle: TaskHandle);
}
