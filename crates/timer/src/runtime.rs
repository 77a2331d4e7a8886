use barwatch_core::common::time::TimeProvider;
use barwatch_core::schedule::error::SchedulerError;
use barwatch_core::schedule::port::{Scheduler, TaskHandle, WatchdogTask};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, info};

/// 挂起任务登记项，abort 句柄在 spawn 之后才补上。
#[derive(Default)]
struct PendingTask {
    abort: Option<AbortHandle>,
}

/// # Summary
/// 基于 tokio 定时器的调度服务。
///
/// # Invariants
/// - 每个任务对应一个 tokio 协程：先 `sleep`，再执行。
/// - 任务执行前必须从登记表中成功移除自身，被取消的任务因此不会执行。
/// - `shutdown` 之后拒绝新任务。
pub struct TokioScheduler {
    // 任务运行所在的 runtime
    runtime: Handle,
    // 当前时间来源
    clock: Arc<dyn TimeProvider>,
    // 挂起任务登记表
    pending: Arc<DashMap<u64, PendingTask>>,
    // 任务 id 分配器
    next_id: AtomicU64,
    // 是否已关闭
    closed: AtomicBool,
}

impl TokioScheduler {
    /// # Summary
    /// 绑定当前 tokio runtime 创建调度器。
    ///
    /// # Logic
    /// 1. 获取当前上下文的 runtime 句柄，不在 runtime 内时返回 `SchedulerError::Unavailable`。
    ///
    /// # Arguments
    /// * `clock`: 当前时间来源。
    ///
    /// # Returns
    /// 调度器实例。
    pub fn new(clock: Arc<dyn TimeProvider>) -> Result<Self, SchedulerError> {
        let runtime =
            Handle::try_current().map_err(|e| SchedulerError::Unavailable(e.to_string()))?;
        Ok(Self::with_handle(runtime, clock))
    }

    pub fn with_handle(runtime: Handle, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            runtime,
            clock,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// 挂起任务数量
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// # Summary
    /// 关闭调度器。
    ///
    /// # Logic
    /// 1. 标记关闭，后续 `schedule` 返回 `SchedulerError::Closed`。
    /// 2. 中止并清空所有挂起任务。
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.cancel(TaskHandle::new(*id));
        }
        info!("Scheduler shut down, {} pending tasks aborted", ids.len());
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn schedule(&self, after: Duration, task: WatchdogTask) -> Result<TaskHandle, SchedulerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.pending.insert(id, PendingTask::default());

        let pending = self.pending.clone();
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if pending.remove(&id).is_some() {
                task();
            }
        });

        if let Some(mut entry) = self.pending.get_mut(&id) {
            entry.abort = Some(join.abort_handle());
        }
        Ok(TaskHandle::new(id))
    }

    fn cancel(&self, handle: TaskHandle) {
        if let Some((_, entry)) = self.pending.remove(&handle.id()) {
            if let Some(abort) = entry.abort {
                abort.abort();
            }
            debug!("Cancelled task {}", handle.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwatch_core::common::time::FakeClockProvider;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: &Arc<AtomicUsize>) -> WatchdogTask {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_fires_after_delay() {
        let scheduler = TokioScheduler::new(Arc::new(FakeClockProvider::from_millis(42))).unwrap();
        assert_eq!(scheduler.now(), 42);

        let fired = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule(Duration::from_secs(65), counter_task(&fired))
            .unwrap();
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(Duration::from_secs(64)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_fires() {
        let scheduler = TokioScheduler::new(Arc::new(FakeClockProvider::from_millis(0))).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = scheduler
            .schedule(Duration::from_secs(1), counter_task(&fired))
            .unwrap();
        scheduler.cancel(handle);
        // 重复取消无副作用
        scheduler.cancel(handle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_task_runs() {
        let scheduler = TokioScheduler::new(Arc::new(FakeClockProvider::from_millis(0))).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(Duration::ZERO, counter_task(&fired)).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_and_rejects() {
        let scheduler = TokioScheduler::new(Arc::new(FakeClockProvider::from_millis(0))).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule(Duration::from_secs(1), counter_task(&fired))
            .unwrap();
        scheduler.shutdown();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(
            scheduler.schedule(Duration::from_secs(1), counter_task(&fired)),
            Err(SchedulerError::Closed)
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_new_outside_runtime_is_unavailable() {
        let res = TokioScheduler::new(Arc::new(FakeClockProvider::from_millis(0)));
        assert!(matches!(res, Err(SchedulerError::Unavailable(_))));
    }
}
