use barwatch_core::common::time::{FakeClockProvider, TimeProvider};
use barwatch_core::schedule::error::SchedulerError;
use barwatch_core::schedule::port::{Scheduler, TaskHandle, WatchdogTask};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

#[derive(Default)]
struct Timeline {
    // 按 (到期时间, id) 排序的挂起任务
    queue: BTreeMap<(i64, u64), WatchdogTask>,
    // id 到到期时间的索引，用于取消
    due_at: HashMap<u64, i64>,
    next_id: u64,
    // 为 true 时模拟调度服务故障
    unavailable: bool,
}

/// # Summary
/// 模拟时钟调度器，用于确定性测试与历史回放。
///
/// # Invariants
/// - 时间只会由 `advance_to`/`advance_by` 向前推进，不会回退。
/// - 任务按到期时间（相同时间按调度顺序）依次执行，执行时不持有内部锁。
/// - 任务执行前时钟先拨到其到期时刻，任务内读取的 `now()` 即为到期时间。
pub struct ManualScheduler {
    clock: Arc<FakeClockProvider>,
    timeline: Mutex<Timeline>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<FakeClockProvider>) -> Self {
        Self {
            clock,
            timeline: Mutex::new(Timeline::default()),
        }
    }

    /// 以毫秒时间戳作为起点创建
    pub fn starting_at(millis: i64) -> Self {
        Self::new(Arc::new(FakeClockProvider::from_millis(millis)))
    }

    pub fn clock(&self) -> Arc<FakeClockProvider> {
        self.clock.clone()
    }

    /// # Summary
    /// 将时钟推进到指定时间，并依次执行期间到期的任务。
    ///
    /// # Logic
    /// 1. 取出最早到期且不晚于目标时间的任务，拨动时钟到其到期时刻。
    /// 2. 释放锁后执行任务（任务可能再次调度新任务，新任务若同样到期会在本轮执行）。
    /// 3. 没有到期任务后把时钟拨到目标时间。早于当前时间的目标不会让时钟回退。
    ///
    /// # Arguments
    /// * `target`: 目标时间 (epoch 毫秒)。
    ///
    /// # Returns
    /// 本次执行的任务数量。
    pub fn advance_to(&self, target: i64) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut timeline = self.lock();
                match timeline.queue.first_key_value().map(|(k, _)| *k) {
                    Some((due, id)) if due <= target => {
                        timeline.due_at.remove(&id);
                        if due > self.clock.now_millis() {
                            self.clock.set_millis(due);
                        }
                        timeline.queue.remove(&(due, id))
                    }
                    _ => None,
                }
            };
            match next {
                Some(task) => {
                    task();
                    fired += 1;
                }
                None => break,
            }
        }
        if target > self.clock.now_millis() {
            self.clock.set_millis(target);
        }
        fired
    }

    /// 将时钟向前推进指定时长
    pub fn advance_by(&self, delta: Duration) -> usize {
        let delta = i64::try_from(delta.as_millis()).unwrap_or(i64::MAX);
        self.advance_to(self.clock.now_millis().saturating_add(delta))
    }

    /// 最早挂起任务的到期时间
    pub fn next_due(&self) -> Option<i64> {
        self.lock().queue.first_key_value().map(|((due, _), _)| *due)
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// 模拟调度服务的可用性，不可用期间 `schedule` 返回错误
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    fn lock(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn schedule(&self, after: Duration, task: WatchdogTask) -> Result<TaskHandle, SchedulerError> {
        let mut timeline = self.lock();
        if timeline.unavailable {
            return Err(SchedulerError::Unavailable(
                "manual scheduler disabled".to_string(),
            ));
        }
        let id = timeline.next_id;
        timeline.next_id += 1;

        let after = i64::try_from(after.as_millis()).unwrap_or(i64::MAX);
        let due = self.clock.now_millis().saturating_add(after);
        timeline.queue.insert((due, id), task);
        timeline.due_at.insert(id, due);
        trace!("Scheduled task {} due at {}", id, due);
        Ok(TaskHandle::new(id))
    }

    fn cancel(&self, handle: TaskHandle) {
        let mut timeline = self.lock();
        if let Some(due) = timeline.due_at.remove(&handle.id()) {
            timeline.queue.remove(&(due, handle.id()));
        }
    }
}
