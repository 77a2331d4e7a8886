use crate::accumulator::{AccumulatorState, ArmedWatchdog, OpenBucket};
use crate::bucket::Bucketizer;
use barwatch_core::bar::entity::{Bar, Observation};
use barwatch_core::bar::error::AggregateError;
use barwatch_core::bar::port::BarSink;
use barwatch_core::common::{BarInterval, PartitionKey};
use barwatch_core::schedule::error::SchedulerError;
use barwatch_core::schedule::port::{Scheduler, TaskHandle};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// # Summary
/// 单条观测值的处理结果。
#[derive(Debug, Clone, PartialEq)]
pub enum ObserveOutcome {
    // 打开了新桶（此前没有打开的桶）
    Opened,
    // 折叠进当前打开的桶
    Accumulated,
    // 上一个桶被发布，并打开了新桶
    Rolled(Bar),
    // 迟到，已丢弃
    Late,
}

/// 看门狗时间参数（毫秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTiming {
    // 桶结束后额外等待的宽限期
    pub late_slack_ms: i64,
    // 看门狗刷新失败后的重试间隔
    pub flush_retry_ms: i64,
}

impl Default for WatchdogTiming {
    fn default() -> Self {
        Self {
            late_slack_ms: 5_000,
            flush_retry_ms: 5_000,
        }
    }
}

/// # Summary
/// 单个分区的 Bar 聚合器，持有该分区的累积状态与看门狗。
///
/// # Invariants
/// - 观测路径与看门狗回调通过同一把 `Mutex` 串行化，跨分区互不竞争。
/// - 同一个桶至多发布一次；发布失败时状态保持不变。
/// - 看门狗回调只持有弱引用，聚合器释放后回调自动失效。
pub struct BarAggregator {
    // 分区键
    partition_key: Option<PartitionKey>,
    // 分桶函数
    bucketizer: Bucketizer,
    // 看门狗参数
    timing: WatchdogTiming,
    // 定时调度服务
    scheduler: Arc<dyn Scheduler>,
    // 下游输出
    sink: Arc<dyn BarSink>,
    // 分区独占的累积状态
    state: Mutex<AccumulatorState>,
    // 指向自身的弱引用，供看门狗回调使用
    this: Weak<BarAggregator>,
}

impl BarAggregator {
    /// # Summary
    /// 创建聚合器。
    ///
    /// # Logic
    /// 通过 `Arc::new_cyclic` 构造，使实例持有自身的弱引用以便挂载看门狗。
    ///
    /// # Arguments
    /// * `partition_key`: 分区键。
    /// * `bucketizer`: 分桶函数。
    /// * `timing`: 看门狗参数。
    /// * `scheduler`: 定时调度服务。
    /// * `sink`: 下游输出。
    ///
    /// # Returns
    /// 聚合器的共享指针。
    pub fn create(
        partition_key: Option<PartitionKey>,
        bucketizer: Bucketizer,
        timing: WatchdogTiming,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn BarSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            partition_key,
            bucketizer,
            timing,
            scheduler,
            sink,
            state: Mutex::new(AccumulatorState::default()),
            this: this.clone(),
        })
    }

    pub fn partition_key(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    /// # Summary
    /// 处理一条观测值。
    ///
    /// # Logic
    /// 1. 计算所属桶。
    /// 2. 不晚于 cutoff（或早于当前打开桶）的桶视为迟到，静默丢弃。
    /// 3. 与当前桶相同则折叠。
    /// 4. 否则先挂载新看门狗，再发布当前桶，成功后打开新桶并替换旧看门狗。
    ///    任一步失败都会撤销已挂载的新看门狗并返回错误，状态保持不变。
    ///
    /// # Arguments
    /// * `obs`: 观测值。
    ///
    /// # Returns
    /// 处理结果，Sink 或 Scheduler 不可用时返回 `AggregateError`。
    pub fn observe(&self, obs: &Observation) -> Result<ObserveOutcome, AggregateError> {
        let bucket = self
            .bucketizer
            .bucket_start(obs.timestamp_ms(), obs.interval())?;
        let mut state = self.lock_state();

        if state.is_late(bucket) {
            debug!(
                "Discarding late observation for {} (bucket {}, cutoff {:?})",
                self.label(),
                bucket,
                state.cutoff
            );
            return Ok(ObserveOutcome::Late);
        }

        if let Some(open) = state.open.as_mut()
            && open.start == bucket
        {
            open.fold(obs.value());
            return Ok(ObserveOutcome::Accumulated);
        }

        let generation = state.next_generation();
        let delay = self.watchdog_delay(obs.interval())?;
        let handle = self.schedule_watchdog(generation, delay)?;

        let rolled = match self.flush_locked(&mut state) {
            Ok(bar) => bar,
            Err(e) => {
                self.scheduler.cancel(handle);
                return Err(e);
            }
        };

        state.open = Some(OpenBucket::new(bucket, obs.value()));
        if let Some(stale) = state
            .watchdog
            .replace(ArmedWatchdog { handle, generation })
        {
            self.scheduler.cancel(stale.handle);
        }

        Ok(match rolled {
            Some(bar) => ObserveOutcome::Rolled(bar),
            None => ObserveOutcome::Opened,
        })
    }

    /// # Summary
    /// 强制发布当前打开的桶（例如宿主关闭分区前）。
    ///
    /// # Returns
    /// 发布的 Bar；没有打开的桶时返回 None。
    pub fn flush(&self) -> Result<Option<Bar>, AggregateError> {
        let mut state = self.lock_state();
        self.flush_locked(&mut state)
    }

    /// 取消挂起的看门狗，打开的桶保持原样。
    pub fn close(&self) {
        let mut state = self.lock_state();
        if let Some(armed) = state.watchdog.take() {
            self.scheduler.cancel(armed.handle);
        }
    }

    /// 当前正在形成中的 Bar 快照
    pub fn forming_bar(&self) -> Option<Bar> {
        let state = self.lock_state();
        state
            .open
            .as_ref()
            .map(|open| open.to_bar(self.partition_key.clone()))
    }

    /// 最近一次发布的 Bar
    pub fn last_emitted(&self) -> Option<Bar> {
        self.lock_state().previous.clone()
    }

    pub fn cutoff(&self) -> Option<i64> {
        self.lock_state().cutoff
    }

    pub fn has_pending_watchdog(&self) -> bool {
        self.lock_state().watchdog.is_some()
    }

    /// # Summary
    /// 在已持有状态锁的前提下发布当前桶。
    ///
    /// # Logic
    /// 1. 没有打开的桶则直接返回。
    /// 2. 构造 Bar 并连同上一根 Bar 一起发布到 Sink。
    /// 3. 发布成功后才推进 cutoff、清空状态并取消挂起的看门狗。
    fn flush_locked(&self, state: &mut AccumulatorState) -> Result<Option<Bar>, AggregateError> {
        let Some(open) = state.open.as_ref() else {
            return Ok(None);
        };
        let bar = open.to_bar(self.partition_key.clone());
        self.sink.publish(&bar, state.previous.as_ref())?;

        debug!("Flushed bar for {} at {}", self.label(), bar.bucket_start);
        if let Some(armed) = state.commit_flush(bar.clone()) {
            self.scheduler.cancel(armed.handle);
        }
        Ok(Some(bar))
    }

    /// # Summary
    /// 看门狗到期回调。
    ///
    /// # Logic
    /// 1. 代号与当前挂载的看门狗不一致时说明已被取代，忽略。
    /// 2. 清除句柄并发布当前桶。
    /// 3. 发布失败则保留桶，按重试间隔重新挂载看门狗。
    fn on_watchdog(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.watchdog.map(|armed| armed.generation) != Some(generation) {
            debug!(
                "Ignoring superseded watchdog {} for {}",
                generation,
                self.label()
            );
            return;
        }
        state.watchdog = None;

        if let Err(e) = self.flush_locked(&mut state) {
            warn!(
                "Watchdog flush failed for {}: {}, retrying in {}ms",
                self.label(),
                e,
                self.timing.flush_retry_ms
            );
            let retry = state.next_generation();
            match self.schedule_watchdog(retry, millis_to_duration(self.timing.flush_retry_ms)) {
                Ok(handle) => {
                    state.watchdog = Some(ArmedWatchdog {
                        handle,
                        generation: retry,
                    });
                }
                Err(e) => {
                    error!(
                        "Cannot re-arm watchdog for {}: {}; bucket stays open until the next observation",
                        self.label(),
                        e
                    );
                }
            }
        }
    }

    /// # Summary
    /// 计算看门狗延迟。
    ///
    /// # Logic
    /// 目标时刻 = 当前时间所在桶起点 + 周期 + 宽限期，基于"现在"而不是桶的名义边界，
    /// 延迟起步的桶同样能获得完整的驻留时间。已过期时延迟为零，溢出时取饱和值。
    fn watchdog_delay(&self, interval: BarInterval) -> Result<Duration, AggregateError> {
        let now = self.scheduler.now();
        let target = self
            .bucketizer
            .bucket_start(now, interval)?
            .saturating_add(interval.millis())
            .saturating_add(self.timing.late_slack_ms);
        Ok(millis_to_duration(target.saturating_sub(now)))
    }

    fn schedule_watchdog(
        &self,
        generation: u64,
        delay: Duration,
    ) -> Result<TaskHandle, SchedulerError> {
        let this = self.this.clone();
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(aggregator) = this.upgrade() {
                    aggregator.on_watchdog(generation);
                }
            }),
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, AccumulatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn label(&self) -> &str {
        self.partition_key
            .as_ref()
            .map_or("<default>", PartitionKey::as_str)
    }
}

impl Drop for BarAggregator {
    /// 析构时取消挂起的看门狗。
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(armed) = state.watchdog.take() {
            self.scheduler.cancel(armed.handle);
        }
    }
}

fn millis_to_duration(millis: i64) -> Duration {
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}
