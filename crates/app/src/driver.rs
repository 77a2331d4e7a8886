use crate::input;
use barwatch_aggregator::aggregator::ObserveOutcome;
use barwatch_aggregator::registry::{AggregatorFactory, AggregatorRegistry};
use barwatch_core::bar::entity::Observation;
use barwatch_core::bar::port::BarSink;
use barwatch_core::common::BarInterval;
use barwatch_core::common::time::{RealTimeProvider, TimeProvider};
use barwatch_core::config::AppConfig;
use barwatch_timer::manual::ManualScheduler;
use barwatch_timer::runtime::TokioScheduler;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// 回放排空阶段允许的无进展轮数
const MAX_STALLED_ROUNDS: usize = 16;
/// 单条观测值的最大处理次数（含首次）
const MAX_OBSERVE_ATTEMPTS: usize = 3;

/// 一次运行的输入统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    // 被聚合器接收的观测值
    pub accepted: usize,
    // 迟到丢弃
    pub late: usize,
    // 无法解析的输入行
    pub skipped: usize,
    // 重试次数
    pub retried: usize,
    // 重试后仍聚合失败（Sink 或调度器不可用）
    pub failed: usize,
    // 由观测值或关闭时强制刷新发布的 Bar
    pub flushed: usize,
}

impl DriverStats {
    /// # Summary
    /// 处理一条观测值并计数。
    ///
    /// # Logic
    /// 1. Sink 或调度器失败时聚合器状态保持不变，同一条观测值可以安全重试。
    /// 2. 最多尝试 `MAX_OBSERVE_ATTEMPTS` 次，仍失败则计为失败并丢弃。
    fn record(&mut self, registry: &AggregatorRegistry, obs: &Observation) {
        let mut attempt = 1;
        loop {
            match registry.observe(obs) {
                Ok(ObserveOutcome::Late) => self.late += 1,
                Ok(ObserveOutcome::Rolled(_)) => {
                    self.accepted += 1;
                    self.flushed += 1;
                }
                Ok(_) => self.accepted += 1,
                Err(e) if attempt < MAX_OBSERVE_ATTEMPTS => {
                    warn!(
                        "Observation at {} failed (attempt {}/{}): {}, retrying",
                        obs.timestamp_ms(),
                        attempt,
                        MAX_OBSERVE_ATTEMPTS,
                        e
                    );
                    self.retried += 1;
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Dropping observation at {} after {} attempts: {}",
                        obs.timestamp_ms(),
                        attempt,
                        e
                    );
                    self.failed += 1;
                }
            }
            return;
        }
    }
}

fn parse(
    line: &str,
    line_no: usize,
    default_interval: BarInterval,
    stats: &mut DriverStats,
) -> Option<Observation> {
    match input::parse_line(line, default_interval) {
        Ok(obs) => obs,
        Err(e) => {
            warn!("Skipping input line {}: {}", line_no, e);
            stats.skipped += 1;
            None
        }
    }
}

/// # Summary
/// 实时模式：真实时钟 + tokio 定时器，边读边聚合。
///
/// # Logic
/// 1. 构造 `TokioScheduler` 与分区注册表。
/// 2. 逐行读取输入，直到 EOF 或收到 Ctrl-C。
/// 3. 强制刷新所有分区的打开桶，然后关闭调度器。
///
/// # Arguments
/// * `config`: 应用配置。
/// * `sink`: 下游输出。
/// * `reader`: 行输入源。
///
/// # Returns
/// 输入统计。
pub async fn run_live<R>(
    config: &AppConfig,
    sink: Arc<dyn BarSink>,
    reader: R,
) -> anyhow::Result<DriverStats>
where
    R: AsyncBufRead + Unpin,
{
    let default_interval = config.input.default_interval;
    let scheduler = Arc::new(TokioScheduler::new(Arc::new(RealTimeProvider))?);
    let factory = AggregatorFactory::new(&config.aggregator, scheduler.clone(), sink)?;
    let registry = AggregatorRegistry::new(factory);

    let mut stats = DriverStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("Input exhausted after {} lines", line_no);
                    break;
                };
                line_no += 1;
                if let Some(obs) = parse(&line, line_no, default_interval, &mut stats) {
                    stats.record(&registry, &obs);
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    stats.flushed += registry.flush_all();
    scheduler.shutdown();
    Ok(stats)
}

/// # Summary
/// 回放模式：模拟时钟跟随事件时间，结果与安静的实时流完全一致。
///
/// # Logic
/// 1. 每条观测值处理前先把时钟推进到其时间戳（不回退），期间到期的看门狗依次触发。
/// 2. 输入结束后按到期顺序排空剩余看门狗。
/// 3. 连续多轮没有桶被发布（例如 Sink 持续失败）时放弃排空并告警。
///
/// # Arguments
/// * `config`: 应用配置。
/// * `sink`: 下游输出。
/// * `reader`: 行输入源。
///
/// # Returns
/// 输入统计。
pub async fn run_replay<R>(
    config: &AppConfig,
    sink: Arc<dyn BarSink>,
    reader: R,
) -> anyhow::Result<DriverStats>
where
    R: AsyncBufRead + Unpin,
{
    let default_interval = config.input.default_interval;
    let scheduler = Arc::new(ManualScheduler::starting_at(0));
    let factory = AggregatorFactory::new(&config.aggregator, scheduler.clone(), sink)?;
    let registry = AggregatorRegistry::new(factory);

    let mut stats = DriverStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if let Some(obs) = parse(&line, line_no, default_interval, &mut stats) {
            scheduler.advance_to(obs.timestamp_ms());
            stats.record(&registry, &obs);
        }
    }

    let mut stalled = 0;
    while let Some(due) = scheduler.next_due() {
        let open = registry.open_buckets();
        scheduler.advance_to(due);
        if registry.open_buckets() < open {
            stalled = 0;
        } else {
            stalled += 1;
            if stalled >= MAX_STALLED_ROUNDS {
                warn!(
                    "Giving up draining after {} stalled rounds, {} buckets left open",
                    stalled,
                    registry.open_buckets()
                );
                break;
            }
        }
    }
    info!("Replay finished at {}", scheduler.clock().now_millis());
    Ok(stats)
}
