use crate::aggregator::{BarAggregator, ObserveOutcome, WatchdogTiming};
use crate::bucket::Bucketizer;
use barwatch_core::bar::entity::Observation;
use barwatch_core::bar::error::{AggregateError, ConfigError};
use barwatch_core::bar::port::BarSink;
use barwatch_core::common::PartitionKey;
use barwatch_core::config::AggregatorConfig;
use barwatch_core::schedule::port::Scheduler;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// # Summary
/// 聚合器工厂，为每个分区键生产一个独立的 `BarAggregator`。
///
/// # Invariants
/// - 分桶函数、调度器、Sink 与时间参数在所有分区间共享且只读。
/// - 周期随观测值携带，不存在跨分区共享的可变周期。
#[derive(Clone)]
pub struct AggregatorFactory {
    bucketizer: Bucketizer,
    timing: WatchdogTiming,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn BarSink>,
}

impl AggregatorFactory {
    /// # Summary
    /// 根据配置构造工厂。
    ///
    /// # Logic
    /// 1. 校验配置，非法值快速失败。
    /// 2. 由 UTC 偏移构造分桶函数。
    ///
    /// # Arguments
    /// * `config`: 聚合器配置。
    /// * `scheduler`: 定时调度服务。
    /// * `sink`: 下游输出。
    ///
    /// # Returns
    /// 成功返回工厂，配置非法返回 `ConfigError`。
    pub fn new(
        config: &AggregatorConfig,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn BarSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            bucketizer: Bucketizer::from_offset_seconds(config.utc_offset_seconds)?,
            timing: WatchdogTiming {
                late_slack_ms: config.late_slack_millis(),
                flush_retry_ms: config.flush_retry_millis(),
            },
            scheduler,
            sink,
        })
    }

    pub fn create(&self, partition_key: Option<PartitionKey>) -> Arc<BarAggregator> {
        BarAggregator::create(
            partition_key,
            self.bucketizer,
            self.timing,
            self.scheduler.clone(),
            self.sink.clone(),
        )
    }
}

/// # Summary
/// 分区注册表：分区键到聚合器实例的映射。
///
/// # Invariants
/// - 每个分区键至多对应一个活跃聚合器。
/// - 调用聚合器前先释放 DashMap 的分片锁，分区之间互不阻塞。
pub struct AggregatorRegistry {
    // 聚合器工厂
    factory: AggregatorFactory,
    // 活跃分区
    partitions: DashMap<Option<PartitionKey>, Arc<BarAggregator>>,
}

impl AggregatorRegistry {
    pub fn new(factory: AggregatorFactory) -> Self {
        Self {
            factory,
            partitions: DashMap::new(),
        }
    }

    /// # Summary
    /// 将观测值路由到其分区的聚合器。
    ///
    /// # Logic
    /// 1. 按观测值的分区键获取或创建聚合器。
    /// 2. 委托聚合器处理。
    pub fn observe(&self, obs: &Observation) -> Result<ObserveOutcome, AggregateError> {
        let aggregator = self.get_or_create(obs.partition_key());
        aggregator.observe(obs)
    }

    /// # Summary
    /// 获取或创建分区聚合器。
    ///
    /// # Logic
    /// 1. 先以只读方式查找，命中则直接返回。
    /// 2. 未命中时通过 entry API 原子插入，避免并发下重复创建。
    pub fn get_or_create(&self, key: Option<&PartitionKey>) -> Arc<BarAggregator> {
        let slot = key.cloned();
        if let Some(existing) = self.partitions.get(&slot) {
            return existing.clone();
        }
        self.partitions
            .entry(slot.clone())
            .or_insert_with(|| {
                info!(
                    "Creating aggregator for partition {}",
                    slot.as_ref().map_or("<default>", PartitionKey::as_str)
                );
                self.factory.create(slot)
            })
            .clone()
    }

    pub fn get(&self, key: Option<&PartitionKey>) -> Option<Arc<BarAggregator>> {
        self.partitions.get(&key.cloned()).map(|a| a.clone())
    }

    /// # Summary
    /// 移除分区。
    ///
    /// # Logic
    /// 从注册表移除并取消其看门狗；打开的桶不会被发布，需要时由调用方先 `flush`。
    pub fn evict(&self, key: Option<&PartitionKey>) -> Option<Arc<BarAggregator>> {
        let (_, aggregator) = self.partitions.remove(&key.cloned())?;
        aggregator.close();
        debug!("Evicted partition {:?}", key);
        Some(aggregator)
    }

    /// # Summary
    /// 强制发布所有分区的打开桶（关闭前调用）。
    ///
    /// # Logic
    /// 1. 先收集所有聚合器，释放注册表锁。
    /// 2. 逐个 flush，失败只记录告警并继续。
    ///
    /// # Returns
    /// 成功发布的 Bar 数量。
    pub fn flush_all(&self) -> usize {
        let aggregators: Vec<Arc<BarAggregator>> =
            self.partitions.iter().map(|e| e.value().clone()).collect();

        let mut flushed = 0;
        for aggregator in aggregators {
            match aggregator.flush() {
                Ok(Some(_)) => flushed += 1,
                Ok(None) => {}
                Err(e) => warn!(
                    "Failed to flush partition {:?}: {}",
                    aggregator.partition_key(),
                    e
                ),
            }
        }
        flushed
    }

    /// 仍有打开桶的分区数量
    pub fn open_buckets(&self) -> usize {
        let aggregators: Vec<Arc<BarAggregator>> =
            self.partitions.iter().map(|e| e.value().clone()).collect();
        aggregators
            .iter()
            .filter(|a| a.forming_bar().is_some())
            .count()
    }

    pub fn partitions(&self) -> Vec<Option<PartitionKey>> {
        self.partitions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}
