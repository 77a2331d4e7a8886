use crate::buffer::RollingBuffer;
use barwatch_core::bar::entity::Bar;
use barwatch_core::bar::error::SinkError;
use barwatch_core::bar::port::BarSink;
use barwatch_core::common::PartitionKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::warn;

/// 单个分区的物化结果。
#[derive(Debug, Clone)]
struct PartitionBars {
    // 最近一根 Bar
    latest: Bar,
    // 最近 N 根 Bar
    history: RollingBuffer<Bar>,
}

/// # Summary
/// "每个分区最新一根 Bar" 的物化视图，同时保留固定长度的历史。
///
/// # Invariants
/// - 所有操作均通过并发哈希表 `DashMap` 执行，保证多线程安全。
/// - 按更新对的替换语义维护：新 Bar 替换 `previous`。
/// - 同一个桶被重复发布时原地替换，历史中不出现重复桶。
pub struct LatestBarView {
    // 分区键到物化结果的映射
    storage: DashMap<Option<PartitionKey>, PartitionBars>,
    // 每个分区的历史容量
    history_capacity: usize,
}

impl LatestBarView {
    /// # Summary
    /// 创建物化视图。
    ///
    /// # Arguments
    /// * `history_capacity`: 每个分区保留的历史 Bar 数量。
    pub fn new(history_capacity: usize) -> Self {
        Self {
            storage: DashMap::new(),
            history_capacity,
        }
    }

    pub fn latest(&self, key: Option<&PartitionKey>) -> Option<Bar> {
        self.storage.get(&key.cloned()).map(|e| e.latest.clone())
    }

    /// 按时间顺序返回分区历史
    pub fn history(&self, key: Option<&PartitionKey>) -> Vec<Bar> {
        self.storage
            .get(&key.cloned())
            .map(|e| e.history.to_vec())
            .unwrap_or_default()
    }

    /// 所有分区的最新 Bar，按分区键排序
    pub fn snapshot(&self) -> Vec<Bar> {
        let mut bars: Vec<Bar> = self.storage.iter().map(|e| e.latest.clone()).collect();
        bars.sort_by(|a, b| a.partition_key.cmp(&b.partition_key));
        bars
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl BarSink for LatestBarView {
    /// # Summary
    /// 应用一个更新对。
    ///
    /// # Logic
    /// 1. 分区首次出现时直接建档。
    /// 2. 与现有最新 Bar 是同一个桶时视为重发，原地替换。
    /// 3. 否则校验 `previous` 与现有最新 Bar 一致（不一致只告警），再替换并追加历史。
    ///
    /// # Returns
    /// 始终返回 Ok。
    fn publish(&self, bar: &Bar, previous: Option<&Bar>) -> Result<(), SinkError> {
        let key = bar.partition_key.clone();
        match self.storage.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.latest.bucket_start == bar.bucket_start {
                    entry.history.replace_last(bar.clone());
                } else {
                    if previous != Some(&entry.latest) {
                        warn!(
                            "Update pair mismatch for {:?}: view holds bucket {}, previous is {:?}",
                            bar.partition_key,
                            entry.latest.bucket_start,
                            previous.map(|p| p.bucket_start)
                        );
                    }
                    entry.history.push(bar.clone());
                }
                entry.latest = bar.clone();
            }
            Entry::Vacant(vacant) => {
                let mut history = RollingBuffer::new(self.history_capacity);
                history.push(bar.clone());
                vacant.insert(PartitionBars {
                    latest: bar.clone(),
                    history,
                });
            }
        }
        Ok(())
    }
}
