use crate::bar::entity::{Bar, BarUpdate};
use crate::bar::error::SinkError;
use futures::Stream;
use std::pin::Pin;

/// # Summary
/// 更新对数据流别名，使用动态分发的异步流。
pub type BarStream = Pin<Box<dyn Stream<Item = BarUpdate> + Send>>;

/// # Summary
/// Bar 输出端口 (Sink)。
///
/// # Invariants
/// - 实现类必须保证线程安全 (`Send` + `Sync`)。
/// - `publish` 不得阻塞，它在分区状态锁内被调用。
/// - 返回错误即表示该 Bar 未被接收，聚合器会保留状态等待重试，
///   因此同一个更新对可能被重复发布，实现应当按"替换"语义幂等处理。
pub trait BarSink: Send + Sync {
    /// # Summary
    /// 发布一个更新对。
    ///
    /// # Arguments
    /// * `bar`: 新产生的 Bar。
    /// * `previous`: 本分区上一根已发布的 Bar，首根为 None。
    ///
    /// # Returns
    /// 成功返回 Ok，下游不可用时返回 `SinkError`。
    fn publish(&self, bar: &Bar, previous: Option<&Bar>) -> Result<(), SinkError>;
}
