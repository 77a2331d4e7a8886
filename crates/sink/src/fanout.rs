use barwatch_core::bar::entity::Bar;
use barwatch_core::bar::error::SinkError;
use barwatch_core::bar::port::BarSink;
use std::sync::Arc;

/// # Summary
/// 组合多个下游的 Sink。
///
/// # Invariants
/// - 按注册顺序依次发布，遇到第一个失败立即返回该错误。
/// - 失败后聚合器会重发同一个更新对，排在前面的下游会再次收到，
///   因此下游必须按替换语义幂等处理。
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn BarSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn BarSink>>) -> Self {
        Self { sinks }
    }

    /// 追加一个下游
    pub fn with(mut self, sink: Arc<dyn BarSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl BarSink for FanoutSink {
    fn publish(&self, bar: &Bar, previous: Option<&Bar>) -> Result<(), SinkError> {
        for sink in &self.sinks {
            sink.publish(bar, previous)?;
        }
        Ok(())
    }
}
