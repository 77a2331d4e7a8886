use barwatch_core::bar::entity::{Bar, BarUpdate};
use barwatch_core::bar::error::SinkError;
use barwatch_core::bar::port::BarSink;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

/// # Summary
/// 以 JSON Lines 格式输出更新对的 Sink，每个更新对一行。
///
/// # Invariants
/// - 每行写完立即 flush，下游可逐行消费。
/// - 写入失败返回 `SinkError`，聚合器保留状态并稍后重试。
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// 取回内部 writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, W> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> BarSink for JsonLinesSink<W> {
    /// # Summary
    /// 序列化并写出一行。
    ///
    /// # Logic
    /// 1. 先在内存中完成序列化，避免写出半行。
    /// 2. 追加换行后一次写入并 flush。
    fn publish(&self, bar: &Bar, previous: Option<&Bar>) -> Result<(), SinkError> {
        let update = BarUpdate {
            bar: bar.clone(),
            previous: previous.cloned(),
        };
        let mut line =
            serde_json::to_vec(&update).map_err(|e| SinkError::Serialize(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.lock();
        writer
            .write_all(&line)
            .and_then(|_| writer.flush())
            .map_err(|e| SinkError::Io(e.to_string()))
    }
}
