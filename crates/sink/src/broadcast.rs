use barwatch_core::bar::entity::{Bar, BarUpdate};
use barwatch_core::bar::error::SinkError;
use barwatch_core::bar::port::{BarSink, BarStream};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// # Summary
/// 把更新对广播给任意数量订阅者的 Sink。
///
/// # Invariants
/// - 没有订阅者时发布仍然成功，更新对直接丢弃。
/// - 订阅者消费过慢时跳过被覆盖的更新对，而不是阻塞聚合器。
pub struct BroadcastSink {
    tx: broadcast::Sender<BarUpdate>,
}

impl BroadcastSink {
    /// # Arguments
    /// * `capacity`: 通道容量，为 0 时按 1 处理。
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// # Summary
    /// 订阅更新对实时流。
    ///
    /// # Logic
    /// 1. 从广播通道创建接收端并包装成异步流。
    /// 2. 落后时记录告警并继续，发送端关闭后流结束。
    ///
    /// # Returns
    /// 异步更新对流。
    pub fn subscribe(&self) -> BarStream {
        let rx = self.tx.subscribe();
        let stream = async_stream::stream! {
            let mut rx = rx;
            loop {
                match rx.recv().await {
                    Ok(update) => yield update,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Bar subscriber lagged, skipped {} updates", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Box::pin(stream)
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BarSink for BroadcastSink {
    fn publish(&self, bar: &Bar, previous: Option<&Bar>) -> Result<(), SinkError> {
        let update = BarUpdate {
            bar: bar.clone(),
            previous: previous.cloned(),
        };
        // 无订阅者时 send 返回错误，不影响发布结果
        if self.tx.send(update).is_err() {
            trace!("No subscribers for bar at {}", bar.bucket_start);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn bar(start: i64, close: f64) -> Bar {
        Bar {
            bucket_start: start,
            open: close,
            close,
            high: close,
            low: close,
            partition_key: None,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_update_pairs() {
        let sink = BroadcastSink::new(16);
        let mut stream = sink.subscribe();
        assert_eq!(sink.subscribers(), 1);

        let first = bar(0, 1.0);
        let second = bar(60_000, 2.0);
        sink.publish(&first, None).unwrap();
        sink.publish(&second, Some(&first)).unwrap();

        let update = stream.next().await.unwrap();
        assert_eq!(update.bar, first);
        assert!(update.previous.is_none());

        let update = stream.next().await.unwrap();
        assert_eq!(update.bar, second);
        assert_eq!(update.previous, Some(first));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_succeeds() {
        let sink = BroadcastSink::new(4);
        assert!(sink.publish(&bar(0, 1.0), None).is_ok());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_and_continues() {
        let sink = BroadcastSink::new(2);
        let mut stream = sink.subscribe();
        for i in 0..5_i32 {
            sink.publish(&bar(i64::from(i) * 60_000, f64::from(i)), None)
                .unwrap();
        }
        drop(sink);

        let starts: Vec<i64> = stream.by_ref().map(|u| u.bar.bucket_start).collect().await;
        assert_eq!(starts, vec![180_000, 240_000]);
    }
}
