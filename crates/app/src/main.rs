mod config;
mod driver;
mod input;
mod logging;
mod output;

use std::sync::Arc;

use barwatch_core::bar::port::BarSink;
use barwatch_core::config::InputMode;
use barwatch_sink::broadcast::BroadcastSink;
use barwatch_sink::fanout::FanoutSink;
use barwatch_sink::json::JsonLinesSink;
use barwatch_sink::view::LatestBarView;
use futures::StreamExt;
use tokio::io::BufReader;
use tracing::{debug, info};

/// 广播通道容量
const BROADCAST_CAPACITY: usize = 1024;

/// # Summary
/// 应用启动入口，负责装配组件并选择驱动方式。
///
/// # Logic
/// 1. 加载配置并初始化全局日志。
/// 2. 组装下游：非阻塞 stdout JSON Lines、最新 Bar 视图、广播流。
/// 3. 按配置以实时或回放模式消费 stdin。
/// 4. 退出前输出视图摘要。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 配置与日志
    let path = std::env::args().nth(1);
    let config = config::load(path.as_deref())?;
    let _guard = logging::init(&config.log)?;
    info!("barwatch starting in {:?} mode", config.input.mode);

    // 2. 下游输出，stdout 由独立线程写出
    let (stdout, _stdout_guard) = output::non_blocking(std::io::stdout());
    let view = Arc::new(LatestBarView::new(config.view.history_capacity));
    let broadcast = Arc::new(BroadcastSink::new(BROADCAST_CAPACITY));
    let sink: Arc<dyn BarSink> = Arc::new(FanoutSink::new(vec![
        Arc::new(JsonLinesSink::new(stdout)),
        view.clone(),
        broadcast.clone(),
    ]));

    let mut updates = broadcast.subscribe();
    let monitor = tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            debug!(
                "Bar {:?}@{} replaces {:?}",
                update.bar.partition_key,
                update.bar.bucket_start,
                update.previous.map(|p| p.bucket_start)
            );
        }
    });

    // 3. 驱动
    let reader = BufReader::new(tokio::io::stdin());
    let stats = match config.input.mode {
        InputMode::Live => driver::run_live(&config, sink, reader).await?,
        InputMode::Replay => driver::run_replay(&config, sink, reader).await?,
    };
    drop(broadcast);
    monitor.await?;

    // 4. 摘要
    info!(
        "Processed input: {} accepted, {} late, {} skipped, {} failed",
        stats.accepted, stats.late, stats.skipped, stats.failed
    );
    for bar in view.snapshot() {
        info!(
            "Latest bar {:?}@{}: O={} H={} L={} C={}",
            bar.partition_key, bar.bucket_start, bar.open, bar.high, bar.low, bar.close
        );
    }
    Ok(())
}
