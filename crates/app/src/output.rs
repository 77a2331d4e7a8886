use std::io::Write;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

/// 写线程前的缓冲行数
const BUFFERED_LINES: usize = 16_384;

/// # Summary
/// 把阻塞的 writer 包装成非阻塞 writer，由独立线程完成真正的 IO。
///
/// # Logic
/// 1. Sink 在分区锁内、可能在 tokio 工作线程上被调用，写入只进入内存队列。
/// 2. 关闭 lossy 模式：队列满时等待而不是丢弃 Bar。
///
/// # Returns
/// 非阻塞 writer 与写线程守卫，守卫析构时刷出剩余数据。
pub fn non_blocking<W: Write + Send + 'static>(writer: W) -> (NonBlocking, WorkerGuard) {
    NonBlockingBuilder::default()
        .lossy(false)
        .buffered_lines_limit(BUFFERED_LINES)
        .finish(writer)
}
