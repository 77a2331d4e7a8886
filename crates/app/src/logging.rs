use barwatch_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// 滚动日志文件名前缀
const LOG_FILE: &str = "barwatch.log";

/// # Summary
/// 安装全局 tracing 订阅器。
///
/// # Logic
/// 1. `RUST_LOG` 存在时优先使用，否则使用配置中的级别。
/// 2. 配置了目录时按天滚动写文件，否则写 stderr（stdout 留给 Bar 输出）。
/// 3. 写入经由 `tracing-appender` 的非阻塞通道。
///
/// # Returns
/// 后台写线程的守卫，必须持有到进程退出，否则尾部日志会丢失。
pub fn init(config: &LogConfig) -> anyhow::Result<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let (writer, guard) = match &config.dir {
        Some(dir) => {
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.dir.is_none())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;
    Ok(guard)
}
