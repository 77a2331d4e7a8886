use barwatch_core::config::AppConfig;
use config::{Config, Environment, File};

/// 未指定路径时尝试加载的配置文件
const DEFAULT_CONFIG: &str = "barwatch";

/// # Summary
/// 加载应用配置。
///
/// # Logic
/// 1. 以内置默认值为底。
/// 2. 叠加配置文件：指定路径时必须存在，否则尝试可选的 `barwatch.toml`。
/// 3. 叠加 `BARWATCH__SECTION__KEY` 形式的环境变量。
///
/// # Arguments
/// * `path`: 命令行指定的配置文件路径。
///
/// # Returns
/// 合并后的配置。
pub fn load(path: Option<&str>) -> Result<AppConfig, config::ConfigError> {
    let file = match path {
        Some(path) => File::with_name(path),
        None => File::with_name(DEFAULT_CONFIG).required(false),
    };
    Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(file)
        .add_source(
            Environment::with_prefix("BARWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
