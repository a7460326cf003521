use config::{Config, Environment, File, Map};
use kanshi_core::config::{ConfigError, LoggingConfig, MonitorConfig};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// 未设置 KANSHI_CONFIG 时读取的配置文件
const DEFAULT_CONFIG_FILE: &str = "kanshi.toml";
const ENV_PREFIX: &str = "KANSHI";
const ENV_SEPARATOR: &str = "__";

/// # Summary
/// 从配置文件与环境变量加载监控配置。
///
/// # Logic
/// 1. 读取 `KANSHI_CONFIG` 指定的文件，未指定时尝试 `kanshi.toml`，文件可缺省。
/// 2. 以 `KANSHI__SECTION__KEY` 形式的环境变量覆盖文件中的值。
///
/// # Returns
/// * `Ok(MonitorConfig)` - 反序列化后的配置，尚未校验。
/// * `Err(ConfigError::Load)` - 文件格式错误或字段类型不匹配。
pub fn load_config() -> Result<MonitorConfig, ConfigError> {
    let path = std::env::var("KANSHI_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
    load_from(&path, None)
}

/// # Summary
/// `load_config` 的可测试版本，`env` 为空时读取进程环境变量。
pub fn load_from(path: &Path, env: Option<Map<String, String>>) -> Result<MonitorConfig, ConfigError> {
    let environment = Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("run.symbols")
        .source(env);

    Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(environment)
        .build()
        .and_then(|c| c.try_deserialize::<MonitorConfig>())
        .map_err(|e| ConfigError::Load(e.to_string()))
}

/// # Summary
/// 初始化全局日志。
///
/// # Logic
/// 1. 过滤级别优先取 `RUST_LOG`，否则使用 `logging.level`。
/// 2. 始终输出到标准输出。
/// 3. 配置了 `logging.directory` 时额外写入按天滚动的文件。
///
/// # Returns
/// * 文件输出的 guard，必须在 `main` 结束前一直持有，否则尾部日志会丢失。
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "kanshi.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanshi_core::config::RunModeConfig;
    use kanshi_core::market::entity::Dimension;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_from(&dir.path().join("absent.toml"), Some(Map::new())).unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kanshi.toml");
        std::fs::write(
            &path,
            r#"
[run]
mode = "continuous"
symbols = ["AAPL", "MSFT"]

[scheduler]
max_concurrency = 4
interval_secs = 60

[scoring.weights]
fundamental = 0.5
technical = 0.5
"#,
        )
        .unwrap();

        let config = load_from(&path, Some(Map::new())).unwrap();
        assert_eq!(config.run.mode, RunModeConfig::Continuous);
        assert_eq!(config.run.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(config.scheduler.max_concurrency, 4);
        assert_eq!(config.scheduler.symbol_timeout_ms, 30_000);
        assert_eq!(config.scoring.weights.len(), 2);
        assert_eq!(config.scoring.weights.get(&Dimension::fundamental()), Some(&0.5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kanshi.toml");
        std::fs::write(&path, "[scheduler]\nmax_concurrency = 4\n").unwrap();

        let mut env = Map::new();
        env.insert("KANSHI__SCHEDULER__MAX_CONCURRENCY".to_string(), "12".to_string());
        env.insert("KANSHI__RUN__SYMBOLS".to_string(), "TSLA,NVDA".to_string());
        env.insert("KANSHI__STORE__PERSISTENCE".to_string(), "false".to_string());

        let config = load_from(&path, Some(env)).unwrap();
        assert_eq!(config.scheduler.max_concurrency, 12);
        assert_eq!(config.run.symbols, vec!["TSLA", "NVDA"]);
        assert!(!config.store.persistence);
    }

    #[test]
    fn test_malformed_value_is_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kanshi.toml");
        std::fs::write(&path, "[scheduler]\nmax_concurrency = \"many\"\n").unwrap();

        let err = load_from(&path, Some(Map::new())).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
