use kanshi_core::config::ConfigError;
use kanshi_core::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// Manager 层的统一错误类型。
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Continuous monitoring already running")]
    AlreadyRunning,
    #[error("No symbols to monitor")]
    NoSymbols,
    #[error("Monitor task failed: {0}")]
    Task(String),
}
