use crate::alert::entity::{AlertType, Severity};
use crate::market::entity::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// 单标的并发上限的硬性上界
pub const MAX_CONCURRENCY_LIMIT: usize = 64;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// # Summary
/// 配置错误，启动时一次性校验失败即终止。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 字段取值不合法
    #[error("Invalid configuration `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    /// 配置源加载或反序列化失败
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// # Summary
/// 全局监控配置，所有阈值与权重都在此处集中定义。
///
/// # Invariants
/// - 在 `MonitorScheduler::new` 中调用一次 `validate()`，之后视为只读。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub scoring: ScoringConfig,
    pub signal: SignalConfig,
    pub alerts: AlertConfig,
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
    pub run: RunConfig,
}

impl MonitorConfig {
    /// # Summary
    /// 校验全部配置段。
    ///
    /// # Returns
    /// 第一个不合法字段对应的 `ConfigError::Invalid`。
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        self.signal.validate()?;
        self.alerts.validate()?;
        self.scheduler.validate()?;
        self.store.validate()?;
        self.notify.validate()?;
        Ok(())
    }
}

/// 评分聚合配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: BTreeMap<Dimension, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(Dimension::fundamental(), 0.4);
        weights.insert(Dimension::technical(), 0.4);
        weights.insert(Dimension::sentiment(), 0.2);
        Self { weights }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.weights.is_empty() {
            return Err(ConfigError::invalid("scoring.weights", "no dimension configured"));
        }
        for (dimension, weight) in &self.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::invalid(
                    format!("scoring.weights.{}", dimension),
                    format!("weight must be a non-negative finite number, got {}", weight),
                ));
            }
        }
        if !self.weights.values().any(|w| *w > 0.0) {
            return Err(ConfigError::invalid("scoring.weights", "at least one weight must be positive"));
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::invalid(
                "scoring.weights",
                format!("weights must sum to 1.0, got {}", sum),
            ));
        }
        Ok(())
    }
}

/// 信号生成配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    // 离散度对置信度的影响权重
    pub agreement_weight: f64,
    // 数据源未提供波动率时使用的默认值
    pub default_volatility: f64,
    pub stop_multiplier: f64,
    pub take_profit_multiplier: f64,
    pub min_risk_reward: f64,
    pub large_confidence: f64,
    pub medium_confidence: f64,
    pub intraday_volatility: f64,
    pub position_volatility: f64,
    pub opportunity_min_confidence: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            agreement_weight: 0.5,
            default_volatility: 0.02,
            stop_multiplier: 1.5,
            take_profit_multiplier: 2.5,
            min_risk_reward: 2.0,
            large_confidence: 0.7,
            medium_confidence: 0.5,
            intraday_volatility: 0.05,
            position_volatility: 0.015,
            opportunity_min_confidence: 0.7,
        }
    }
}

impl SignalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("signal.agreement_weight", self.agreement_weight),
            ("signal.large_confidence", self.large_confidence),
            ("signal.medium_confidence", self.medium_confidence),
            ("signal.opportunity_min_confidence", self.opportunity_min_confidence),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("must be within [0,1], got {}", value)));
            }
        }
        if self.medium_confidence > self.large_confidence {
            return Err(ConfigError::invalid(
                "signal.medium_confidence",
                "must not exceed signal.large_confidence",
            ));
        }

        let positive = [
            ("signal.default_volatility", self.default_volatility),
            ("signal.stop_multiplier", self.stop_multiplier),
            ("signal.take_profit_multiplier", self.take_profit_multiplier),
            ("signal.intraday_volatility", self.intraday_volatility),
            ("signal.position_volatility", self.position_volatility),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::invalid(field, format!("must be positive, got {}", value)));
            }
        }
        if !self.min_risk_reward.is_finite() || self.min_risk_reward < 2.0 {
            return Err(ConfigError::invalid(
                "signal.min_risk_reward",
                format!("must be at least 2.0, got {}", self.min_risk_reward),
            ));
        }
        Ok(())
    }
}

/// # Summary
/// 单个告警类型的严重度阶梯。
///
/// # Invariants
/// - `low < medium < high < critical`，且均为正数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityLadder {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl SeverityLadder {
    pub const fn new(low: f64, medium: f64, high: f64, critical: f64) -> Self {
        Self {
            low,
            medium,
            high,
            critical,
        }
    }

    /// # Summary
    /// 将量值映射到严重度。
    ///
    /// # Returns
    /// 低于 LOW 阈值 (或非有限数) 返回 `None`，表示条件不成立。
    pub fn severity_of(&self, magnitude: f64) -> Option<Severity> {
        if !magnitude.is_finite() {
            return None;
        }
        if magnitude >= self.critical {
            Some(Severity::Critical)
        } else if magnitude >= self.high {
            Some(Severity::High)
        } else if magnitude >= self.medium {
            Some(Severity::Medium)
        } else if magnitude >= self.low {
            Some(Severity::Low)
        } else {
            None
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        let steps = [self.low, self.medium, self.high, self.critical];
        if steps.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(ConfigError::invalid(field, "thresholds must be positive"));
        }
        if steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid(field, "thresholds must be strictly ascending"));
        }
        Ok(())
    }
}

/// 告警规则配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub high_volatility: SeverityLadder,
    pub news_catalyst: SeverityLadder,
    pub technical_breakout: SeverityLadder,
    pub fundamental_change: SeverityLadder,
    pub sector_rotation: SeverityLadder,
    // 内存中保留的已清除告警数量
    pub history_limit: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            high_volatility: SeverityLadder::new(0.03, 0.05, 0.08, 0.12),
            news_catalyst: SeverityLadder::new(0.40, 0.60, 0.75, 0.90),
            technical_breakout: SeverityLadder::new(0.02, 0.04, 0.07, 0.10),
            fundamental_change: SeverityLadder::new(0.10, 0.20, 0.30, 0.45),
            sector_rotation: SeverityLadder::new(0.03, 0.06, 0.10, 0.15),
            history_limit: 100,
        }
    }
}

impl AlertConfig {
    pub fn ladder(&self, alert_type: AlertType) -> &SeverityLadder {
        match alert_type {
            AlertType::HighVolatility => &self.high_volatility,
            AlertType::NewsCatalyst => &self.news_catalyst,
            AlertType::TechnicalBreakout => &self.technical_breakout,
            AlertType::FundamentalChange => &self.fundamental_change,
            AlertType::SectorRotation => &self.sector_rotation,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for alert_type in AlertType::ALL {
            let field = format!("alerts.{}", alert_type.to_string().to_lowercase());
            self.ladder(alert_type).validate(&field)?;
        }
        if self.history_limit == 0 {
            return Err(ConfigError::invalid("alerts.history_limit", "must be at least 1"));
        }
        Ok(())
    }
}

/// 调度配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub symbol_timeout_ms: u64,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            symbol_timeout_ms: 30_000,
            interval_secs: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn symbol_timeout(&self) -> Duration {
        Duration::from_millis(self.symbol_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY_LIMIT).contains(&self.max_concurrency) {
            return Err(ConfigError::invalid(
                "scheduler.max_concurrency",
                format!("must be within 1..={}, got {}", MAX_CONCURRENCY_LIMIT, self.max_concurrency),
            ));
        }
        if self.symbol_timeout_ms == 0 {
            return Err(ConfigError::invalid("scheduler.symbol_timeout_ms", "must be positive"));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::invalid("scheduler.interval_secs", "must be positive"));
        }
        Ok(())
    }
}

/// 持久化配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    // 关闭时使用内存存储
    pub persistence: bool,
    pub data_dir: String,
    pub commit_retries: u32,
    pub commit_backoff_ms: u64,
    // 数据库中保留的已清除告警数量
    pub retention: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            persistence: true,
            data_dir: "data".to_string(),
            commit_retries: 2,
            commit_backoff_ms: 200,
            retention: 500,
        }
    }
}

impl StoreConfig {
    pub fn commit_backoff(&self) -> Duration {
        Duration::from_millis(self.commit_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retention == 0 {
            return Err(ConfigError::invalid("store.retention", "must be at least 1"));
        }
        Ok(())
    }
}

/// 通知分发配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub queue_capacity: usize,
    pub publish_timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            publish_timeout_ms: 10_000,
        }
    }
}

impl NotifyConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("notify.queue_capacity", "must be at least 1"));
        }
        if self.publish_timeout_ms == 0 {
            return Err(ConfigError::invalid("notify.publish_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    // 设置后额外输出按天滚动的日志文件
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// 运行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunModeConfig {
    Once,
    Continuous,
}

/// 二进制入口的运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub mode: RunModeConfig,
    pub symbols: Vec<String>,
    // 读数 JSON 文件所在目录
    pub feed_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunModeConfig::Once,
            symbols: Vec::new(),
            feed_dir: "feed".to_string(),
        }
    }
}
