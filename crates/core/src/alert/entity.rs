use crate::common::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 告警类型，每种类型拥有独立的触发规则与严重度阶梯。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighVolatility,
    NewsCatalyst,
    TechnicalBreakout,
    FundamentalChange,
    SectorRotation,
}

impl AlertType {
    /// 全部告警类型，按评估顺序排列
    pub const ALL: [AlertType; 5] = [
        AlertType::HighVolatility,
        AlertType::NewsCatalyst,
        AlertType::TechnicalBreakout,
        AlertType::FundamentalChange,
        AlertType::SectorRotation,
    ];
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::HighVolatility => write!(f, "HIGH_VOLATILITY"),
            AlertType::NewsCatalyst => write!(f, "NEWS_CATALYST"),
            AlertType::TechnicalBreakout => write!(f, "TECHNICAL_BREAKOUT"),
            AlertType::FundamentalChange => write!(f, "FUNDAMENTAL_CHANGE"),
            AlertType::SectorRotation => write!(f, "SECTOR_ROTATION"),
        }
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIGH_VOLATILITY" => Ok(AlertType::HighVolatility),
            "NEWS_CATALYST" => Ok(AlertType::NewsCatalyst),
            "TECHNICAL_BREAKOUT" => Ok(AlertType::TechnicalBreakout),
            "FUNDAMENTAL_CHANGE" => Ok(AlertType::FundamentalChange),
            "SECTOR_ROTATION" => Ok(AlertType::SectorRotation),
            _ => Err(format!("Unknown AlertType: {}", s)),
        }
    }
}

/// # Summary
/// 告警严重度，声明顺序即由低到高。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("Unknown Severity: {}", s)),
        }
    }
}

/// 活跃告警的唯一键
pub type AlertKey = (Symbol, AlertType);

/// # Summary
/// 一个告警周期 (episode)：从首次触发到清除。
///
/// # Invariants
/// - 同一 (symbol, alert_type) 同时最多存在一个活跃告警。
/// - 清除后为终态，不会被重新激活；再次触发会产生新的 `id` 与 `raised_at`。
/// - 同一周期内严重度只升不降。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    // 告警周期唯一标识
    pub id: String,
    pub symbol: Symbol,
    pub alert_type: AlertType,
    pub severity: Severity,
    // 最近一次观测到的量值
    pub magnitude: f64,
    pub raised_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        (self.symbol.clone(), self.alert_type)
    }

    pub fn is_active(&self) -> bool {
        self.cleared_at.is_none()
    }
}

/// # Summary
/// 一次评估中告警发生的状态迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertTransition {
    Raised,
    Escalated { from: Severity },
    Cleared,
}

/// # Summary
/// 迁移记录，携带迁移后的告警快照，供通知层使用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertChange {
    pub transition: AlertTransition,
    pub alert: Alert,
}
