use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

// 美股常规交易时段 (UTC 小时, 左闭右开)
const REGULAR_OPEN_HOUR: u32 = 14;
const REGULAR_CLOSE_HOUR: u32 = 21;

/// # Summary
/// 周期开始时所处的交易时段，仅作为报告上下文，不影响评分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketSession {
    Open,
    PreMarket,
    AfterHours,
    ClosedWeekend,
}

impl MarketSession {
    /// # Summary
    /// 根据 UTC 时间推断交易时段。
    ///
    /// # Logic
    /// 1. 周六、周日一律视为休市。
    /// 2. 14:00-21:00 UTC 为常规时段，之前为盘前，之后为盘后。
    pub fn at(time: DateTime<Utc>) -> Self {
        if matches!(time.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketSession::ClosedWeekend;
        }
        let hour = time.hour();
        if hour < REGULAR_OPEN_HOUR {
            MarketSession::PreMarket
        } else if hour < REGULAR_CLOSE_HOUR {
            MarketSession::Open
        } else {
            MarketSession::AfterHours
        }
    }
}

impl std::fmt::Display for MarketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketSession::Open => write!(f, "OPEN"),
            MarketSession::PreMarket => write!(f, "PRE_MARKET"),
            MarketSession::AfterHours => write!(f, "AFTER_HOURS"),
            MarketSession::ClosedWeekend => write!(f, "CLOSED_WEEKEND"),
        }
    }
}
