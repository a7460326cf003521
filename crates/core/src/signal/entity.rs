use serde::{Deserialize, Serialize};

/// # Summary
/// 交易动作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// # Summary
/// 建议仓位档位，只表达定性大小，不给出具体股数。
///
/// # Invariants
/// - `None` 仅用于 HOLD。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSize {
    None,
    Small,
    Medium,
    Large,
}

/// # Summary
/// 建议持有周期。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeHorizon {
    Intraday,
    Swing,
    Position,
}

/// # Summary
/// 交易信号及其风险参数。
///
/// # Invariants
/// - BUY: `stop_loss < entry_price < take_profit`，且收益距离 ≥ 2 × 风险距离。
/// - SELL: 不等式方向相反，风险收益比要求相同。
/// - HOLD: 不携带任何价格目标。
/// - `confidence` 位于 [0,1]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: TradeAction,
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    // 实际收益/风险比，HOLD 时为空
    pub risk_reward: Option<f64>,
    pub position_size: PositionSize,
    pub time_horizon: TimeHorizon,
}

impl Signal {
    /// 构造不带价格目标的 HOLD 信号
    pub fn hold(confidence: f64, time_horizon: TimeHorizon) -> Self {
        Self {
            action: TradeAction::Hold,
            confidence,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            risk_reward: None,
            position_size: PositionSize::None,
            time_horizon,
        }
    }

    /// 是否携带完整的价格目标
    pub fn has_targets(&self) -> bool {
        self.entry_price.is_some() && self.stop_loss.is_some() && self.take_profit.is_some()
    }
}
