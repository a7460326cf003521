use crate::alert::entity::AlertType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// # Summary
/// 子评分维度名称，例如 fundamental / technical / sentiment。
///
/// # Invariants
/// - 维度集合可扩展，只有在权重配置中出现的维度才参与聚合。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(String);

impl Dimension {
    pub const FUNDAMENTAL: &'static str = "fundamental";
    pub const TECHNICAL: &'static str = "technical";
    pub const SENTIMENT: &'static str = "sentiment";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn fundamental() -> Self {
        Self::new(Self::FUNDAMENTAL)
    }

    pub fn technical() -> Self {
        Self::new(Self::TECHNICAL)
    }

    pub fn sentiment() -> Self {
        Self::new(Self::SENTIMENT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dimension {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// # Summary
/// 单维度子评分。
///
/// # Invariants
/// - `Available` 的值应位于 [0,1]，越界值在聚合时按计算错误处理。
/// - 序列化为裸数字或 `{"unavailable": "原因"}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubScore {
    Available(f64),
    Unavailable { unavailable: String },
}

impl SubScore {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        SubScore::Unavailable {
            unavailable: reason.into(),
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            SubScore::Available(v) => Some(*v),
            SubScore::Unavailable { .. } => None,
        }
    }
}

/// 按维度组织的子评分集合
pub type SubScores = BTreeMap<Dimension, SubScore>;

/// # Summary
/// 告警规则使用的原始量值，均为非负幅度。
///
/// # Invariants
/// - 缺失的量值表示本周期无法判断，对应规则跳过评估。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertMetrics {
    // 波动率，占价格的比例 (0.04 即 4%)，同时作为止损计算的波动提示
    pub volatility: Option<f64>,
    // 新闻冲击强度 [0,1]
    pub news_impact: Option<f64>,
    // 突破近期区间的幅度比例
    pub breakout: Option<f64>,
    // 基本面评分相对上一快照的变化幅度
    pub fundamental_shift: Option<f64>,
    // 相对板块强弱的偏离比例
    pub sector_rotation: Option<f64>,
}

impl AlertMetrics {
    /// 取出指定告警类型对应的量值
    pub fn magnitude(&self, alert_type: AlertType) -> Option<f64> {
        match alert_type {
            AlertType::HighVolatility => self.volatility,
            AlertType::NewsCatalyst => self.news_impact,
            AlertType::TechnicalBreakout => self.breakout,
            AlertType::FundamentalChange => self.fundamental_shift,
            AlertType::SectorRotation => self.sector_rotation,
        }
    }
}

/// # Summary
/// IndicatorSource 针对单个标的返回的一次读数。
///
/// # Invariants
/// - `price` 为最新成交价，必须为正的有限数，否则视为数据源错误。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReading {
    // 最新成交价
    pub price: f64,
    // 各维度子评分
    pub sub_scores: SubScores,
    // 告警原始量值与波动提示
    #[serde(default)]
    pub metrics: AlertMetrics,
}

impl IndicatorReading {
    /// 波动提示，供信号生成计算止损距离
    pub fn volatility(&self) -> Option<f64> {
        self.metrics.volatility
    }
}
