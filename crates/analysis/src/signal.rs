use kanshi_core::config::SignalConfig;
use kanshi_core::score::entity::{DataQuality, Grade};
use kanshi_core::signal::entity::{PositionSize, Signal, TimeHorizon, TradeAction};
use tracing::warn;

/// # Summary
/// 信号生成所需的全部输入。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInput {
    pub grade: Grade,
    pub score: f64,
    // 子评分离散度，越低说明各维度越一致
    pub dispersion: f64,
    // 最新成交价，作为入场价
    pub price: f64,
    pub volatility: Option<f64>,
    pub quality: DataQuality,
}

/// # Summary
/// 由等级、评分与波动率生成交易信号。
///
/// # Invariants
/// - A/B → BUY，C → HOLD，D/F → SELL。
/// - 风险收益比不足时只放宽止盈，从不收紧止损。
/// - STALE 数据生成的信号置信度恒为 0。
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// # Summary
    /// 生成交易信号。
    ///
    /// # Logic
    /// 1. 按等级确定方向，并根据评分与一致性计算置信度。
    /// 2. 用波动率缩放的距离计算止损，止盈取配置倍数与最小风险收益比中较大者。
    /// 3. 价格不合法，或止损、止盈落到非正区间时退化为 HOLD。
    /// 4. 根据等级与置信度确定仓位档位，根据波动率确定持有周期。
    pub fn generate(&self, input: &SignalInput) -> Signal {
        let volatility = self.effective_volatility(input.volatility);
        let horizon = self.time_horizon(input.grade, volatility);

        let action = match input.grade {
            Grade::A | Grade::B => TradeAction::Buy,
            Grade::C => TradeAction::Hold,
            Grade::D | Grade::F => TradeAction::Sell,
        };
        if action == TradeAction::Hold {
            return Signal::hold(self.confidence(TradeAction::Hold, input), horizon);
        }

        let entry = input.price;
        if !entry.is_finite() || entry <= 0.0 {
            warn!(price = entry, "Entry price is not positive, degrading signal to HOLD");
            return Signal::hold(self.confidence(TradeAction::Hold, input), horizon);
        }

        let offset = entry * volatility * self.config.stop_multiplier;
        let reward = (offset * self.config.take_profit_multiplier).max(offset * self.config.min_risk_reward);

        let (stop_loss, take_profit) = match action {
            TradeAction::Buy => (entry - offset, entry + reward),
            _ => (entry + offset, entry - reward),
        };
        if stop_loss <= 0.0 || take_profit <= 0.0 {
            warn!(
                price = entry,
                stop_loss,
                take_profit,
                "Price level would be non-positive, degrading signal to HOLD"
            );
            return Signal::hold(self.confidence(TradeAction::Hold, input), horizon);
        }

        let confidence = self.confidence(action, input);
        Signal {
            action,
            confidence,
            entry_price: Some(entry),
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            risk_reward: Some(reward / offset),
            position_size: self.position_size(input.grade, confidence),
            time_horizon: horizon,
        }
    }

    fn effective_volatility(&self, hint: Option<f64>) -> f64 {
        match hint {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => self.config.default_volatility,
        }
    }

    fn confidence(&self, action: TradeAction, input: &SignalInput) -> f64 {
        if input.quality == DataQuality::Stale {
            return 0.0;
        }
        let conviction = match action {
            TradeAction::Buy => input.score,
            TradeAction::Sell => 1.0 - input.score,
            TradeAction::Hold => 0.5,
        };
        let agreement = (1.0 - 2.0 * input.dispersion).clamp(0.0, 1.0);
        let w = self.config.agreement_weight;
        let confidence = conviction * (1.0 - w + w * agreement);
        if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn position_size(&self, grade: Grade, confidence: f64) -> PositionSize {
        let extreme = matches!(grade, Grade::A | Grade::F);
        if extreme && confidence >= self.config.large_confidence {
            PositionSize::Large
        } else if extreme || confidence >= self.config.medium_confidence {
            PositionSize::Medium
        } else {
            PositionSize::Small
        }
    }

    fn time_horizon(&self, grade: Grade, volatility: f64) -> TimeHorizon {
        if volatility >= self.config.intraday_volatility {
            TimeHorizon::Intraday
        } else if matches!(grade, Grade::A | Grade::F) && volatility < self.config.position_volatility {
            TimeHorizon::Position
        } else {
            TimeHorizon::Swing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> SignalGenerator {
        SignalGenerator::new(SignalConfig::default())
    }

    fn input(grade: Grade, score: f64, price: f64) -> SignalInput {
        SignalInput {
            grade,
            score,
            dispersion: 0.0,
            price,
            volatility: Some(0.02),
            quality: DataQuality::Fresh,
        }
    }

    fn assert_targets_hold(signal: &Signal) {
        let entry = signal.entry_price.unwrap();
        let stop = signal.stop_loss.unwrap();
        let target = signal.take_profit.unwrap();
        match signal.action {
            TradeAction::Buy => {
                assert!(stop < entry && entry < target);
                assert!((target - entry) >= 2.0 * (entry - stop) - 1e-9);
            }
            TradeAction::Sell => {
                assert!(target < entry && entry < stop);
                assert!((entry - target) >= 2.0 * (stop - entry) - 1e-9);
            }
            TradeAction::Hold => panic!("HOLD must not carry targets"),
        }
    }

    #[test]
    fn test_worked_example_is_buy() {
        let signal = generator().generate(&input(Grade::B, 0.72, 100.0));
        assert_eq!(signal.action, TradeAction::Buy);
        assert_targets_hold(&signal);
        // offset = 100 * 0.02 * 1.5 = 3, reward = 7.5
        assert!((signal.stop_loss.unwrap() - 97.0).abs() < 1e-9);
        assert!((signal.take_profit.unwrap() - 107.5).abs() < 1e-9);
        assert!((signal.risk_reward.unwrap() - 2.5).abs() < 1e-9);
        assert!((signal.confidence - 0.72).abs() < 1e-9);
        assert_eq!(signal.position_size, PositionSize::Medium);
        assert_eq!(signal.time_horizon, TimeHorizon::Swing);
    }

    #[test]
    fn test_grade_to_action_mapping() {
        let g = generator();
        assert_eq!(g.generate(&input(Grade::A, 0.9, 50.0)).action, TradeAction::Buy);
        assert_eq!(g.generate(&input(Grade::C, 0.55, 50.0)).action, TradeAction::Hold);
        assert_eq!(g.generate(&input(Grade::D, 0.4, 50.0)).action, TradeAction::Sell);
        assert_eq!(g.generate(&input(Grade::F, 0.1, 50.0)).action, TradeAction::Sell);
    }

    #[test]
    fn test_hold_carries_no_targets() {
        let signal = generator().generate(&input(Grade::C, 0.55, 50.0));
        assert!(!signal.has_targets());
        assert_eq!(signal.risk_reward, None);
        assert_eq!(signal.position_size, PositionSize::None);
    }

    #[test]
    fn test_targets_hold_across_grades_and_volatility() {
        let g = generator();
        for (grade, score) in [(Grade::A, 0.95), (Grade::B, 0.7), (Grade::D, 0.4), (Grade::F, 0.05)] {
            for vol in [None, Some(0.001), Some(0.03), Some(0.2)] {
                for price in [0.5, 12.34, 980.0] {
                    let mut i = input(grade, score, price);
                    i.volatility = vol;
                    let signal = g.generate(&i);
                    if signal.action != TradeAction::Hold {
                        assert_targets_hold(&signal);
                    }
                    assert!((0.0..=1.0).contains(&signal.confidence));
                }
            }
        }
    }

    #[test]
    fn test_take_profit_widened_to_minimum_ratio() {
        let g = SignalGenerator::new(SignalConfig {
            take_profit_multiplier: 1.0,
            ..SignalConfig::default()
        });
        let signal = g.generate(&input(Grade::A, 0.9, 100.0));
        // stop stays at 1.5x volatility, target widened to 2x the risk
        assert!((signal.stop_loss.unwrap() - 97.0).abs() < 1e-9);
        assert!((signal.take_profit.unwrap() - 106.0).abs() < 1e-9);
        assert!((signal.risk_reward.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sell_with_non_positive_target_degrades_to_hold() {
        let mut i = input(Grade::F, 0.1, 10.0);
        // offset = 10 * 0.3 * 1.5 = 4.5, reward = 11.25 > entry
        i.volatility = Some(0.3);
        let signal = generator().generate(&i);
        assert_eq!(signal.action, TradeAction::Hold);
        assert!(!signal.has_targets());
    }

    #[test]
    fn test_buy_with_non_positive_stop_degrades_to_hold() {
        let mut i = input(Grade::A, 0.9, 100.0);
        // offset = 100 * 0.8 * 1.5 = 120 > entry
        i.volatility = Some(0.8);
        let signal = generator().generate(&i);
        assert_eq!(signal.action, TradeAction::Hold);
        assert!(!signal.has_targets());
        assert_eq!(signal.position_size, PositionSize::None);
    }

    #[test]
    fn test_invalid_price_degrades_to_hold() {
        let g = generator();
        assert_eq!(g.generate(&input(Grade::A, 0.9, 0.0)).action, TradeAction::Hold);
        assert_eq!(g.generate(&input(Grade::A, 0.9, f64::NAN)).action, TradeAction::Hold);
    }

    #[test]
    fn test_dispersion_lowers_confidence() {
        let g = generator();
        let agreeing = g.generate(&input(Grade::A, 0.85, 100.0));
        let mut split = input(Grade::A, 0.85, 100.0);
        split.dispersion = 0.25;
        let split = g.generate(&split);
        assert!(split.confidence < agreeing.confidence);
        // agreement = 0.5, factor = 0.75
        assert!((split.confidence - 0.85 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_stale_confidence_is_zero() {
        let mut i = input(Grade::A, 0.9, 100.0);
        i.quality = DataQuality::Stale;
        assert_eq!(generator().generate(&i).confidence, 0.0);
    }

    #[test]
    fn test_position_buckets() {
        let g = generator();
        assert_eq!(g.generate(&input(Grade::A, 0.95, 10.0)).position_size, PositionSize::Large);
        assert_eq!(g.generate(&input(Grade::F, 0.05, 10.0)).position_size, PositionSize::Large);
        assert_eq!(g.generate(&input(Grade::B, 0.66, 10.0)).position_size, PositionSize::Medium);

        let mut weak = input(Grade::D, 0.6, 10.0);
        weak.dispersion = 0.5;
        // conviction 0.4 * factor 0.5 = 0.2
        assert_eq!(g.generate(&weak).position_size, PositionSize::Small);
    }

    #[test]
    fn test_time_horizon() {
        let g = generator();
        let mut i = input(Grade::A, 0.9, 10.0);
        i.volatility = Some(0.06);
        assert_eq!(g.generate(&i).time_horizon, TimeHorizon::Intraday);
        i.volatility = Some(0.01);
        assert_eq!(g.generate(&i).time_horizon, TimeHorizon::Position);
        i.grade = Grade::B;
        i.score = 0.7;
        assert_eq!(g.generate(&i).time_horizon, TimeHorizon::Swing);
    }
}
