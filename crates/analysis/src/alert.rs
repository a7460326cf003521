use chrono::{DateTime, Utc};
use kanshi_core::alert::entity::{Alert, AlertChange, AlertTransition, AlertType};
use kanshi_core::common::Symbol;
use kanshi_core::config::AlertConfig;
use kanshi_core::market::entity::AlertMetrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// # Summary
/// 单个标的一次告警评估的结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertEvaluation {
    // 评估后该标的的活跃告警，按类型排序
    pub active: Vec<Alert>,
    // 本次发生的状态迁移
    pub changes: Vec<AlertChange>,
}

impl AlertEvaluation {
    /// 本次被清除的告警
    pub fn cleared(&self) -> impl Iterator<Item = &Alert> {
        self.changes
            .iter()
            .filter(|c| c.transition == AlertTransition::Cleared)
            .map(|c| &c.alert)
    }
}

/// # Summary
/// 有状态的告警检测器，负责告警的触发、升级、去重与清除。
///
/// # Invariants
/// - 同一 (symbol, alert_type) 至多一个活跃告警。
/// - 告警周期内严重度只升不降。
/// - 清除为终态，条件再次成立时开启新周期 (新的 id 与 raised_at)。
/// - 量值缺失或非有限值时对应规则本周期不评估，已有告警原样保留。
pub struct AlertDetector {
    config: AlertConfig,
}

impl AlertDetector {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    /// # Summary
    /// 根据本周期量值与先前的活跃告警计算新的活跃告警集合。
    ///
    /// # Logic
    /// 对每个告警类型：
    /// 1. 量值缺失或为 NaN/无穷：保留先前的告警。
    /// 2. 条件成立且无先前告警：按当前严重度触发。
    /// 3. 条件成立且有先前告警：刷新 `last_seen_at` 与量值，严重度更高时升级。
    /// 4. 条件不成立且有先前告警：标记清除。
    ///
    /// # Arguments
    /// * `symbol` - 被评估的标的。
    /// * `metrics` - 本周期的告警量值。
    /// * `prior` - 先前的活跃告警，其他标的与已清除的告警会被忽略。
    /// * `now` - 评估时间。
    pub fn evaluate(
        &self,
        symbol: &Symbol,
        metrics: &AlertMetrics,
        prior: &[Alert],
        now: DateTime<Utc>,
    ) -> AlertEvaluation {
        let mut evaluation = AlertEvaluation::default();

        for alert_type in AlertType::ALL {
            let previous = prior
                .iter()
                .find(|a| &a.symbol == symbol && a.alert_type == alert_type && a.is_active());

            let Some(magnitude) = metrics.magnitude(alert_type).filter(|m| {
                let finite = m.is_finite();
                if !finite {
                    warn!(%symbol, %alert_type, magnitude = *m, "Metric is not finite, skipping rule");
                }
                finite
            }) else {
                if let Some(previous) = previous {
                    debug!(%symbol, %alert_type, "Metric missing, keeping alert unchanged");
                    evaluation.active.push(previous.clone());
                }
                continue;
            };

            let severity = self.config.ladder(alert_type).severity_of(magnitude);
            match (severity, previous) {
                (Some(severity), None) => {
                    let alert = Alert {
                        id: Uuid::new_v4().to_string(),
                        symbol: symbol.clone(),
                        alert_type,
                        severity,
                        magnitude,
                        raised_at: now,
                        last_seen_at: now,
                        cleared_at: None,
                    };
                    info!(%symbol, %alert_type, %severity, magnitude, "Alert raised");
                    evaluation.changes.push(AlertChange {
                        transition: AlertTransition::Raised,
                        alert: alert.clone(),
                    });
                    evaluation.active.push(alert);
                }
                (Some(severity), Some(previous)) => {
                    let mut alert = previous.clone();
                    alert.last_seen_at = now;
                    alert.magnitude = magnitude;
                    if severity > alert.severity {
                        let from = alert.severity;
                        alert.severity = severity;
                        info!(%symbol, %alert_type, %from, to = %severity, "Alert escalated");
                        evaluation.changes.push(AlertChange {
                            transition: AlertTransition::Escalated { from },
                            alert: alert.clone(),
                        });
                    }
                    evaluation.active.push(alert);
                }
                (None, Some(previous)) => {
                    let mut alert = previous.clone();
                    alert.magnitude = magnitude;
                    alert.cleared_at = Some(now);
                    info!(%symbol, %alert_type, "Alert cleared");
                    evaluation.changes.push(AlertChange {
                        transition: AlertTransition::Cleared,
                        alert,
                    });
                }
                (None, None) => {}
            }
        }

        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use kanshi_core::alert::entity::Severity;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn volatility(v: f64) -> AlertMetrics {
        AlertMetrics {
            volatility: Some(v),
            ..AlertMetrics::default()
        }
    }

    fn detector() -> AlertDetector {
        AlertDetector::new(AlertConfig::default())
    }

    #[test]
    fn test_raise_on_first_occurrence() {
        let symbol = Symbol::from("AAPL");
        let eval = detector().evaluate(&symbol, &volatility(0.06), &[], t0());
        assert_eq!(eval.active.len(), 1);
        let alert = &eval.active[0];
        assert_eq!(alert.alert_type, AlertType::HighVolatility);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.raised_at, t0());
        assert_eq!(eval.changes.len(), 1);
        assert_eq!(eval.changes[0].transition, AlertTransition::Raised);
    }

    #[test]
    fn test_below_low_threshold_is_noop() {
        let eval = detector().evaluate(&Symbol::from("AAPL"), &volatility(0.01), &[], t0());
        assert!(eval.active.is_empty());
        assert!(eval.changes.is_empty());
    }

    #[test]
    fn test_dedupe_over_unchanged_cycles() {
        let d = detector();
        let symbol = Symbol::from("MSFT");
        let mut active = d.evaluate(&symbol, &volatility(0.04), &[], t0()).active;
        let id = active[0].id.clone();

        for i in 1..=5 {
            let eval = d.evaluate(&symbol, &volatility(0.04), &active, t0() + Duration::minutes(5 * i));
            assert!(eval.changes.is_empty());
            assert_eq!(eval.active.len(), 1);
            assert_eq!(eval.active[0].id, id);
            assert_eq!(eval.active[0].raised_at, t0());
            assert_eq!(eval.active[0].last_seen_at, t0() + Duration::minutes(5 * i));
            active = eval.active;
        }
    }

    #[test]
    fn test_escalate_but_never_downgrade() {
        let d = detector();
        let symbol = Symbol::from("TSLA");
        let first = d.evaluate(&symbol, &volatility(0.035), &[], t0());
        assert_eq!(first.active[0].severity, Severity::Low);

        let second = d.evaluate(&symbol, &volatility(0.09), &first.active, t0() + Duration::minutes(5));
        assert_eq!(second.active[0].severity, Severity::High);
        assert_eq!(
            second.changes[0].transition,
            AlertTransition::Escalated { from: Severity::Low }
        );

        let third = d.evaluate(&symbol, &volatility(0.035), &second.active, t0() + Duration::minutes(10));
        assert_eq!(third.active[0].severity, Severity::High);
        assert!(third.changes.is_empty());
        assert_eq!(third.active[0].id, first.active[0].id);
    }

    #[test]
    fn test_clear_and_new_episode_on_recurrence() {
        let d = detector();
        let symbol = Symbol::from("NVDA");
        let raised = d.evaluate(&symbol, &volatility(0.05), &[], t0());

        let cleared = d.evaluate(&symbol, &volatility(0.01), &raised.active, t0() + Duration::minutes(5));
        assert!(cleared.active.is_empty());
        let gone: Vec<&Alert> = cleared.cleared().collect();
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].cleared_at, Some(t0() + Duration::minutes(5)));
        assert_eq!(gone[0].id, raised.active[0].id);

        let again = d.evaluate(&symbol, &volatility(0.05), &cleared.active, t0() + Duration::minutes(10));
        assert_eq!(again.active.len(), 1);
        assert_ne!(again.active[0].id, raised.active[0].id);
        assert_ne!(again.active[0].raised_at, raised.active[0].raised_at);
    }

    #[test]
    fn test_missing_metric_keeps_episode() {
        let d = detector();
        let symbol = Symbol::from("AMD");
        let raised = d.evaluate(&symbol, &volatility(0.05), &[], t0());
        let eval = d.evaluate(&symbol, &AlertMetrics::default(), &raised.active, t0() + Duration::minutes(5));
        assert_eq!(eval.active, raised.active);
        assert!(eval.changes.is_empty());
    }

    #[test]
    fn test_non_finite_metric_keeps_episode() {
        let d = detector();
        let symbol = Symbol::from("AMD");
        let raised = d.evaluate(&symbol, &volatility(0.06), &[], t0());
        for bad in [f64::NAN, f64::INFINITY] {
            let eval = d.evaluate(&symbol, &volatility(bad), &raised.active, t0() + Duration::minutes(5));
            assert_eq!(eval.active, raised.active);
            assert!(eval.changes.is_empty());
        }

        let none = d.evaluate(&Symbol::from("INTC"), &volatility(f64::NAN), &[], t0());
        assert!(none.active.is_empty());
        assert!(none.changes.is_empty());
    }

    #[test]
    fn test_types_are_independent() {
        let d = detector();
        let symbol = Symbol::from("META");
        let metrics = AlertMetrics {
            volatility: Some(0.13),
            news_impact: Some(0.65),
            breakout: Some(0.01),
            fundamental_shift: None,
            sector_rotation: Some(0.2),
        };
        let eval = d.evaluate(&symbol, &metrics, &[], t0());
        let kinds: Vec<(AlertType, Severity)> = eval.active.iter().map(|a| (a.alert_type, a.severity)).collect();
        assert_eq!(
            kinds,
            vec![
                (AlertType::HighVolatility, Severity::Critical),
                (AlertType::NewsCatalyst, Severity::Medium),
                (AlertType::SectorRotation, Severity::Critical),
            ]
        );
    }

    #[test]
    fn test_other_symbols_alerts_are_ignored() {
        let d = detector();
        let other = d.evaluate(&Symbol::from("IBM"), &volatility(0.05), &[], t0());
        let eval = d.evaluate(&Symbol::from("ORCL"), &volatility(0.0), &other.active, t0());
        assert!(eval.active.is_empty());
        assert!(eval.changes.is_empty());
    }
}
