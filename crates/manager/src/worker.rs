use kanshi_analysis::{AlertDetector, AlertEvaluation, ScoreAggregator, SignalGenerator, SignalInput, classify};
use kanshi_core::alert::entity::Alert;
use kanshi_core::common::Symbol;
use kanshi_core::common::time::TimeProvider;
use kanshi_core::config::MonitorConfig;
use kanshi_core::market::entity::{AlertMetrics, Dimension, IndicatorReading, SubScore, SubScores};
use kanshi_core::market::port::IndicatorSource;
use kanshi_core::monitor::entity::{FailureReason, Snapshot, SymbolOutcome};
use kanshi_core::score::entity::DataQuality;
use kanshi_core::score::error::AnalysisError;
use std::time::Duration;
use tracing::{debug, warn};

/// 单个标的的评估任务输入
pub(crate) struct SymbolJob {
    pub symbol: Symbol,
    pub cycle_id: u64,
    // 该标的上一次的快照
    pub prior: Option<Snapshot>,
    // 该标的当前的活跃告警
    pub prior_alerts: Vec<Alert>,
}

/// 单个标的的评估结果，由调度器在提交步骤中合并
pub(crate) struct SymbolResult {
    pub snapshot: Snapshot,
    pub outcome: SymbolOutcome,
    pub alerts: AlertEvaluation,
}

/// # Summary
/// 单标的评估流水线：fetch → aggregate → classify → signal → alert。
///
/// # Invariants
/// - 只读共享，多个工作协程可并发调用 `evaluate`。
/// - 任何失败都转换为 STALE 结果，不向调度器传播错误。
pub(crate) struct Pipeline {
    aggregator: ScoreAggregator,
    generator: SignalGenerator,
    detector: AlertDetector,
    symbol_timeout: Duration,
}

impl Pipeline {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            aggregator: ScoreAggregator::new(&config.scoring),
            generator: SignalGenerator::new(config.signal.clone()),
            detector: AlertDetector::new(config.alerts.clone()),
            symbol_timeout: config.scheduler.symbol_timeout(),
        }
    }

    /// # Summary
    /// 评估单个标的。
    ///
    /// # Logic
    /// 1. 在超时限制内获取读数，失败或超时沿用旧快照并保留原有告警。
    /// 2. 根据新读数评估告警，即使评分失败也照常评估。
    /// 3. 聚合、分级并生成信号；评分失败时沿用旧快照。
    pub async fn evaluate(&self, source: &dyn IndicatorSource, clock: &dyn TimeProvider, job: SymbolJob) -> SymbolResult {
        let fetched = tokio::time::timeout(self.symbol_timeout, source.fetch(&job.symbol)).await;
        let reading = match fetched {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => {
                warn!("Fetch failed for {}: {}", job.symbol, e);
                return stale_result(job, FailureReason::Provider(e.to_string()), clock.now());
            }
            Err(_) => {
                warn!("Fetch timed out for {} after {:?}", job.symbol, self.symbol_timeout);
                return stale_result(job, FailureReason::Timeout, clock.now());
            }
        };

        if !reading.price.is_finite() || reading.price <= 0.0 {
            warn!("Discarding reading for {} with price {}", job.symbol, reading.price);
            let reason = FailureReason::Provider(format!("invalid price {}", reading.price));
            return stale_result(job, reason, clock.now());
        }

        let now = clock.now();
        let metrics = derive_metrics(&reading, job.prior.as_ref());
        let alerts = self.detector.evaluate(&job.symbol, &metrics, &job.prior_alerts, now);

        let aggregate = match self.aggregator.aggregate(&reading.sub_scores) {
            Ok(aggregate) => aggregate,
            Err(e) => return self.scoring_failed(job, e, alerts, now),
        };
        let grade = match classify(aggregate.score) {
            Ok(grade) => grade,
            Err(e) => return self.scoring_failed(job, e, alerts, now),
        };

        let signal = self.generator.generate(&SignalInput {
            grade,
            score: aggregate.score,
            dispersion: aggregate.dispersion,
            price: reading.price,
            volatility: reading.volatility(),
            quality: DataQuality::Fresh,
        });
        debug!(
            "{} scored {:.4} ({}) -> {} @ {:.2}",
            job.symbol, aggregate.score, grade, signal.action, signal.confidence
        );

        let snapshot = Snapshot {
            symbol: job.symbol.clone(),
            cycle_id: job.cycle_id,
            timestamp: now,
            data_as_of: Some(now),
            price: Some(reading.price),
            sub_scores: finite_sub_scores(reading.sub_scores),
            overall_score: aggregate.score,
            grade,
            signal,
            data_quality: DataQuality::Fresh,
        };

        SymbolResult {
            outcome: SymbolOutcome {
                symbol: job.symbol,
                data_quality: DataQuality::Fresh,
                failure: None,
            },
            snapshot,
            alerts,
        }
    }

    fn scoring_failed(
        &self,
        job: SymbolJob,
        error: AnalysisError,
        alerts: AlertEvaluation,
        now: chrono::DateTime<chrono::Utc>,
    ) -> SymbolResult {
        let reason = match error {
            AnalysisError::NoData => {
                warn!("No usable sub-score for {}, keeping previous snapshot", job.symbol);
                FailureReason::NoData
            }
            AnalysisError::InvalidScore(score) => {
                warn!("Invalid score {} for {}, keeping previous snapshot", score, job.symbol);
                FailureReason::InvalidScore(score.to_string())
            }
        };
        let mut result = stale_result(job, reason, now);
        result.alerts = alerts;
        result
    }
}

/// # Summary
/// 生成失败标的的 STALE 结果。
///
/// # Logic
/// 1. 有旧快照则沿用到本周期，否则生成占位快照。
/// 2. 活跃告警原样保留。
pub(crate) fn stale_result(job: SymbolJob, reason: FailureReason, now: chrono::DateTime<chrono::Utc>) -> SymbolResult {
    let snapshot = match &job.prior {
        Some(prior) => prior.carry_forward(job.cycle_id, now),
        None => Snapshot::placeholder(job.symbol.clone(), job.cycle_id, now),
    };
    SymbolResult {
        snapshot,
        outcome: SymbolOutcome {
            symbol: job.symbol,
            data_quality: DataQuality::Stale,
            failure: Some(reason),
        },
        alerts: AlertEvaluation {
            active: job.prior_alerts,
            changes: Vec::new(),
        },
    }
}

/// 数据源未提供基本面变化量时，用相邻两次快照的基本面子评分推导
fn derive_metrics(reading: &IndicatorReading, prior: Option<&Snapshot>) -> AlertMetrics {
    let mut metrics = reading.metrics.clone();
    if metrics.fundamental_shift.is_none() {
        let current = fundamental(&reading.sub_scores);
        let previous = prior.and_then(|p| fundamental(&p.sub_scores));
        if let (Some(current), Some(previous)) = (current, previous) {
            metrics.fundamental_shift = Some((current - previous).abs());
        }
    }
    metrics
}

/// NaN 与无穷在 JSON 中没有表示，写入快照前改为不可用
fn finite_sub_scores(sub_scores: SubScores) -> SubScores {
    sub_scores
        .into_iter()
        .map(|(dimension, score)| match score {
            SubScore::Available(v) if !v.is_finite() => (dimension, SubScore::unavailable("non-finite value")),
            other => (dimension, other),
        })
        .collect()
}

fn fundamental(sub_scores: &SubScores) -> Option<f64> {
    sub_scores
        .get(&Dimension::fundamental())
        .and_then(|s| s.value())
        .filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kanshi_core::common::time::FakeClockProvider;
    use kanshi_core::signal::entity::TradeAction;
    use kanshi_core::testing::{ScriptedSource, Step, reading, with_metrics};

    fn clock() -> FakeClockProvider {
        FakeClockProvider::new(Utc.with_ymd_and_hms(2026, 4, 1, 15, 0, 0).unwrap())
    }

    fn job(symbol: &str, prior: Option<Snapshot>) -> SymbolJob {
        SymbolJob {
            symbol: Symbol::from(symbol),
            cycle_id: 2,
            prior,
            prior_alerts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fresh_evaluation() {
        let pipeline = Pipeline::new(&MonitorConfig::default());
        let source = ScriptedSource::new().script("AAPL", vec![Step::Reading(reading(100.0, 0.8, 0.7, 0.6))]);
        let result = pipeline.evaluate(&source, &clock(), job("AAPL", None)).await;

        assert_eq!(result.outcome.data_quality, DataQuality::Fresh);
        assert!((result.snapshot.overall_score - 0.72).abs() < 1e-9);
        assert_eq!(result.snapshot.signal.action, TradeAction::Buy);
        assert_eq!(result.snapshot.cycle_id, 2);
    }

    #[tokio::test]
    async fn test_no_data_keeps_prior_and_still_evaluates_alerts() {
        let pipeline = Pipeline::new(&MonitorConfig::default());
        let clock = clock();
        let first_source = ScriptedSource::new().script("AAPL", vec![Step::Reading(reading(100.0, 0.8, 0.7, 0.6))]);
        let prior = pipeline.evaluate(&first_source, &clock, job("AAPL", None)).await.snapshot;

        let mut empty = reading(101.0, 0.0, 0.0, 0.0);
        empty.sub_scores = SubScores::from([(Dimension::technical(), SubScore::unavailable("down"))]);
        let empty = with_metrics(
            empty,
            AlertMetrics {
                volatility: Some(0.06),
                ..AlertMetrics::default()
            },
        );
        let source = ScriptedSource::new().script("AAPL", vec![Step::Reading(empty)]);
        let result = pipeline.evaluate(&source, &clock, job("AAPL", Some(prior.clone()))).await;

        assert_eq!(result.outcome.failure, Some(FailureReason::NoData));
        assert_eq!(result.snapshot.data_quality, DataQuality::Stale);
        assert_eq!(result.snapshot.overall_score, prior.overall_score);
        assert_eq!(result.snapshot.signal.confidence, 0.0);
        assert_eq!(result.alerts.active.len(), 1);
    }

    #[tokio::test]
    async fn test_non_finite_sub_score_is_stored_as_unavailable() {
        let pipeline = Pipeline::new(&MonitorConfig::default());
        let source = ScriptedSource::new().script("AAPL", vec![Step::Reading(reading(100.0, 0.8, 0.7, f64::NAN))]);
        let result = pipeline.evaluate(&source, &clock(), job("AAPL", None)).await;

        assert_eq!(result.outcome.data_quality, DataQuality::Fresh);
        // sentiment skipped: (0.4 * 0.8 + 0.4 * 0.7) / 0.8
        assert!((result.snapshot.overall_score - 0.75).abs() < 1e-9);
        assert_eq!(
            result.snapshot.sub_scores.get(&Dimension::sentiment()),
            Some(&SubScore::unavailable("non-finite value"))
        );
        assert_eq!(
            result.snapshot.sub_scores.get(&Dimension::technical()),
            Some(&SubScore::Available(0.7))
        );
    }

    #[tokio::test]
    async fn test_fundamental_shift_derived_from_prior() {
        let pipeline = Pipeline::new(&MonitorConfig::default());
        let clock = clock();
        let source = ScriptedSource::new().script("IBM", vec![Step::Reading(reading(50.0, 0.8, 0.5, 0.5))]);
        let prior = pipeline.evaluate(&source, &clock, job("IBM", None)).await.snapshot;

        source.set("IBM", vec![Step::Reading(reading(50.0, 0.55, 0.5, 0.5))]);
        let result = pipeline.evaluate(&source, &clock, job("IBM", Some(prior))).await;
        // |0.55 - 0.8| = 0.25 -> MEDIUM
        assert_eq!(result.alerts.active.len(), 1);
        assert_eq!(
            result.alerts.active[0].severity,
            kanshi_core::alert::entity::Severity::Medium
        );
    }

    #[tokio::test]
    async fn test_invalid_price_is_provider_failure() {
        let pipeline = Pipeline::new(&MonitorConfig::default());
        let source = ScriptedSource::new().script("BAD", vec![Step::Reading(reading(-1.0, 0.8, 0.7, 0.6))]);
        let result = pipeline.evaluate(&source, &clock(), job("BAD", None)).await;
        assert!(matches!(result.outcome.failure, Some(FailureReason::Provider(_))));
        assert_eq!(result.snapshot.grade, kanshi_core::score::entity::Grade::F);
        assert_eq!(result.snapshot.data_as_of, None);
    }
}
