//! 测试替身，仅在启用 `test-utils` feature 时编译。

use crate::alert::entity::Alert;
use crate::common::Symbol;
use crate::market::entity::{AlertMetrics, Dimension, IndicatorReading, SubScore, SubScores};
use crate::market::error::ProviderError;
use crate::market::port::IndicatorSource;
use crate::monitor::entity::{CycleReport, PersistedState, SummaryRecord};
use crate::notify::error::NotifyError;
use crate::notify::port::NotificationSink;
use crate::store::error::StoreError;
use crate::store::port::{CommitAck, SummaryStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// 构造三个标准维度都可用的读数
pub fn reading(price: f64, fundamental: f64, technical: f64, sentiment: f64) -> IndicatorReading {
    let mut sub_scores = SubScores::new();
    sub_scores.insert(Dimension::fundamental(), SubScore::Available(fundamental));
    sub_scores.insert(Dimension::technical(), SubScore::Available(technical));
    sub_scores.insert(Dimension::sentiment(), SubScore::Available(sentiment));
    IndicatorReading {
        price,
        sub_scores,
        metrics: AlertMetrics::default(),
    }
}

/// 在读数上附加告警量值
pub fn with_metrics(mut reading: IndicatorReading, metrics: AlertMetrics) -> IndicatorReading {
    reading.metrics = metrics;
    reading
}

/// 脚本化数据源的单步行为
#[derive(Debug, Clone)]
pub enum Step {
    Reading(IndicatorReading),
    Fail(ProviderError),
    // 永不返回，用于触发超时
    Hang,
}

/// # Summary
/// 按脚本逐次返回结果的数据源。
///
/// # Invariants
/// - 每个标的的最后一步会被重复使用。
/// - 未配置脚本的标的返回 `ProviderError::NotFound`。
#[derive(Default)]
pub struct ScriptedSource {
    scripts: DashMap<Symbol, Vec<Step>>,
    fetches: DashMap<Symbol, usize>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, symbol: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(Symbol::from(symbol), steps);
        self
    }

    /// 替换某个标的后续的脚本
    pub fn set(&self, symbol: &str, steps: Vec<Step>) {
        self.scripts.insert(Symbol::from(symbol), steps);
    }

    pub fn fetch_count(&self, symbol: &str) -> usize {
        self.fetches.get(symbol).map(|c| *c).unwrap_or(0)
    }

    fn next_step(&self, symbol: &Symbol) -> Option<Step> {
        let mut steps = self.scripts.get_mut(symbol)?;
        if steps.len() > 1 {
            Some(steps.remove(0))
        } else {
            steps.first().cloned()
        }
    }
}

#[async_trait]
impl IndicatorSource for ScriptedSource {
    async fn fetch(&self, symbol: &Symbol) -> Result<IndicatorReading, ProviderError> {
        *self.fetches.entry(symbol.clone()).or_insert(0) += 1;
        match self.next_step(symbol) {
            Some(Step::Reading(reading)) => Ok(reading),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                Err(ProviderError::Unknown("unreachable".to_string()))
            }
            None => Err(ProviderError::NotFound(symbol.to_string())),
        }
    }
}

/// # Summary
/// 记录收到的周期报告的通知端，可配置为失败或延迟。
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<CycleReport>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn reports(&self) -> Vec<CycleReport> {
        self.reports.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, report: &CycleReport) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(NotifyError::Platform("recording sink configured to fail".to_string()));
        }
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

/// # Summary
/// 包装真实存储，让接下来的若干次提交失败。
pub struct FailingStore {
    inner: Arc<dyn SummaryStore>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn SummaryStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    /// 让接下来的 `n` 次提交失败
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryStore for FailingStore {
    async fn commit(&self, report: &CycleReport) -> Result<CommitAck, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }
        self.inner.commit(report).await
    }

    async fn read(&self) -> Result<Option<PersistedState>, StoreError> {
        self.inner.read().await
    }

    async fn latest_summary(&self) -> Result<Option<SummaryRecord>, StoreError> {
        self.inner.latest_summary().await
    }

    async fn alert_records(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.inner.alert_records(limit).await
    }
}
