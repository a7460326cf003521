use crate::dispatch::NotificationDispatcher;
use crate::error::MonitorError;
use crate::worker::{Pipeline, SymbolJob, SymbolResult, stale_result};
use kanshi_core::alert::entity::{Alert, AlertChange, AlertTransition};
use kanshi_core::common::Symbol;
use kanshi_core::common::session::MarketSession;
use kanshi_core::common::time::TimeProvider;
use kanshi_core::config::{ConfigError, MonitorConfig};
use kanshi_core::market::port::IndicatorSource;
use kanshi_core::monitor::entity::{
    CyclePhase, CycleReport, FailureReason, MonitorState, RunMode, Snapshot, SummaryRecord,
    TradingOpportunity,
};
use kanshi_core::notify::port::NotificationSink;
use kanshi_core::score::entity::{DataQuality, Grade};
use kanshi_core::store::port::SummaryStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// 周期报告广播通道容量，落后的订阅者会丢失最旧的报告
const REPORT_CHANNEL_CAPACITY: usize = 32;

/// # Summary
/// 构造调度器所需的外部依赖。
pub struct SchedulerParams {
    pub config: MonitorConfig,
    pub source: Arc<dyn IndicatorSource>,
    pub store: Arc<dyn SummaryStore>,
    pub sinks: Vec<Arc<dyn NotificationSink>>,
    pub clock: Arc<dyn TimeProvider>,
}

/// 周期锁保护的跨周期上下文
struct CycleContext {
    // 提交失败后尚未落盘的已清除告警
    unpersisted_cleared: Vec<Alert>,
}

/// # Summary
/// 监控调度器，系统的应用服务层门面。
/// 编译期仅依赖 `kanshi-core` 中的端口，具体实现通过 `SchedulerParams` 注入。
///
/// # Invariants
/// - 独占一个 `MonitorState`，只在周期的提交步骤中整体替换。
/// - `run_once` 与持续模式共用同一把周期锁，任意时刻至多一个周期在修改状态。
/// - 同一时刻至多一个持续运行循环。
pub struct MonitorScheduler {
    config: MonitorConfig,
    source: Arc<dyn IndicatorSource>,
    store: Arc<dyn SummaryStore>,
    clock: Arc<dyn TimeProvider>,
    pipeline: Arc<Pipeline>,
    state: watch::Sender<Arc<MonitorState>>,
    reports: broadcast::Sender<Arc<CycleReport>>,
    cycle_lock: Mutex<CycleContext>,
    continuous: AtomicBool,
    dispatcher: Option<NotificationDispatcher>,
}

impl MonitorScheduler {
    /// # Summary
    /// 创建调度器。
    ///
    /// # Logic
    /// 1. 校验配置，不合法直接失败。
    /// 2. 从 SummaryStore 读取最近一次提交的状态作为初始 MonitorState。
    /// 3. 存在通知端时启动后台分发协程。
    ///
    /// # Returns
    /// * `Ok(Arc<Self>)` - 可共享的调度器实例。
    /// * `Err(MonitorError)` - 配置不合法或无法读取持久化状态。
    pub async fn new(params: SchedulerParams) -> Result<Arc<Self>, MonitorError> {
        params.config.validate()?;

        let initial = match params.store.read().await? {
            Some(persisted) => {
                info!(
                    "Restored monitor state at cycle {} with {} snapshot(s) and {} active alert(s)",
                    persisted.cycle,
                    persisted.snapshots.len(),
                    persisted.active_alerts.len()
                );
                MonitorState::restore(persisted)
            }
            None => MonitorState::new(),
        };

        let dispatcher = if params.sinks.is_empty() {
            None
        } else {
            Some(NotificationDispatcher::spawn(params.sinks, &params.config.notify))
        };
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            pipeline: Arc::new(Pipeline::new(&params.config)),
            config: params.config,
            source: params.source,
            store: params.store,
            clock: params.clock,
            state: watch::Sender::new(Arc::new(initial)),
            reports,
            cycle_lock: Mutex::new(CycleContext {
                unpersisted_cleared: Vec::new(),
            }),
            continuous: AtomicBool::new(false),
            dispatcher,
        }))
    }

    /// 当前状态的只读视图，总是某个完整周期之后的结果
    pub fn current_state(&self) -> Arc<MonitorState> {
        self.state.borrow().clone()
    }

    /// 订阅状态变化
    pub fn watch_state(&self) -> watch::Receiver<Arc<MonitorState>> {
        self.state.subscribe()
    }

    /// 订阅周期完成事件
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CycleReport>> {
        self.reports.subscribe()
    }

    /// # Summary
    /// 执行一个完整周期。
    ///
    /// # Arguments
    /// * `symbols` - 本周期评估的标的，重复项只评估一次。
    ///
    /// # Returns
    /// * `Ok(CycleReport)` - 周期报告，单标的失败体现在 `outcomes` 中。
    /// * `Err(MonitorError::NoSymbols)` - 标的列表为空。
    pub async fn run_once(&self, symbols: &[Symbol]) -> Result<CycleReport, MonitorError> {
        if symbols.is_empty() {
            return Err(MonitorError::NoSymbols);
        }
        let report = self.run_cycle(symbols, RunMode::Once).await;
        Ok(report.as_ref().clone())
    }

    /// # Summary
    /// 启动持续监控循环。
    ///
    /// # Logic
    /// 1. 确认没有其他持续循环在运行。
    /// 2. 后台协程依次执行周期与可中断的等待。
    /// 3. 停止请求只在周期之间生效，正在执行的周期总会完成。
    ///
    /// # Arguments
    /// * `symbols` - 每个周期评估的标的。
    /// * `interval` - 两个周期之间的等待时间。
    ///
    /// # Returns
    /// * `Ok(MonitorHandle)` - 用于停止与等待循环结束的句柄。
    /// * `Err(MonitorError::AlreadyRunning)` - 已存在持续循环。
    pub fn start_continuous(
        self: &Arc<Self>,
        symbols: Vec<Symbol>,
        interval: Duration,
    ) -> Result<MonitorHandle, MonitorError> {
        if symbols.is_empty() {
            return Err(MonitorError::NoSymbols);
        }
        if interval.is_zero() {
            return Err(MonitorError::Config(ConfigError::Invalid {
                field: "interval".to_string(),
                reason: "must be positive".to_string(),
            }));
        }
        if self
            .continuous
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MonitorError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let loop_token = token.clone();
        info!("Starting continuous monitoring of {} symbol(s) every {:?}", symbols.len(), interval);

        let task = tokio::spawn(async move {
            scheduler.continuous_loop(symbols, interval, loop_token).await;
        });

        Ok(MonitorHandle {
            scheduler: Arc::clone(self),
            token,
            task,
        })
    }

    /// # Summary
    /// 关闭通知队列并等待已入队报告发布完成。
    pub async fn shutdown(&self, grace: Duration) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown(grace).await;
        }
    }

    async fn continuous_loop(&self, symbols: Vec<Symbol>, interval: Duration, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                break;
            }
            let report = self.run_cycle(&symbols, RunMode::Continuous).await;
            debug!("Continuous cycle {} finished", report.cycle_id);

            if token.is_cancelled() {
                break;
            }
            self.set_phase(CyclePhase::Sleeping);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.mode = RunMode::Idle;
            state.phase = CyclePhase::Stopped;
        });
        self.continuous.store(false, Ordering::SeqCst);
        info!("Continuous monitoring stopped");
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.state.send_modify(|state| Arc::make_mut(state).phase = phase);
    }

    fn mark_stopping(&self) {
        self.state.send_modify(|state| Arc::make_mut(state).mode = RunMode::Stopping);
    }

    /// # Summary
    /// 单个周期的完整流程。
    ///
    /// # Logic
    /// 1. 获取周期锁，分配周期号并进入 RUNNING。
    /// 2. 在有界并发下为每个标的执行评估流水线。
    /// 3. 串行合并结果，生成报告并提交持久层 (带重试)。
    /// 4. 整体替换 MonitorState，广播报告并放入通知队列。
    async fn run_cycle(&self, symbols: &[Symbol], mode: RunMode) -> Arc<CycleReport> {
        let mut ctx = self.cycle_lock.lock().await;

        let symbols: Vec<Symbol> = symbols.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let prior = self.current_state();
        let cycle_id = prior.cycle + 1;
        let started_at = self.clock.now();
        let session = MarketSession::at(started_at);

        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.mode = match (state.mode, mode) {
                // 持续循环期间的单次周期不改变运行模式
                (RunMode::Stopping, _) | (RunMode::Continuous, RunMode::Once) => state.mode,
                (_, requested) => requested,
            };
            state.phase = CyclePhase::Running;
        });
        info!("Cycle {} started for {} symbol(s), market {}", cycle_id, symbols.len(), session);

        let results = self.evaluate_all(&symbols, &prior, cycle_id).await;

        // 串行提交步骤
        let finished_at = self.clock.now();
        let mut snapshots = prior.snapshots.clone();
        let mut active: Vec<Alert> = prior
            .active_alerts
            .iter()
            .filter(|a| !results.contains_key(&a.symbol))
            .cloned()
            .collect();
        let mut history = prior.alert_history.clone();
        let mut changes: Vec<AlertChange> = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        let mut cycle_snapshots = Vec::with_capacity(results.len());

        for (symbol, result) in results {
            snapshots.insert(symbol, result.snapshot.clone());
            cycle_snapshots.push(result.snapshot);
            outcomes.push(result.outcome);
            active.extend(result.alerts.active);
            changes.extend(result.alerts.changes);
        }
        active.sort_by_key(Alert::key);

        let cleared: Vec<Alert> = changes
            .iter()
            .filter(|c| c.transition == AlertTransition::Cleared)
            .map(|c| c.alert.clone())
            .collect();
        history.extend(cleared.iter().cloned());
        let limit = self.config.alerts.history_limit;
        if history.len() > limit {
            history = history.split_off(history.len() - limit);
        }
        ctx.unpersisted_cleared.extend(cleared);

        let summary = SummaryRecord {
            cycle_id,
            timestamp: finished_at,
            symbols_monitored: symbols.len(),
            trading_opportunities: self.opportunities(&cycle_snapshots),
            active_alerts: active.len(),
        };

        let mut report = CycleReport {
            cycle_id,
            started_at,
            finished_at,
            session,
            snapshots: cycle_snapshots,
            outcomes,
            alert_changes: changes,
            active_alerts: active.clone(),
            cleared_alerts: ctx.unpersisted_cleared.clone(),
            summary,
            persisted: false,
        };

        report.persisted = self.commit_with_retry(&report).await;
        if report.persisted {
            ctx.unpersisted_cleared.clear();
        }

        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.snapshots = snapshots;
            state.active_alerts = active;
            state.alert_history = history;
            state.cycle = cycle_id;
            state.last_run = Some(finished_at);
            state.phase = match state.mode {
                RunMode::Once | RunMode::Idle => CyclePhase::Done,
                RunMode::Continuous | RunMode::Stopping => CyclePhase::Running,
            };
        });

        info!(
            "Cycle {} completed: {} fresh, {} stale, {} alert change(s), {} active alert(s), persisted={}",
            cycle_id,
            report.fresh_count(),
            report.stale_count(),
            report.alert_changes.len(),
            report.active_alerts.len(),
            report.persisted
        );

        let report = Arc::new(report);
        if self.reports.send(Arc::clone(&report)).is_err() {
            debug!("No subscriber for cycle {}", cycle_id);
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.enqueue(Arc::clone(&report));
        }
        report
    }

    /// # Summary
    /// 在有界并发下评估全部标的。
    ///
    /// # Logic
    /// 1. 每个标的一个任务，任务内先获取信号量许可再执行流水线。
    /// 2. 任务异常退出时，该标的按 STALE 处理。
    ///
    /// # Returns
    /// 按标的排序的结果，每个标的恰好一条。
    async fn evaluate_all(
        &self,
        symbols: &[Symbol],
        prior: &MonitorState,
        cycle_id: u64,
    ) -> BTreeMap<Symbol, SymbolResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.scheduler.max_concurrency));
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            let job = self.job_for(symbol, prior, cycle_id);
            let semaphore = Arc::clone(&semaphore);
            let pipeline = Arc::clone(&self.pipeline);
            let source = Arc::clone(&self.source);
            let clock = Arc::clone(&self.clock);

            tasks.spawn(async move {
                let symbol = job.symbol.clone();
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => pipeline.evaluate(source.as_ref(), clock.as_ref(), job).await,
                    Err(e) => stale_result(job, FailureReason::Task(e.to_string()), clock.now()),
                };
                (symbol, result)
            });
        }

        let mut results = BTreeMap::new();
        let mut task_errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, result)) => {
                    results.insert(symbol, result);
                }
                Err(e) => {
                    error!("Symbol worker failed in cycle {}: {}", cycle_id, e);
                    task_errors.push(e.to_string());
                }
            }
        }

        // 异常退出的任务无法带回标的，按缺失项补齐
        let detail = task_errors.join("; ");
        for symbol in symbols {
            if !results.contains_key(symbol) {
                let job = self.job_for(symbol, prior, cycle_id);
                let result = stale_result(job, FailureReason::Task(detail.clone()), self.clock.now());
                results.insert(symbol.clone(), result);
            }
        }
        results
    }

    fn job_for(&self, symbol: &Symbol, prior: &MonitorState, cycle_id: u64) -> SymbolJob {
        SymbolJob {
            symbol: symbol.clone(),
            cycle_id,
            prior: prior.snapshots.get(symbol).cloned(),
            prior_alerts: prior.active_alerts_for(symbol),
        }
    }

    fn opportunities(&self, snapshots: &[Snapshot]) -> Vec<TradingOpportunity> {
        snapshots
            .iter()
            .filter(|s| s.data_quality == DataQuality::Fresh)
            .filter(|s| matches!(s.grade, Grade::A | Grade::B))
            .filter(|s| s.signal.confidence > self.config.signal.opportunity_min_confidence)
            .map(|s| TradingOpportunity {
                symbol: s.symbol.clone(),
                grade: s.grade,
                confidence: s.signal.confidence,
                action: s.signal.action,
                timestamp: s.timestamp,
            })
            .collect()
    }

    /// # Summary
    /// 提交周期报告，失败时按配置重试。
    ///
    /// # Returns
    /// 是否最终提交成功。失败不会中断周期，内存状态保持权威。
    async fn commit_with_retry(&self, report: &CycleReport) -> bool {
        let attempts = self.config.store.commit_retries.saturating_add(1);
        for attempt in 1..=attempts {
            match self.store.commit(report).await {
                Ok(ack) => {
                    debug!("Cycle {} committed at {}", ack.cycle_id, ack.committed_at);
                    return true;
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Commit of cycle {} failed (attempt {}/{}): {}",
                        report.cycle_id, attempt, attempts, e
                    );
                    tokio::time::sleep(self.config.store.commit_backoff()).await;
                }
                Err(e) => {
                    error!(
                        "Commit of cycle {} failed after {} attempt(s), keeping state in memory: {}",
                        report.cycle_id, attempts, e
                    );
                }
            }
        }
        false
    }
}

/// # Summary
/// 持续监控循环的控制句柄。
pub struct MonitorHandle {
    scheduler: Arc<MonitorScheduler>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// # Summary
    /// 请求停止。正在执行的周期会完成，之后不再开始新周期。
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("Stop requested for continuous monitoring");
            self.scheduler.mark_stopping();
            self.token.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }

    /// # Summary
    /// 等待循环进入 STOPPED。
    pub async fn join(self) -> Result<(), MonitorError> {
        self.task.await.map_err(|e| MonitorError::Task(e.to_string()))
    }
}
