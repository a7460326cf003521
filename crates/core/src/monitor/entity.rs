use crate::alert::entity::{Alert, AlertChange};
use crate::common::Symbol;
use crate::common::session::MarketSession;
use crate::market::entity::SubScores;
use crate::score::entity::{DataQuality, Grade};
use crate::signal::entity::{Signal, TimeHorizon, TradeAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// # Summary
/// 单个标的在单个周期内的不可变评估结果。
///
/// # Invariants
/// - 创建后不再修改，新周期的快照整体替换旧快照。
/// - 同一标的的快照替换严格按 `cycle_id` 递增。
/// - `data_quality == Stale` 时信号置信度为 0。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: Symbol,
    pub cycle_id: u64,
    // 快照生成时间
    pub timestamp: DateTime<Utc>,
    // 底层数据最后一次成功获取的时间，从未成功时为空
    pub data_as_of: Option<DateTime<Utc>>,
    // 生成快照时的最新价格，占位快照为空
    pub price: Option<f64>,
    pub sub_scores: SubScores,
    pub overall_score: f64,
    pub grade: Grade,
    pub signal: Signal,
    pub data_quality: DataQuality,
}

impl Snapshot {
    /// # Summary
    /// 以当前快照为底，生成沿用到新周期的 STALE 快照。
    ///
    /// # Logic
    /// 1. 复制评分、等级与价格目标。
    /// 2. 更新周期号与生成时间，保留 `data_as_of`。
    /// 3. 标记为 STALE 并将信号置信度清零。
    pub fn carry_forward(&self, cycle_id: u64, timestamp: DateTime<Utc>) -> Snapshot {
        let mut signal = self.signal.clone();
        signal.confidence = 0.0;
        Snapshot {
            symbol: self.symbol.clone(),
            cycle_id,
            timestamp,
            data_as_of: self.data_as_of,
            price: self.price,
            sub_scores: self.sub_scores.clone(),
            overall_score: self.overall_score,
            grade: self.grade,
            signal,
            data_quality: DataQuality::Stale,
        }
    }

    /// # Summary
    /// 为从未成功评估过的标的生成占位快照。
    ///
    /// # Invariants
    /// - 总分 0、等级 F、置信度为 0 的 HOLD 信号，质量为 STALE。
    pub fn placeholder(symbol: Symbol, cycle_id: u64, timestamp: DateTime<Utc>) -> Snapshot {
        Snapshot {
            symbol,
            cycle_id,
            timestamp,
            data_as_of: None,
            price: None,
            sub_scores: SubScores::new(),
            overall_score: 0.0,
            grade: Grade::F,
            signal: Signal::hold(0.0, TimeHorizon::Swing),
            data_quality: DataQuality::Stale,
        }
    }
}

/// # Summary
/// 调度器运行模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Idle,
    Once,
    Continuous,
    Stopping,
}

/// # Summary
/// 调度器状态机所处阶段。
///
/// # Invariants
/// - 迁移路径：Idle → Running → (Once: Done) | (Continuous: Sleeping → Running → …) → Stopped。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    Idle,
    Running,
    Sleeping,
    Done,
    Stopped,
}

/// # Summary
/// 进程内监控状态聚合根。
///
/// # Invariants
/// - 只由所属调度器在周期的串行提交步骤中整体替换，读者永远看到某个完整周期的结果。
/// - `active_alerts` 中每个 (symbol, alert_type) 至多一条，且按该键排序。
/// - `alert_history` 只保存已清除的告警周期，长度受配置上限约束。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub snapshots: BTreeMap<Symbol, Snapshot>,
    pub active_alerts: Vec<Alert>,
    pub alert_history: Vec<Alert>,
    pub cycle: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub mode: RunMode,
    pub phase: CyclePhase,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            snapshots: BTreeMap::new(),
            active_alerts: Vec::new(),
            alert_history: Vec::new(),
            cycle: 0,
            last_run: None,
            mode: RunMode::Idle,
            phase: CyclePhase::Idle,
        }
    }

    /// # Summary
    /// 使用持久层最近一次提交的状态恢复监控状态。
    ///
    /// # Logic
    /// 1. 恢复周期计数与上次运行时间。
    /// 2. 恢复每个标的的最新快照。
    /// 3. 仅恢复仍处于活跃状态的告警，保证重启后去重仍然有效。
    pub fn restore(persisted: PersistedState) -> Self {
        let mut active_alerts: Vec<Alert> = persisted
            .active_alerts
            .into_iter()
            .filter(Alert::is_active)
            .collect();
        active_alerts.sort_by_key(Alert::key);

        Self {
            snapshots: persisted
                .snapshots
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect(),
            active_alerts,
            alert_history: Vec::new(),
            cycle: persisted.cycle,
            last_run: persisted.last_run,
            mode: RunMode::Idle,
            phase: CyclePhase::Idle,
        }
    }

    /// 获取指定标的当前的活跃告警
    pub fn active_alerts_for(&self, symbol: &Symbol) -> Vec<Alert> {
        self.active_alerts
            .iter()
            .filter(|a| &a.symbol == symbol)
            .cloned()
            .collect()
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

/// # Summary
/// 单个标的在本周期未能产出新鲜快照的原因。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    // 数据源返回错误
    Provider(String),
    // 超过单标的超时时间
    Timeout,
    // 所有子评分均不可用
    NoData,
    // 聚合结果越界，属于编程错误
    InvalidScore(String),
    // 工作协程异常退出
    Task(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Provider(e) => write!(f, "provider error: {}", e),
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::NoData => write!(f, "no sub-score available"),
            FailureReason::InvalidScore(e) => write!(f, "invalid score: {}", e),
            FailureReason::Task(e) => write!(f, "worker failed: {}", e),
        }
    }
}

/// # Summary
/// 单个标的在本周期的结果摘要。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolOutcome {
    pub symbol: Symbol,
    pub data_quality: DataQuality,
    pub failure: Option<FailureReason>,
}

/// # Summary
/// 交易机会条目，对应持久化摘要中的 `tradingOpportunities`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingOpportunity {
    pub symbol: Symbol,
    pub grade: Grade,
    pub confidence: f64,
    pub action: TradeAction,
    pub timestamp: DateTime<Utc>,
}

/// # Summary
/// 每周期写入持久层的摘要记录，供报告与通知层读取。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub cycle_id: u64,
    pub timestamp: DateTime<Utc>,
    pub symbols_monitored: usize,
    pub trading_opportunities: Vec<TradingOpportunity>,
    pub active_alerts: usize,
}

/// # Summary
/// 周期完成事件，同时也是提交给 SummaryStore 的单元。
///
/// # Invariants
/// - `snapshots` 与 `outcomes` 覆盖本周期配置的全部标的，各恰好一条。
/// - `cleared_alerts` 包含本周期清除的告警以及此前提交失败而尚未落盘的清除记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub session: MarketSession,
    pub snapshots: Vec<Snapshot>,
    pub outcomes: Vec<SymbolOutcome>,
    pub alert_changes: Vec<AlertChange>,
    pub active_alerts: Vec<Alert>,
    pub cleared_alerts: Vec<Alert>,
    pub summary: SummaryRecord,
    // 是否已成功写入持久层
    pub persisted: bool,
}

impl CycleReport {
    pub fn fresh_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.data_quality == DataQuality::Fresh)
            .count()
    }

    pub fn stale_count(&self) -> usize {
        self.outcomes.len() - self.fresh_count()
    }
}

/// # Summary
/// SummaryStore 最近一次提交的状态，用于重启时恢复 MonitorState。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub cycle: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub snapshots: Vec<Snapshot>,
    pub active_alerts: Vec<Alert>,
}
