use async_trait::async_trait;
use chrono::Utc;
use kanshi_core::alert::entity::Alert;
use kanshi_core::common::Symbol;
use kanshi_core::monitor::entity::{CycleReport, PersistedState, Snapshot, SummaryRecord};
use kanshi_core::store::error::StoreError;
use kanshi_core::store::port::{CommitAck, SummaryStore};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    cycle: Option<u64>,
    last_run: Option<chrono::DateTime<Utc>>,
    snapshots: BTreeMap<Symbol, Snapshot>,
    // 按告警 id 索引，含已清除的历史
    alerts: BTreeMap<String, Alert>,
    summaries: VecDeque<SummaryRecord>,
}

/// # Summary
/// 进程内的 SummaryStore，用于测试与关闭持久化的运行。
///
/// # Invariants
/// * 与 SQLite 实现保持相同的语义：提交原子可见、快照按周期号单调替换、历史按保留数量裁剪。
pub struct MemorySummaryStore {
    inner: RwLock<Inner>,
    retention: usize,
}

impl MemorySummaryStore {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            retention,
        }
    }
}

impl Default for MemorySummaryStore {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn commit(&self, report: &CycleReport) -> Result<CommitAck, StoreError> {
        let mut inner = self.inner.write().await;

        for snapshot in &report.snapshots {
            let newer = inner
                .snapshots
                .get(&snapshot.symbol)
                .is_none_or(|existing| snapshot.cycle_id > existing.cycle_id);
            if newer {
                inner.snapshots.insert(snapshot.symbol.clone(), snapshot.clone());
            }
        }

        for alert in report.active_alerts.iter().chain(report.cleared_alerts.iter()) {
            inner.alerts.insert(alert.id.clone(), alert.clone());
        }

        let mut cleared: Vec<(chrono::DateTime<Utc>, String)> = inner
            .alerts
            .values()
            .filter_map(|a| a.cleared_at.map(|at| (at, a.id.clone())))
            .collect();
        if cleared.len() > self.retention {
            cleared.sort();
            let excess = cleared.len() - self.retention;
            for (_, id) in cleared.into_iter().take(excess) {
                inner.alerts.remove(&id);
            }
        }

        inner.summaries.push_back(report.summary.clone());
        while inner.summaries.len() > self.retention {
            inner.summaries.pop_front();
        }

        inner.cycle = Some(report.cycle_id);
        inner.last_run = Some(report.finished_at);

        Ok(CommitAck {
            cycle_id: report.cycle_id,
            committed_at: Utc::now(),
        })
    }

    async fn read(&self) -> Result<Option<PersistedState>, StoreError> {
        let inner = self.inner.read().await;
        let Some(cycle) = inner.cycle else {
            return Ok(None);
        };
        Ok(Some(PersistedState {
            cycle,
            last_run: inner.last_run,
            snapshots: inner.snapshots.values().cloned().collect(),
            active_alerts: inner.alerts.values().filter(|a| a.is_active()).cloned().collect(),
        }))
    }

    async fn latest_summary(&self) -> Result<Option<SummaryRecord>, StoreError> {
        Ok(self.inner.read().await.summaries.back().cloned())
    }

    async fn alert_records(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<Alert> = inner.alerts.values().cloned().collect();
        records.sort_by(|a, b| b.raised_at.cmp(&a.raised_at).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        Ok(records)
    }
}
