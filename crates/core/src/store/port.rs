use super::error::StoreError;
use crate::alert::entity::Alert;
use crate::monitor::entity::{CycleReport, PersistedState, SummaryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 提交成功的回执。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitAck {
    pub cycle_id: u64,
    pub committed_at: DateTime<Utc>,
}

/// # Summary
/// 监控摘要存储接口，持久化每个标的的最新快照与告警集合。
///
/// # Invariants
/// - `commit` 对读者必须是原子的：不会观察到同一周期只写入一部分标的的状态。
/// - `read` 返回最近一次成功提交的状态，用于进程重启后恢复去重与沿用判断。
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// # Summary
    /// 原子提交一个周期的结果。
    ///
    /// # Logic
    /// 1. 按标的替换最新快照。
    /// 2. 写入活跃告警与本次携带的已清除告警。
    /// 3. 追加摘要记录并更新周期计数。
    ///
    /// # Arguments
    /// * `report` - 已完成周期的报告。
    ///
    /// # Returns
    /// 成功返回 `CommitAck`，失败返回 `StoreError`。
    async fn commit(&self, report: &CycleReport) -> Result<CommitAck, StoreError>;

    /// # Summary
    /// 读取最近一次提交的状态。
    ///
    /// # Returns
    /// 从未提交过返回 `None`。
    async fn read(&self) -> Result<Option<PersistedState>, StoreError>;

    /// # Summary
    /// 读取最近一条摘要记录。
    async fn latest_summary(&self) -> Result<Option<SummaryRecord>, StoreError>;

    /// # Summary
    /// 按时间倒序列出告警记录 (含已清除的历史)。
    ///
    /// # Arguments
    /// * `limit` - 返回条数上限。
    async fn alert_records(&self, limit: usize) -> Result<Vec<Alert>, StoreError>;
}
