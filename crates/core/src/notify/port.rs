use crate::monitor::entity::CycleReport;
use crate::notify::error::NotifyError;
use async_trait::async_trait;

/// # Summary
/// 周期完成事件的外部消费者接口 (聊天推送、报告生成等)。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync` 以支持后台分发协程调用。
/// - 尽力而为：失败只会被记录，不会阻塞或影响监控周期。
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// 用于日志的接收端名称
    fn name(&self) -> &str;

    /// # Summary
    /// 发布一次周期报告。
    ///
    /// # Logic
    /// 1. 根据目标平台要求格式化报告。
    /// 2. 通过底层传输协议发送。
    ///
    /// # Arguments
    /// * `report` - 已完成周期的报告。
    ///
    /// # Returns
    /// * 成功返回 `Ok(())`。
    /// * 失败返回 `Err(NotifyError)`。
    async fn publish(&self, report: &CycleReport) -> Result<(), NotifyError>;
}
