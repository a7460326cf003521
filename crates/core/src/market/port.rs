use crate::common::Symbol;
use crate::market::entity::IndicatorReading;
use crate::market::error::ProviderError;
use async_trait::async_trait;

/// # Summary
/// 指标数据源接口 (外部协作者)。
/// 提供每个标的的最新价格、归一化子评分以及告警原始量值。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync`，调度器会在多个工作协程中并发调用。
/// - 单个子评分无法计算时应返回 `SubScore::Unavailable`，而不是整体失败。
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    /// # Summary
    /// 获取单个标的的最新读数。
    ///
    /// # Logic
    /// 1. 拉取或读取该标的的原始数据。
    /// 2. 计算并归一化各维度子评分。
    /// 3. 附带波动率等告警量值返回。
    ///
    /// # Arguments
    /// * `symbol` - 目标证券代码。
    ///
    /// # Returns
    /// * 成功返回 `IndicatorReading`。
    /// * 数据暂不可用返回 `ProviderError`。
    async fn fetch(&self, symbol: &Symbol) -> Result<IndicatorReading, ProviderError>;
}
