use thiserror::Error;

/// # Summary
/// 评分与分级过程中的错误。
///
/// # Invariants
/// - `NoData` 在运行期出现，触发快照沿用 (STALE)。
/// - `InvalidScore` 是编程错误，评分永远不会被静默截断。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// 所有参与加权的维度均不可用
    #[error("No sub-score available for aggregation")]
    NoData,
    /// 评分超出 [0,1] 或不是有限数
    #[error("Invalid score: {0}")]
    InvalidScore(f64),
}
