use thiserror::Error;

/// # Summary
/// 指标数据源错误枚举，代表数据暂时不可用。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 对监控周期而言永远不是致命错误：该标的本周期标记为 STALE，下周期重试。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    // 网络层或上游服务错误
    #[error("Network error: {0}")]
    Network(String),
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的标的没有数据
    #[error("Data not found: {0}")]
    NotFound(String),
    // 读数内容不合法 (如价格非正)
    #[error("Invalid reading: {0}")]
    InvalidReading(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
