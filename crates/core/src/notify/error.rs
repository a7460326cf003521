use thiserror::Error;

/// # Summary
/// 通知服务错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 只会被记录日志后丢弃，永远不影响调度器状态或周期结果。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 网络连接或传输错误
    #[error("Network error: {0}")]
    Network(String),

    /// 配置错误 (如缺少 Token)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 推送平台返回的错误
    #[error("Platform error: {0}")]
    Platform(String),

    /// 消息渲染失败
    #[error("Render error: {0}")]
    Render(String),
}
