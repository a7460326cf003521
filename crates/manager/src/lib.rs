//! 监控应用服务层：调度监控周期、隔离单标的失败、分发周期报告。
//!
//! 编译期只依赖 `kanshi-core` 中的端口定义，数据源、存储与通知端都由调用方注入。

pub mod dispatch;
pub mod error;
pub mod monitor;
mod worker;

pub use error::MonitorError;
pub use monitor::{MonitorHandle, MonitorScheduler, SchedulerParams};
