//! 纯同步的评估组件：评分聚合、分级、信号生成与告警检测。
//!
//! 这里不做任何 I/O，所有阈值来自 `kanshi_core::config`，
//! 由 `kanshi-manager` 在每个标的的评估流水线中依次调用。

pub mod aggregate;
pub mod alert;
pub mod grade;
pub mod signal;

pub use aggregate::{Aggregate, ScoreAggregator};
pub use alert::{AlertDetector, AlertEvaluation};
pub use grade::classify;
pub use signal::{SignalGenerator, SignalInput};
