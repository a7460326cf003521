//! Kanshi 监控引擎的领域核心。
//!
//! 仅包含实体、端口 (Trait) 与错误定义，不依赖任何具体基础设施。
//! 适配器 crate (store / feed / notify) 实现这里的端口，
//! `kanshi-manager` 只面向这些抽象编排监控周期。

pub mod alert;
pub mod common;
pub mod config;
pub mod market;
pub mod monitor;
pub mod notify;
pub mod score;
pub mod signal;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod testing;
