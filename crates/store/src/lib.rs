//! `SummaryStore` 的实现：SQLite 持久化与进程内内存存储。

pub mod memory;
pub mod summary;

pub use memory::MemorySummaryStore;
pub use summary::SqliteSummaryStore;
