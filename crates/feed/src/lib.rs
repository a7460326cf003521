//! `IndicatorSource` 的实现。

pub mod file;

pub use file::JsonFileSource;
