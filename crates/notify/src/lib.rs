//! Notification sinks for cycle reports.

pub mod digest;
pub mod log;

pub use digest::render_digest;
pub use log::LogSink;
