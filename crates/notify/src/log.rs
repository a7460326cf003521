use crate::digest::render_digest;
use async_trait::async_trait;
use kanshi_core::alert::entity::AlertTransition;
use kanshi_core::monitor::entity::CycleReport;
use kanshi_core::notify::error::NotifyError;
use kanshi_core::notify::port::NotificationSink;
use tracing::{info, warn};

/// # Summary
/// Publishes each cycle report as a digest through the `tracing` pipeline.
///
/// # Invariants
/// - Never fails; the digest goes wherever the subscriber routes `info` events.
/// - Cycles that raised or escalated alerts, or failed to persist, are also logged at `warn`.
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new() -> Self {
        Self::named("log")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    /// # Summary
    /// Renders the digest and emits it as a single `info` event.
    ///
    /// # Arguments
    /// * `report` - The completed cycle.
    ///
    /// # Returns
    /// * Always `Ok(())`.
    async fn publish(&self, report: &CycleReport) -> Result<(), NotifyError> {
        let digest = render_digest(report);
        info!(target: "kanshi::digest", cycle = report.cycle_id, "\n{}", digest);

        let raised = report
            .alert_changes
            .iter()
            .filter(|c| !matches!(c.transition, AlertTransition::Cleared))
            .count();
        if raised > 0 {
            warn!("Cycle #{} raised or escalated {} alert(s)", report.cycle_id, raised);
        }
        if !report.persisted {
            warn!("Cycle #{} results were not persisted", report.cycle_id);
        }
        Ok(())
    }
}
