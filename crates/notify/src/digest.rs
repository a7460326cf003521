use kanshi_core::alert::entity::AlertTransition;
use kanshi_core::monitor::entity::CycleReport;
use kanshi_core::score::entity::DataQuality;
use kanshi_core::signal::entity::Signal;
use std::fmt::Write;
use tracing::warn;

/// # Summary
/// Renders a plain-text digest of a completed cycle.
///
/// # Logic
/// 1. Header with cycle id, completion time and market session.
/// 2. Trading opportunities, then one line per snapshot.
/// 3. Alert transitions of this cycle and the persistence status.
///
/// # Arguments
/// * `report` - The completed cycle.
///
/// # Returns
/// * The digest text, one item per line.
pub fn render_digest(report: &CycleReport) -> String {
    let mut out = String::new();
    if let Err(e) = render_into(&mut out, report) {
        warn!("Digest for cycle #{} is incomplete: {}", report.cycle_id, e);
    }
    out
}

fn render_into(out: &mut String, report: &CycleReport) -> std::fmt::Result {
    writeln!(
        out,
        "Cycle #{} completed {} (market {})",
        report.cycle_id,
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.session
    )?;
    writeln!(
        out,
        "Symbols: {} monitored, {} fresh, {} stale",
        report.summary.symbols_monitored,
        report.fresh_count(),
        report.stale_count()
    )?;

    if !report.summary.trading_opportunities.is_empty() {
        writeln!(out, "Opportunities:")?;
        for o in &report.summary.trading_opportunities {
            writeln!(
                out,
                "  {:<8} {} {:<4} conf {:.2}",
                o.symbol.as_str(),
                o.grade,
                o.action.to_string(),
                o.confidence
            )?;
        }
    }

    writeln!(out, "Snapshots:")?;
    for snapshot in &report.snapshots {
        write!(
            out,
            "  {:<8} {} {:.3} {:<4} conf {:.2}",
            snapshot.symbol.as_str(),
            snapshot.grade,
            snapshot.overall_score,
            snapshot.signal.action.to_string(),
            snapshot.signal.confidence
        )?;
        if let Some(targets) = targets(&snapshot.signal) {
            write!(out, " {}", targets)?;
        }
        if snapshot.data_quality == DataQuality::Stale {
            let reason = report
                .outcomes
                .iter()
                .find(|o| o.symbol == snapshot.symbol)
                .and_then(|o| o.failure.as_ref())
                .map(|f| f.to_string())
                .unwrap_or_else(|| "stale".to_string());
            write!(out, " [STALE: {}]", reason)?;
        }
        writeln!(out)?;
    }

    if !report.alert_changes.is_empty() {
        writeln!(out, "Alert changes:")?;
        for change in &report.alert_changes {
            let alert = &change.alert;
            match change.transition {
                AlertTransition::Raised => writeln!(
                    out,
                    "  RAISED    {} {} {} ({:.3})",
                    alert.symbol, alert.alert_type, alert.severity, alert.magnitude
                )?,
                AlertTransition::Escalated { from } => writeln!(
                    out,
                    "  ESCALATED {} {} {} -> {} ({:.3})",
                    alert.symbol, alert.alert_type, from, alert.severity, alert.magnitude
                )?,
                AlertTransition::Cleared => {
                    writeln!(out, "  CLEARED   {} {}", alert.symbol, alert.alert_type)?
                }
            }
        }
    }

    writeln!(out, "Active alerts: {}", report.active_alerts.len())?;
    if report.persisted {
        writeln!(out, "Persistence: ok")?;
    } else {
        writeln!(out, "Persistence: FAILED, retrying next cycle")?;
    }
    Ok(())
}

fn targets(signal: &Signal) -> Option<String> {
    match (signal.entry_price, signal.stop_loss, signal.take_profit) {
        (Some(entry), Some(stop), Some(target)) => Some(format!(
            "entry {:.2} stop {:.2} target {:.2}",
            entry, stop, target
        )),
        _ => None,
    }
}
