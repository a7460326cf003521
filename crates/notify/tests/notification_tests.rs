use chrono::{DateTime, TimeZone, Utc};
use kanshi_core::alert::entity::{Alert, AlertChange, AlertTransition, AlertType, Severity};
use kanshi_core::common::Symbol;
use kanshi_core::common::session::MarketSession;
use kanshi_core::monitor::entity::{
    CycleReport, FailureReason, Snapshot, SummaryRecord, SymbolOutcome, TradingOpportunity,
};
use kanshi_core::notify::port::NotificationSink;
use kanshi_core::score::entity::{DataQuality, Grade};
use kanshi_core::signal::entity::{PositionSize, Signal, TimeHorizon, TradeAction};
use kanshi_notify::{LogSink, render_digest};

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 3, 15, 0, 0).unwrap()
}

fn fresh_buy() -> Snapshot {
    let mut s = Snapshot::placeholder(Symbol::from("AAPL"), 3, at());
    s.price = Some(100.0);
    s.data_as_of = Some(at());
    s.overall_score = 0.72;
    s.grade = Grade::B;
    s.data_quality = DataQuality::Fresh;
    s.signal = Signal {
        action: TradeAction::Buy,
        confidence: 0.66,
        entry_price: Some(100.0),
        stop_loss: Some(97.0),
        take_profit: Some(107.5),
        risk_reward: Some(2.5),
        position_size: PositionSize::Medium,
        time_horizon: TimeHorizon::Swing,
    };
    s
}

fn volatility_alert(severity: Severity) -> Alert {
    Alert {
        id: "alert-1".to_string(),
        symbol: Symbol::from("TSLA"),
        alert_type: AlertType::HighVolatility,
        severity,
        magnitude: 0.061,
        raised_at: at(),
        last_seen_at: at(),
        cleared_at: None,
    }
}

fn sample_report(persisted: bool) -> CycleReport {
    let stale = Snapshot::placeholder(Symbol::from("SLOW"), 3, at());
    let escalated = volatility_alert(Severity::High);
    CycleReport {
        cycle_id: 3,
        started_at: at(),
        finished_at: at(),
        session: MarketSession::Open,
        outcomes: vec![
            SymbolOutcome {
                symbol: Symbol::from("AAPL"),
                data_quality: DataQuality::Fresh,
                failure: None,
            },
            SymbolOutcome {
                symbol: Symbol::from("SLOW"),
                data_quality: DataQuality::Stale,
                failure: Some(FailureReason::Timeout),
            },
        ],
        snapshots: vec![fresh_buy(), stale],
        alert_changes: vec![AlertChange {
            transition: AlertTransition::Escalated { from: Severity::Low },
            alert: escalated.clone(),
        }],
        active_alerts: vec![escalated],
        cleared_alerts: vec![],
        summary: SummaryRecord {
            cycle_id: 3,
            timestamp: at(),
            symbols_monitored: 2,
            trading_opportunities: vec![TradingOpportunity {
                symbol: Symbol::from("GOOG"),
                grade: Grade::A,
                confidence: 0.9,
                action: TradeAction::Buy,
                timestamp: at(),
            }],
            active_alerts: 1,
        },
        persisted,
    }
}

#[test]
fn test_digest_covers_cycle_header_and_counts() {
    let digest = render_digest(&sample_report(true));
    assert!(digest.starts_with("Cycle #3 completed 2026-06-03 15:00:00 UTC (market OPEN)"));
    assert!(digest.contains("Symbols: 2 monitored, 1 fresh, 1 stale"));
    assert!(digest.contains("Active alerts: 1"));
    assert!(digest.contains("Persistence: ok"));
}

#[test]
fn test_digest_lists_snapshots_with_targets_and_stale_reason() {
    let digest = render_digest(&sample_report(true));
    let aapl = digest.lines().find(|l| l.trim_start().starts_with("AAPL")).unwrap();
    assert!(aapl.contains("BUY"));
    assert!(aapl.contains("conf 0.66"));
    assert!(aapl.contains("entry 100.00 stop 97.00 target 107.50"));
    assert!(!aapl.contains("STALE"));

    let slow = digest.lines().find(|l| l.trim_start().starts_with("SLOW")).unwrap();
    assert!(slow.contains("HOLD"));
    assert!(slow.contains("[STALE: timed out]"));
    assert!(!slow.contains("entry"));
}

#[test]
fn test_digest_lists_opportunities_and_alert_changes() {
    let digest = render_digest(&sample_report(false));
    assert!(digest.contains("Opportunities:"));
    assert!(digest.lines().any(|l| l.contains("GOOG") && l.contains("conf 0.90")));
    assert!(digest.contains("ESCALATED TSLA HIGH_VOLATILITY LOW -> HIGH (0.061)"));
    assert!(digest.contains("Persistence: FAILED"));
}

#[test]
fn test_digest_omits_empty_sections() {
    let mut report = sample_report(true);
    report.alert_changes.clear();
    report.summary.trading_opportunities.clear();
    let digest = render_digest(&report);
    assert!(!digest.contains("Opportunities:"));
    assert!(!digest.contains("Alert changes:"));
}

#[tokio::test]
async fn test_log_sink_publishes_without_error() {
    let sink = LogSink::new();
    assert_eq!(sink.name(), "log");
    sink.publish(&sample_report(false)).await.unwrap();

    let named = LogSink::named("digest");
    assert_eq!(named.name(), "digest");
}
