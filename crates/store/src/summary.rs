use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kanshi_core::alert::entity::{Alert, AlertType, Severity};
use kanshi_core::common::Symbol;
use kanshi_core::monitor::entity::{CycleReport, PersistedState, Snapshot, SummaryRecord, TradingOpportunity};
use kanshi_core::store::error::StoreError;
use kanshi_core::store::port::{CommitAck, SummaryStore};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use tracing::{debug, info};

/// 默认数据库文件名
const DEFAULT_DB_FILE: &str = "kanshi.db";

type AlertRow = (
    String,
    String,
    String,
    String,
    f64,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

type SummaryRow = (i64, DateTime<Utc>, i64, i64, String);

/// # Summary
/// SummaryStore 的 SQLite 实现。
///
/// # Invariants
/// * 每次 `commit` 在单个事务内完成，读者看不到写了一半的周期。
/// * `snapshots` 表中每个标的一行，只会被周期号更大的快照替换。
/// * 已清除的告警只保留最近 `retention` 条，摘要记录同理。
pub struct SqliteSummaryStore {
    pool: SqlitePool,
    retention: i64,
}

impl SqliteSummaryStore {
    /// 打开 (或创建) 数据目录下的 `kanshi.db` 并初始化表结构。
    ///
    /// # Logic
    /// 1. 确保数据目录存在。
    /// 2. 以 WAL 模式连接 SQLite，开启 `create_if_missing`。
    /// 3. 执行 DDL 初始化表结构。
    ///
    /// # Arguments
    /// * `data_dir` - 数据目录。
    /// * `retention` - 保留的已清除告警与摘要记录条数。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或初始化错误。
    pub async fn open(data_dir: &Path, retention: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::InitError(e.to_string()))?;
        let db_path = data_dir.join(DEFAULT_DB_FILE);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                symbol TEXT PRIMARY KEY,
                cycle_id INTEGER NOT NULL,
                timestamp DATETIME NOT NULL,
                data_quality TEXT NOT NULL,
                grade TEXT NOT NULL,
                overall_score REAL NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                magnitude REAL NOT NULL,
                raised_at DATETIME NOT NULL,
                last_seen_at DATETIME NOT NULL,
                cleared_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_active ON alerts (cleared_at);

            CREATE TABLE IF NOT EXISTS summaries (
                cycle_id INTEGER PRIMARY KEY,
                timestamp DATETIME NOT NULL,
                symbols_monitored INTEGER NOT NULL,
                active_alerts INTEGER NOT NULL,
                opportunities TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS monitor_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                cycle INTEGER NOT NULL,
                last_run DATETIME
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!("Summary store opened at {}", db_path.display());
        Ok(Self {
            pool,
            retention: to_i64(retention)?,
        })
    }
}

fn db(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn to_i64<T>(value: T) -> Result<i64, StoreError>
where
    T: TryInto<i64> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| StoreError::Database(format!("value {} does not fit into INTEGER", value)))
}

fn from_i64<T: TryFrom<i64>>(value: i64) -> Result<T, StoreError> {
    T::try_from(value).map_err(|_| StoreError::Corrupted(format!("unexpected negative counter {}", value)))
}

fn row_to_alert(row: AlertRow) -> Result<Alert, StoreError> {
    let (id, symbol, alert_type, severity, magnitude, raised_at, last_seen_at, cleared_at) = row;
    Ok(Alert {
        id,
        symbol: Symbol::from(symbol),
        alert_type: alert_type.parse::<AlertType>().map_err(StoreError::Corrupted)?,
        severity: severity.parse::<Severity>().map_err(StoreError::Corrupted)?,
        magnitude,
        raised_at,
        last_seen_at,
        cleared_at,
    })
}

fn row_to_summary(row: SummaryRow) -> Result<SummaryRecord, StoreError> {
    let (cycle_id, timestamp, symbols_monitored, active_alerts, opportunities) = row;
    let trading_opportunities: Vec<TradingOpportunity> =
        serde_json::from_str(&opportunities).map_err(|e| StoreError::Corrupted(e.to_string()))?;
    Ok(SummaryRecord {
        cycle_id: from_i64(cycle_id)?,
        timestamp,
        symbols_monitored: from_i64(symbols_monitored)?,
        trading_opportunities,
        active_alerts: from_i64(active_alerts)?,
    })
}

#[async_trait]
impl SummaryStore for SqliteSummaryStore {
    async fn commit(&self, report: &CycleReport) -> Result<CommitAck, StoreError> {
        let cycle_id = to_i64(report.cycle_id)?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        for snapshot in &report.snapshots {
            let payload = serde_json::to_string(snapshot).map_err(|e| StoreError::Unknown(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO snapshots (symbol, cycle_id, timestamp, data_quality, grade, overall_score, payload)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(symbol) DO UPDATE SET
                    cycle_id = excluded.cycle_id,
                    timestamp = excluded.timestamp,
                    data_quality = excluded.data_quality,
                    grade = excluded.grade,
                    overall_score = excluded.overall_score,
                    payload = excluded.payload
                WHERE excluded.cycle_id > snapshots.cycle_id
                "#,
            )
            .bind(snapshot.symbol.as_str())
            .bind(to_i64(snapshot.cycle_id)?)
            .bind(snapshot.timestamp)
            .bind(snapshot.data_quality.to_string())
            .bind(snapshot.grade.to_string())
            .bind(snapshot.overall_score)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        for alert in report.active_alerts.iter().chain(report.cleared_alerts.iter()) {
            sqlx::query(
                r#"
                INSERT INTO alerts (id, symbol, alert_type, severity, magnitude, raised_at, last_seen_at, cleared_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    severity = excluded.severity,
                    magnitude = excluded.magnitude,
                    last_seen_at = excluded.last_seen_at,
                    cleared_at = excluded.cleared_at
                "#,
            )
            .bind(&alert.id)
            .bind(alert.symbol.as_str())
            .bind(alert.alert_type.to_string())
            .bind(alert.severity.to_string())
            .bind(alert.magnitude)
            .bind(alert.raised_at)
            .bind(alert.last_seen_at)
            .bind(alert.cleared_at)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        let opportunities = serde_json::to_string(&report.summary.trading_opportunities)
            .map_err(|e| StoreError::Unknown(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO summaries (cycle_id, timestamp, symbols_monitored, active_alerts, opportunities)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(cycle_id)
        .bind(report.summary.timestamp)
        .bind(to_i64(report.summary.symbols_monitored)?)
        .bind(to_i64(report.summary.active_alerts)?)
        .bind(opportunities)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO monitor_meta (id, cycle, last_run) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET cycle = excluded.cycle, last_run = excluded.last_run
            "#,
        )
        .bind(cycle_id)
        .bind(report.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        // 清理超出保留数量的历史
        sqlx::query(
            r#"
            DELETE FROM alerts WHERE cleared_at IS NOT NULL AND id NOT IN (
                SELECT id FROM alerts WHERE cleared_at IS NOT NULL ORDER BY cleared_at DESC LIMIT ?
            )
            "#,
        )
        .bind(self.retention)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query(
            r#"
            DELETE FROM summaries WHERE cycle_id NOT IN (
                SELECT cycle_id FROM summaries ORDER BY cycle_id DESC LIMIT ?
            )
            "#,
        )
        .bind(self.retention)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;

        debug!(
            "Committed cycle {} ({} snapshot(s), {} active, {} cleared)",
            report.cycle_id,
            report.snapshots.len(),
            report.active_alerts.len(),
            report.cleared_alerts.len()
        );
        Ok(CommitAck {
            cycle_id: report.cycle_id,
            committed_at: Utc::now(),
        })
    }

    async fn read(&self) -> Result<Option<PersistedState>, StoreError> {
        let meta = sqlx::query_as::<_, (i64, Option<DateTime<Utc>>)>(
            "SELECT cycle, last_run FROM monitor_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        let Some((cycle, last_run)) = meta else {
            return Ok(None);
        };

        let snapshots = sqlx::query_as::<_, (String,)>("SELECT payload FROM snapshots ORDER BY symbol")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?
            .into_iter()
            .map(|(payload,)| {
                serde_json::from_str::<Snapshot>(&payload).map_err(|e| StoreError::Corrupted(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let active_alerts = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, symbol, alert_type, severity, magnitude, raised_at, last_seen_at, cleared_at
            FROM alerts WHERE cleared_at IS NULL ORDER BY symbol, alert_type
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_alert)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PersistedState {
            cycle: from_i64(cycle)?,
            last_run,
            snapshots,
            active_alerts,
        }))
    }

    async fn latest_summary(&self) -> Result<Option<SummaryRecord>, StoreError> {
        sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT cycle_id, timestamp, symbols_monitored, active_alerts, opportunities
            FROM summaries ORDER BY cycle_id DESC LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(row_to_summary)
        .transpose()
    }

    async fn alert_records(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, symbol, alert_type, severity, magnitude, raised_at, last_seen_at, cleared_at
            FROM alerts ORDER BY raised_at DESC, id LIMIT ?
            "#,
        )
        .bind(to_i64(limit)?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_alert)
        .collect()
    }
}
