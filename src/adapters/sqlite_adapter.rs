//! SQLite catalog, snapshot and alert storage adapter.
//!
//! Indicator values live in the `indicators` table as one REAL column per
//! field; any column outside the key set is read back as a snapshot field.

use crate::adapters::alert_rows::{
    AlertRow, INSERT_ALERT_COLUMNS, format_timestamp, is_indicator_column, parse_timestamp,
};
use crate::domain::alert::Alert;
use crate::domain::catalog::{CriterionRecord, RangeRecord};
use crate::domain::error::AlertgenError;
use crate::domain::snapshot::Snapshot;
use crate::ports::alert_sink::AlertSink;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::snapshot_port::SnapshotPort;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use rusqlite::types::ValueRef;
use std::collections::HashMap;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tickers (
    ticker TEXT PRIMARY KEY,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS criteria (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    criterion_type TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '',
    max_base_points REAL,
    direction TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    timeframes TEXT,
    bias TEXT
);
CREATE TABLE IF NOT EXISTS criterion_ranges (
    id INTEGER PRIMARY KEY,
    criterion_id TEXT NOT NULL REFERENCES criteria(id),
    position INTEGER NOT NULL DEFAULT 0,
    operator TEXT,
    lower REAL,
    upper REAL,
    include_lower INTEGER,
    include_upper INTEGER,
    percentage REAL,
    impact TEXT,
    name TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_ranges_criterion ON criterion_ranges(criterion_id, position);
CREATE TABLE IF NOT EXISTS indicators (
    ticker TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    is_closed INTEGER,
    PRIMARY KEY (ticker, timeframe, timestamp)
);
CREATE INDEX IF NOT EXISTS idx_indicators_ticker_ts ON indicators(ticker, timestamp);
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    criterion_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    detail_1 TEXT NOT NULL DEFAULT '',
    detail_2 TEXT NOT NULL DEFAULT '',
    detail_3 TEXT NOT NULL DEFAULT '',
    result TEXT NOT NULL,
    range_id INTEGER NOT NULL,
    points_long REAL NOT NULL,
    points_short REAL NOT NULL,
    points_neutral REAL NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    day INTEGER NOT NULL,
    is_closed INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_natural_key
    ON alerts(criterion_id, ticker, timeframe, timestamp, range_id);
";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: r2d2::Error) -> AlertgenError {
    AlertgenError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> AlertgenError {
    AlertgenError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AlertgenError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| AlertgenError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        Self::open(&db_path, pool_size)
    }

    pub fn open(path: &str, pool_size: u32) -> Result<Self, AlertgenError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        tracing::debug!(path, pool_size, "sqlite pool opened");
        Ok(Self { pool })
    }

    /// Every pooled in-memory connection is a separate database, so the pool
    /// holds exactly one.
    pub fn in_memory() -> Result<Self, AlertgenError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, AlertgenError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), AlertgenError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    pub fn insert_ticker(&self, ticker: &str, active: bool) -> Result<(), AlertgenError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO tickers (ticker, active) VALUES (?1, ?2)",
                params![ticker, active],
            )
            .map_err(query_err)?;
        Ok(())
    }

    /// Store a criterion with its ranges; range order is preserved through
    /// the `position` column.
    pub fn insert_criterion(
        &self,
        criterion: &CriterionRecord,
        ranges: &[RangeRecord],
    ) -> Result<(), AlertgenError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO criteria
                (id, name, criterion_type, parameters, max_base_points,
                 direction, active, timeframes, bias)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                criterion.id,
                criterion.name,
                criterion.kind,
                criterion.parameters,
                criterion.max_base_points,
                criterion.direction,
                criterion.active,
                criterion.timeframes,
                criterion.bias
            ],
        )
        .map_err(query_err)?;

        for (position, range) in ranges.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO criterion_ranges
                    (id, criterion_id, position, operator, lower, upper,
                     include_lower, include_upper, percentage, impact, name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    range.id,
                    criterion.id,
                    position as i64,
                    range.operator,
                    range.lower,
                    range.upper,
                    range.include_lower,
                    range.include_upper,
                    range.percentage,
                    range.impact,
                    range.name
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    /// Insert snapshots, adding any indicator column the table lacks.
    pub fn insert_snapshots(&self, snapshots: &[Snapshot]) -> Result<(), AlertgenError> {
        let mut conn = self.conn()?;
        let mut existing = indicator_columns(&conn)?;

        let tx = conn.transaction().map_err(query_err)?;
        for snapshot in snapshots {
            let mut names: Vec<&String> = snapshot.fields.keys().collect();
            names.sort();

            for name in &names {
                if existing.iter().any(|c| c == *name) {
                    continue;
                }
                validate_column_name(name)?;
                tx.execute(&format!("ALTER TABLE indicators ADD COLUMN \"{name}\" REAL"), [])
                    .map_err(query_err)?;
                existing.push((*name).clone());
            }

            let mut columns = vec![
                "ticker".to_string(),
                "timeframe".to_string(),
                "timestamp".to_string(),
                "is_closed".to_string(),
            ];
            columns.extend(names.iter().map(|n| format!("\"{n}\"")));
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT OR REPLACE INTO indicators ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            );

            let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(snapshot.ticker.clone()),
                Box::new(snapshot.timeframe.clone()),
                Box::new(format_timestamp(snapshot.timestamp)),
                Box::new(snapshot.is_closed),
            ];
            values.extend(
                names
                    .iter()
                    .map(|n| Box::new(snapshot.fields[*n]) as Box<dyn rusqlite::ToSql>),
            );

            tx.execute(&sql, rusqlite::params_from_iter(values.iter()))
                .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    pub fn count_alerts(&self) -> Result<usize, AlertgenError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as usize)
    }

    /// Stored alerts for one ticker, ordered by timestamp then criterion.
    pub fn fetch_alerts(&self, ticker: &str) -> Result<Vec<Alert>, AlertgenError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INSERT_ALERT_COLUMNS} FROM alerts WHERE ticker = ?1
                 ORDER BY timestamp, criterion_id, range_id"
            ))
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![ticker], |row| {
                let ts: String = row.get(3)?;
                let timestamp = parse_timestamp(&ts).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        format!("bad timestamp '{ts}'").into(),
                    )
                })?;
                Ok(Alert {
                    criterion_id: row.get(0)?,
                    ticker: row.get(1)?,
                    timeframe: row.get(2)?,
                    timestamp,
                    detail_1: row.get(4)?,
                    detail_2: row.get(5)?,
                    detail_3: row.get(6)?,
                    result: row.get(7)?,
                    range_id: row.get(8)?,
                    points_long: row.get(9)?,
                    points_short: row.get(10)?,
                    points_neutral: row.get(11)?,
                    year: row.get(12)?,
                    month: row.get(13)?,
                    day: row.get(14)?,
                    is_closed: row.get(15)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

fn validate_column_name(name: &str) -> Result<(), AlertgenError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && is_indicator_column(name);
    if valid {
        Ok(())
    } else {
        Err(AlertgenError::DatabaseQuery {
            reason: format!("invalid indicator column name '{name}'"),
        })
    }
}

fn indicator_columns(conn: &rusqlite::Connection) -> Result<Vec<String>, AlertgenError> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info('indicators')")
        .map_err(query_err)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(query_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_err)?;
    Ok(names.into_iter().filter(|n| is_indicator_column(n)).collect())
}

impl CatalogPort for SqliteAdapter {
    fn list_active_tickers(&self) -> Result<Vec<String>, AlertgenError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT ticker FROM tickers WHERE active = 1 ORDER BY ticker")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn list_active_criteria(&self) -> Result<Vec<CriterionRecord>, AlertgenError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, criterion_type, parameters, max_base_points, direction,
                        active, timeframes, bias
                 FROM criteria WHERE active = 1 ORDER BY id",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CriterionRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    kind: row.get(2)?,
                    parameters: row.get(3)?,
                    max_base_points: row.get(4)?,
                    direction: row.get(5)?,
                    active: row.get(6)?,
                    timeframes: row.get(7)?,
                    bias: row.get(8)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn list_ranges(&self, criterion_id: &str) -> Result<Vec<RangeRecord>, AlertgenError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, criterion_id, operator, lower, upper, include_lower, include_upper,
                        percentage, impact, name
                 FROM criterion_ranges WHERE criterion_id = ?1 ORDER BY position, id",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![criterion_id], |row| {
                Ok(RangeRecord {
                    id: row.get(0)?,
                    criterion_id: row.get(1)?,
                    operator: row.get(2)?,
                    lower: row.get(3)?,
                    upper: row.get(4)?,
                    include_lower: row.get(5)?,
                    include_upper: row.get(6)?,
                    percentage: row.get(7)?,
                    impact: row.get(8)?,
                    name: row.get(9)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl SnapshotPort for SqliteAdapter {
    fn load_snapshots(
        &self,
        ticker: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Snapshot>, AlertgenError> {
        // Rows written elsewhere may use the `T` separator, which sorts after
        // the space form. Compare on the space form.
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM indicators
                 WHERE ticker = ?1
                   AND replace(timestamp, 'T', ' ') >= ?2
                   AND replace(timestamp, 'T', ' ') <= ?3
                 ORDER BY replace(timestamp, 'T', ' ') ASC, timeframe ASC",
            )
            .map_err(query_err)?;

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let index_of = |name: &str| columns.iter().position(|c| c == name);
        let (Some(tf_idx), Some(ts_idx), Some(closed_idx)) =
            (index_of("timeframe"), index_of("timestamp"), index_of("is_closed"))
        else {
            return Err(AlertgenError::DatabaseQuery {
                reason: "indicators table is missing key columns".into(),
            });
        };

        let rows = stmt
            .query_map(
                params![ticker, format_timestamp(from), format_timestamp(to)],
                |row| {
                    let ts: String = row.get(ts_idx)?;
                    let timestamp = parse_timestamp(&ts).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            ts_idx,
                            rusqlite::types::Type::Text,
                            format!("bad timestamp '{ts}'").into(),
                        )
                    })?;

                    let mut fields = HashMap::new();
                    for (i, name) in columns.iter().enumerate() {
                        if !is_indicator_column(name) {
                            continue;
                        }
                        let value = match row.get_ref(i)? {
                            ValueRef::Integer(v) => Some(v as f64),
                            ValueRef::Real(v) => Some(v),
                            _ => None,
                        };
                        if let Some(v) = value {
                            fields.insert(name.clone(), v);
                        }
                    }

                    Ok(Snapshot {
                        ticker: ticker.to_string(),
                        timeframe: row.get(tf_idx)?,
                        timestamp,
                        is_closed: row.get(closed_idx)?,
                        fields,
                    })
                },
            )
            .map_err(query_err)?;

        let snapshots = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        tracing::debug!(ticker, rows = snapshots.len(), "snapshots fetched");
        Ok(snapshots)
    }
}

impl AlertSink for SqliteAdapter {
    fn emit_alerts(&self, batch: &[Alert]) -> Result<usize, AlertgenError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let mut stored = 0;
        {
            let mut stmt = tx
                .prepare_cached(&format!(
                    "INSERT INTO alerts ({INSERT_ALERT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                     ON CONFLICT DO NOTHING"
                ))
                .map_err(query_err)?;

            for alert in batch {
                let row = AlertRow::from(alert);
                stored += stmt
                    .execute(params![
                        row.criterion_id,
                        row.ticker,
                        row.timeframe,
                        row.timestamp,
                        row.detail_1,
                        row.detail_2,
                        row.detail_3,
                        row.result,
                        row.range_id,
                        row.points_long,
                        row.points_short,
                        row.points_neutral,
                        row.year,
                        row.month,
                        row.day,
                        row.is_closed
                    ])
                    .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;

        tracing::debug!(batch = batch.len(), stored, "alerts emitted");
        Ok(stored)
    }
}
