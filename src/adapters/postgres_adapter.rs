//! PostgreSQL catalog, snapshot and alert storage adapter.
//!
//! Expects the same tables as the SQLite adapter with `timestamp` typed as
//! `timestamp` or `timestamptz` (bound as UTC), and a unique index on
//! `alerts(criterion_id, ticker, timeframe, timestamp, range_id)`.

use crate::adapters::alert_rows::{AlertRow, INSERT_ALERT_COLUMNS, is_indicator_column};
use crate::domain::alert::Alert;
use crate::domain::catalog::{CriterionRecord, RangeRecord};
use crate::domain::error::AlertgenError;
use crate::domain::snapshot::Snapshot;
use crate::ports::alert_sink::AlertSink;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::snapshot_port::SnapshotPort;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use postgres::types::{ToSql, Type};
use postgres::{NoTls, Row, Statement};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use std::collections::HashMap;

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn db_err(e: r2d2::Error) -> AlertgenError {
    AlertgenError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> AlertgenError {
    AlertgenError::DatabaseQuery {
        reason: e.to_string(),
    }
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AlertgenError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| AlertgenError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| AlertgenError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        tracing::debug!(pool_size, "postgres pool opened");
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, AlertgenError> {
        self.pool.get().map_err(db_err)
    }
}

/// Numeric value of column `idx` regardless of its integer or float width.
fn numeric_value(row: &Row, idx: usize, ty: &Type) -> Option<f64> {
    match *ty {
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).ok().flatten(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(f64::from),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| v as f64),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(f64::from),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(f64::from),
        _ => None,
    }
}

fn timestamp_value(row: &Row, idx: usize) -> Result<NaiveDateTime, AlertgenError> {
    let column = &row.columns()[idx];
    match *column.type_() {
        Type::TIMESTAMPTZ => row
            .try_get::<_, DateTime<Utc>>(idx)
            .map(|dt| dt.naive_utc())
            .map_err(query_err),
        _ => row.try_get::<_, NaiveDateTime>(idx).map_err(query_err),
    }
}

/// A timestamp parameter typed to match the column it is compared with.
/// Naive values are UTC.
#[derive(Debug)]
enum TimestampParam {
    Naive(NaiveDateTime),
    Utc(DateTime<Utc>),
}

impl TimestampParam {
    fn for_type(ts: NaiveDateTime, ty: &Type) -> Self {
        if *ty == Type::TIMESTAMPTZ {
            TimestampParam::Utc(Utc.from_utc_datetime(&ts))
        } else {
            TimestampParam::Naive(ts)
        }
    }

    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            TimestampParam::Naive(ts) => ts,
            TimestampParam::Utc(ts) => ts,
        }
    }
}

fn param_type(stmt: &Statement, idx: usize) -> Type {
    stmt.params().get(idx).cloned().unwrap_or(Type::TIMESTAMP)
}

fn snapshot_from_row(ticker: &str, row: &Row) -> Result<Snapshot, AlertgenError> {
    let mut timeframe = None;
    let mut timestamp = None;
    let mut is_closed = None;
    let mut fields = HashMap::new();

    for (idx, column) in row.columns().iter().enumerate() {
        match column.name() {
            "timeframe" => timeframe = Some(row.try_get::<_, String>(idx).map_err(query_err)?),
            "timestamp" => timestamp = Some(timestamp_value(row, idx)?),
            "is_closed" => is_closed = row.try_get::<_, Option<bool>>(idx).map_err(query_err)?,
            name if is_indicator_column(name) => {
                if let Some(v) = numeric_value(row, idx, column.type_()) {
                    fields.insert(name.to_string(), v);
                }
            }
            _ => {}
        }
    }

    match (timeframe, timestamp) {
        (Some(timeframe), Some(timestamp)) => Ok(Snapshot {
            ticker: ticker.to_string(),
            timeframe,
            timestamp,
            is_closed,
            fields,
        }),
        _ => Err(AlertgenError::DatabaseQuery {
            reason: "indicators table is missing key columns".into(),
        }),
    }
}

impl CatalogPort for PostgresAdapter {
    fn list_active_tickers(&self) -> Result<Vec<String>, AlertgenError> {
        let rows = self
            .conn()?
            .query(
                "SELECT ticker FROM public.tickers \
                 WHERE active AND ticker IS NOT NULL ORDER BY ticker",
                &[],
            )
            .map_err(query_err)?;
        rows.iter()
            .map(|row| row.try_get(0).map_err(query_err))
            .collect()
    }

    fn list_active_criteria(&self) -> Result<Vec<CriterionRecord>, AlertgenError> {
        // Nullable text columns are coalesced so a sloppy row surfaces as a
        // catalog issue instead of a decode failure.
        let query = "SELECT id, coalesce(name, id), coalesce(criterion_type, ''), \
                            coalesce(parameters, ''), \
                            max_base_points::double precision, direction, \
                            coalesce(active, false), timeframes, bias \
                     FROM public.criteria \
                     WHERE active AND id IS NOT NULL ORDER BY id";
        let rows = self.conn()?.query(query, &[]).map_err(query_err)?;

        rows.iter()
            .map(|row| {
                Ok(CriterionRecord {
                    id: row.try_get(0).map_err(query_err)?,
                    name: row.try_get(1).map_err(query_err)?,
                    kind: row.try_get(2).map_err(query_err)?,
                    parameters: row.try_get(3).map_err(query_err)?,
                    max_base_points: row.try_get(4).map_err(query_err)?,
                    direction: row.try_get(5).map_err(query_err)?,
                    active: row.try_get(6).map_err(query_err)?,
                    timeframes: row.try_get(7).map_err(query_err)?,
                    bias: row.try_get(8).map_err(query_err)?,
                })
            })
            .collect()
    }

    fn list_ranges(&self, criterion_id: &str) -> Result<Vec<RangeRecord>, AlertgenError> {
        let query = "SELECT id::bigint, criterion_id, operator, \
                            lower::double precision, upper::double precision, \
                            include_lower, include_upper, \
                            percentage::double precision, impact, coalesce(name, '') \
                     FROM public.criterion_ranges \
                     WHERE criterion_id = $1 AND id IS NOT NULL ORDER BY position, id";
        let rows = self
            .conn()?
            .query(query, &[&criterion_id])
            .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                Ok(RangeRecord {
                    id: row.try_get(0).map_err(query_err)?,
                    criterion_id: row.try_get(1).map_err(query_err)?,
                    operator: row.try_get(2).map_err(query_err)?,
                    lower: row.try_get(3).map_err(query_err)?,
                    upper: row.try_get(4).map_err(query_err)?,
                    include_lower: row.try_get(5).map_err(query_err)?,
                    include_upper: row.try_get(6).map_err(query_err)?,
                    percentage: row.try_get(7).map_err(query_err)?,
                    impact: row.try_get(8).map_err(query_err)?,
                    name: row.try_get(9).map_err(query_err)?,
                })
            })
            .collect()
    }
}

impl SnapshotPort for PostgresAdapter {
    fn load_snapshots(
        &self,
        ticker: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Snapshot>, AlertgenError> {
        let query = "SELECT * FROM public.indicators \
                     WHERE ticker = $1 AND timestamp >= $2 AND timestamp <= $3 \
                     ORDER BY timestamp ASC, timeframe ASC";

        let mut conn = self.conn()?;
        let stmt = conn.prepare(query).map_err(query_err)?;
        let from = TimestampParam::for_type(from, &param_type(&stmt, 1));
        let to = TimestampParam::for_type(to, &param_type(&stmt, 2));

        let params: &[&(dyn ToSql + Sync)] = &[&ticker, from.as_sql(), to.as_sql()];
        let rows = conn.query(&stmt, params).map_err(query_err)?;

        let snapshots = rows
            .iter()
            .map(|row| snapshot_from_row(ticker, row))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(ticker, rows = snapshots.len(), "snapshots fetched");
        Ok(snapshots)
    }
}

impl AlertSink for PostgresAdapter {
    fn emit_alerts(&self, batch: &[Alert]) -> Result<usize, AlertgenError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;
        let stmt = tx
            .prepare(&format!(
                "INSERT INTO public.alerts ({INSERT_ALERT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
                 ON CONFLICT DO NOTHING"
            ))
            .map_err(query_err)?;

        let timestamp_type = param_type(&stmt, 3);

        let mut stored = 0;
        for alert in batch {
            let row = AlertRow::from(alert);
            let timestamp = TimestampParam::for_type(alert.timestamp, &timestamp_type);
            let params: &[&(dyn ToSql + Sync)] = &[
                &row.criterion_id,
                &row.ticker,
                &row.timeframe,
                timestamp.as_sql(),
                &row.detail_1,
                &row.detail_2,
                &row.detail_3,
                &row.result,
                &row.range_id,
                &row.points_long,
                &row.points_short,
                &row.points_neutral,
                &row.year,
                &row.month,
                &row.day,
                &row.is_closed,
            ];
            stored += tx.execute(&stmt, params).map_err(query_err)? as usize;
        }
        tx.commit().map_err(query_err)?;

        tracing::debug!(batch = batch.len(), stored, "alerts emitted");
        Ok(stored)
    }
}
