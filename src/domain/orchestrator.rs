//! Partitioned run orchestration.
//!
//! Tickers fan out over a private bounded thread pool. Inside a worker, days
//! are processed strictly in ascending order and each day's alerts are flushed
//! before the next day starts, so a failure mid-ticker leaves the already
//! flushed days committed. Multi-timeframe criteria run after the daily loop
//! over the whole ticker dataset, also flushed one day at a time.

use crate::domain::alert::Alert;
use crate::domain::catalog::{Catalog, CompiledCriterion};
use crate::domain::error::AlertgenError;
use crate::domain::operator_table::OperatorTable;
use crate::domain::snapshot::{Snapshot, TimeframeIndex, partition_by_day};
use crate::ports::alert_sink::AlertSink;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::snapshot_port::SnapshotPort;
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub workers: usize,
    /// Evaluate without writing to the sink.
    pub dry_run: bool,
    /// Restrict the run to these tickers (intersected with the active list).
    pub tickers: Option<Vec<String>>,
}

impl RunConfig {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end,
            workers: DEFAULT_WORKERS,
            dry_run: false,
            tickers: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickerReport {
    pub ticker: String,
    pub alerts: usize,
    pub stored: usize,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerFailure {
    pub ticker: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub completed: Vec<TickerReport>,
    pub failed: Vec<TickerFailure>,
}

impl RunSummary {
    pub fn total_alerts(&self) -> usize {
        self.completed.iter().map(|r| r.alerts).sum()
    }

    pub fn total_stored(&self) -> usize {
        self.completed.iter().map(|r| r.stored).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn report(&self, ticker: &str) -> Option<&TickerReport> {
        self.completed.iter().find(|r| r.ticker == ticker)
    }
}

/// Full run: load the catalog and ticker list, then evaluate every ticker.
pub fn run(
    catalog_port: &dyn CatalogPort,
    snapshots: &dyn SnapshotPort,
    sink: &dyn AlertSink,
    operators: &OperatorTable,
    config: &RunConfig,
) -> Result<RunSummary, AlertgenError> {
    let catalog = Catalog::load(catalog_port, operators)?;
    tracing::info!(
        simple = catalog.simple().count(),
        multi_timeframe = catalog.multi_timeframe().count(),
        "criteria loaded"
    );

    let mut tickers = catalog_port.list_active_tickers()?;
    if let Some(filter) = &config.tickers {
        tickers.retain(|t| filter.iter().any(|f| f.eq_ignore_ascii_case(t)));
    }
    tracing::info!(count = tickers.len(), "active tickers");

    run_catalog(&catalog, &tickers, snapshots, sink, config)
}

/// Evaluate an already compiled catalog over `tickers` on a bounded pool.
pub fn run_catalog(
    catalog: &Catalog,
    tickers: &[String],
    snapshots: &dyn SnapshotPort,
    sink: &dyn AlertSink,
    config: &RunConfig,
) -> Result<RunSummary, AlertgenError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .thread_name(|i| format!("alertgen-worker-{i}"))
        .build()
        .map_err(|e| AlertgenError::WorkerPool {
            reason: e.to_string(),
        })?;

    let outcomes: Vec<(String, Result<TickerReport, AlertgenError>)> = pool.install(|| {
        tickers
            .par_iter()
            .map(|ticker| {
                let outcome = run_guarded(ticker, catalog, snapshots, sink, config);
                (ticker.clone(), outcome)
            })
            .collect()
    });

    let mut summary = RunSummary::default();
    for (ticker, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                tracing::info!(
                    ticker = %report.ticker,
                    alerts = report.alerts,
                    stored = report.stored,
                    days = report.days,
                    "ticker summary"
                );
                summary.completed.push(report);
            }
            Err(e) => {
                tracing::error!(%ticker, error = %e, "ticker failed");
                summary.failed.push(TickerFailure {
                    ticker,
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(summary)
}

/// Turns a worker panic into a per-ticker error so it cannot take the run down.
fn run_guarded(
    ticker: &str,
    catalog: &Catalog,
    snapshots: &dyn SnapshotPort,
    sink: &dyn AlertSink,
    config: &RunConfig,
) -> Result<TickerReport, AlertgenError> {
    catch_unwind(AssertUnwindSafe(|| {
        process_ticker(ticker, catalog, snapshots, sink, config)
    }))
    .unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "worker panicked".to_string());
        Err(AlertgenError::Worker {
            ticker: ticker.to_string(),
            reason,
        })
    })
}

pub fn process_ticker(
    ticker: &str,
    catalog: &Catalog,
    snapshots: &dyn SnapshotPort,
    sink: &dyn AlertSink,
    config: &RunConfig,
) -> Result<TickerReport, AlertgenError> {
    let span = tracing::info_span!("ticker", %ticker);
    let _enter = span.enter();

    let mut report = TickerReport {
        ticker: ticker.to_string(),
        ..TickerReport::default()
    };

    let data = snapshots.load_snapshots(ticker, config.start, config.end)?;
    if data.is_empty() {
        tracing::warn!("no snapshots in window");
        return Ok(report);
    }
    tracing::info!(snapshots = data.len(), "snapshots loaded");

    let history = TimeframeIndex::build(&data);
    let days = partition_by_day(&data);
    report.days = days.len();

    for (day, rows) in &days {
        let mut batch = Vec::new();
        for criterion in catalog.simple() {
            batch.extend(rows.iter().filter_map(|s| criterion.evaluate(s, &history)));
        }
        tracing::debug!(%day, rows = rows.len(), alerts = batch.len(), "day evaluated");
        flush(sink, &batch, config, &mut report)?;
    }

    for criterion in catalog.multi_timeframe() {
        evaluate_multi_timeframe(criterion, &history, sink, config, &mut report)?;
    }

    Ok(report)
}

fn evaluate_multi_timeframe(
    criterion: &CompiledCriterion,
    history: &TimeframeIndex<'_>,
    sink: &dyn AlertSink,
    config: &RunConfig,
    report: &mut TickerReport,
) -> Result<(), AlertgenError> {
    let Some(major) = criterion.criterion.major_timeframe() else {
        return Ok(());
    };
    let series = history.series(major);
    if series.is_empty() {
        tracing::debug!(
            criterion_id = %criterion.criterion.id,
            major,
            "major timeframe has no snapshots, skipping"
        );
        return Ok(());
    }

    for day in series.chunk_by(|a, b| a.date() == b.date()) {
        let batch: Vec<Alert> = day
            .iter()
            .filter_map(|s: &&Snapshot| criterion.evaluate(s, history))
            .collect();
        flush(sink, &batch, config, report)?;
    }
    Ok(())
}

fn flush(
    sink: &dyn AlertSink,
    batch: &[Alert],
    config: &RunConfig,
    report: &mut TickerReport,
) -> Result<(), AlertgenError> {
    report.alerts += batch.len();
    if batch.is_empty() || config.dry_run {
        return Ok(());
    }
    report.stored += sink.emit_alerts(batch)?;
    Ok(())
}
