#![allow(dead_code)]

pub use alertgen::adapters::memory_adapter::MemoryStore;
use alertgen::domain::alert::Alert;
use alertgen::domain::catalog::{CriterionRecord, RangeRecord};
use alertgen::domain::error::AlertgenError;
pub use alertgen::domain::snapshot::Snapshot;
use alertgen::ports::alert_sink::AlertSink;
use alertgen::ports::snapshot_port::SnapshotPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Mutex;

/// Snapshot source that can be told to fail or panic for specific tickers.
pub struct MockSnapshotPort {
    pub data: HashMap<String, Vec<Snapshot>>,
    pub errors: HashMap<String, String>,
    pub panics: Vec<String>,
}

impl MockSnapshotPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            panics: Vec::new(),
        }
    }

    pub fn with_snapshots(mut self, ticker: &str, snapshots: Vec<Snapshot>) -> Self {
        self.data.insert(ticker.to_string(), snapshots);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    pub fn with_panic(mut self, ticker: &str) -> Self {
        self.panics.push(ticker.to_string());
        self
    }
}

impl SnapshotPort for MockSnapshotPort {
    fn load_snapshots(
        &self,
        ticker: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Snapshot>, AlertgenError> {
        if self.panics.iter().any(|t| t == ticker) {
            panic!("snapshot source exploded for {ticker}");
        }
        if let Some(reason) = self.errors.get(ticker) {
            return Err(AlertgenError::Database {
                reason: reason.clone(),
            });
        }
        let mut rows: Vec<Snapshot> = self
            .data
            .get(ticker)
            .map(|rows| {
                rows.iter()
                    .filter(|s| s.timestamp >= from && s.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|s| s.timestamp);
        Ok(rows)
    }
}

/// Sink that records every batch it receives, deduplicating like a real store.
pub struct RecordingSink {
    pub store: MemoryStore,
    pub batches: Mutex<Vec<Vec<Alert>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<Vec<Alert>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.store.alerts()
    }
}

impl AlertSink for RecordingSink {
    fn emit_alerts(&self, batch: &[Alert]) -> Result<usize, AlertgenError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        self.store.emit_alerts(batch)
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(year, month, day).and_hms_opt(hour, minute, 0).unwrap()
}

pub fn snapshot(
    ticker: &str,
    timeframe: &str,
    ts: NaiveDateTime,
    fields: &[(&str, f64)],
) -> Snapshot {
    fields
        .iter()
        .fold(Snapshot::new(ticker, timeframe, ts), |s, (name, value)| {
            s.with_field(name, *value)
        })
}

pub fn criterion(id: &str, kind: &str, parameters: &str) -> CriterionRecord {
    CriterionRecord {
        id: id.into(),
        name: id.into(),
        kind: kind.into(),
        parameters: parameters.into(),
        active: true,
        ..Default::default()
    }
}

pub fn between(id: i64, lower: f64, upper: f64, percentage: f64, impact: &str) -> RangeRecord {
    RangeRecord {
        id,
        operator: Some("between".into()),
        lower: Some(lower),
        upper: Some(upper),
        percentage: Some(percentage),
        impact: Some(impact.into()),
        name: format!("range {id}"),
        ..Default::default()
    }
}

pub fn single(id: i64, operator: &str, bound: f64, percentage: f64, impact: &str) -> RangeRecord {
    RangeRecord {
        id,
        operator: Some(operator.into()),
        upper: Some(bound),
        percentage: Some(percentage),
        impact: Some(impact.into()),
        name: format!("range {id}"),
        ..Default::default()
    }
}

/// The RSI-oversold catalog used across suites.
pub fn rsi_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_criterion(
        criterion("rsi_oversold", "constant_threshold", "rsi_14"),
        vec![
            between(1, 0.0, 30.0, 100.0, "LONG"),
            between(2, 70.0, 100.0, 100.0, "SHORT"),
        ],
    );
    store
}
