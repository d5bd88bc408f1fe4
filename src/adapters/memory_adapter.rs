//! In-process store implementing every port.
//!
//! Backs dry runs and tests. Alerts are deduplicated on their natural key
//! exactly as the SQL sinks do.

use crate::domain::alert::{Alert, AlertKey};
use crate::domain::catalog::{CriterionRecord, RangeRecord};
use crate::domain::error::AlertgenError;
use crate::domain::snapshot::Snapshot;
use crate::ports::alert_sink::AlertSink;
use crate::ports::catalog_port::CatalogPort;
use crate::ports::snapshot_port::SnapshotPort;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    tickers: Vec<String>,
    criteria: Vec<(CriterionRecord, Vec<RangeRecord>)>,
    snapshots: Vec<Snapshot>,
    alerts: Vec<Alert>,
    keys: HashSet<AlertKey>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AlertgenError> {
        self.inner.lock().map_err(|_| AlertgenError::Database {
            reason: "memory store lock poisoned".into(),
        })
    }

    // Seeding helpers recover from poisoning: they only run in setup code.
    fn lock_for_seed(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_ticker(&self, ticker: &str) {
        let mut inner = self.lock_for_seed();
        if !inner.tickers.iter().any(|t| t == ticker) {
            inner.tickers.push(ticker.to_string());
        }
    }

    pub fn add_criterion(&self, criterion: CriterionRecord, ranges: Vec<RangeRecord>) {
        let ranges = ranges
            .into_iter()
            .map(|mut r| {
                r.criterion_id = criterion.id.clone();
                r
            })
            .collect();
        self.lock_for_seed().criteria.push((criterion, ranges));
    }

    pub fn add_snapshots(&self, snapshots: impl IntoIterator<Item = Snapshot>) {
        self.lock_for_seed().snapshots.extend(snapshots);
    }

    /// Stored alerts in insertion order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock_for_seed().alerts.clone()
    }
}

impl CatalogPort for MemoryStore {
    fn list_active_tickers(&self) -> Result<Vec<String>, AlertgenError> {
        let mut tickers = self.lock()?.tickers.clone();
        tickers.sort();
        Ok(tickers)
    }

    fn list_active_criteria(&self) -> Result<Vec<CriterionRecord>, AlertgenError> {
        Ok(self
            .lock()?
            .criteria
            .iter()
            .filter(|(c, _)| c.active)
            .map(|(c, _)| c.clone())
            .collect())
    }

    fn list_ranges(&self, criterion_id: &str) -> Result<Vec<RangeRecord>, AlertgenError> {
        Ok(self
            .lock()?
            .criteria
            .iter()
            .find(|(c, _)| c.id == criterion_id)
            .map(|(_, ranges)| ranges.clone())
            .unwrap_or_default())
    }
}

impl SnapshotPort for MemoryStore {
    fn load_snapshots(
        &self,
        ticker: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Snapshot>, AlertgenError> {
        let mut rows: Vec<Snapshot> = self
            .lock()?
            .snapshots
            .iter()
            .filter(|s| s.ticker == ticker && s.timestamp >= from && s.timestamp <= to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.timeframe.cmp(&b.timeframe))
        });
        Ok(rows)
    }
}

impl AlertSink for MemoryStore {
    fn emit_alerts(&self, batch: &[Alert]) -> Result<usize, AlertgenError> {
        let mut inner = self.lock()?;
        let mut stored = 0;
        for alert in batch {
            if inner.keys.insert(alert.key()) {
                inner.alerts.push(alert.clone());
                stored += 1;
            }
        }
        Ok(stored)
    }
}
