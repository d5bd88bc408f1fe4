//! Indicator snapshots and their per-day / per-timeframe views.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub ticker: String,
    pub timeframe: String,
    pub timestamp: NaiveDateTime,
    pub is_closed: Option<bool>,
    pub fields: HashMap<String, f64>,
}

impl Snapshot {
    pub fn new(ticker: &str, timeframe: &str, timestamp: NaiveDateTime) -> Self {
        Self {
            ticker: ticker.to_string(),
            timeframe: timeframe.to_string(),
            timestamp,
            is_closed: None,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Field value; NaN counts as absent.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied().filter(|v| !v.is_nan())
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Group snapshots by calendar day, ascending. Order within a day is preserved.
pub fn partition_by_day(snapshots: &[Snapshot]) -> BTreeMap<NaiveDate, Vec<&Snapshot>> {
    let mut days: BTreeMap<NaiveDate, Vec<&Snapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        days.entry(snapshot.date()).or_default().push(snapshot);
    }
    days
}

/// Per-timeframe series of one ticker, each sorted by timestamp, for as-of lookups.
#[derive(Debug, Default)]
pub struct TimeframeIndex<'a> {
    series: HashMap<&'a str, Vec<&'a Snapshot>>,
}

impl<'a> TimeframeIndex<'a> {
    pub fn build(snapshots: &'a [Snapshot]) -> Self {
        let mut series: HashMap<&'a str, Vec<&'a Snapshot>> = HashMap::new();
        for snapshot in snapshots {
            series
                .entry(snapshot.timeframe.as_str())
                .or_default()
                .push(snapshot);
        }
        for list in series.values_mut() {
            list.sort_by_key(|s| s.timestamp);
        }
        Self { series }
    }

    pub fn series(&self, timeframe: &str) -> &[&'a Snapshot] {
        self.series.get(timeframe).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest snapshot of `timeframe` with `timestamp <= at`.
    pub fn as_of(&self, timeframe: &str, at: NaiveDateTime) -> Option<&'a Snapshot> {
        let series = self.series(timeframe);
        let idx = series.partition_point(|s| s.timestamp <= at);
        if idx == 0 { None } else { Some(series[idx - 1]) }
    }
}
