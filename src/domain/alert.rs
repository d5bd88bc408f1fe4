//! Emitted alert records.

use crate::domain::criterion::Criterion;
use crate::domain::range::Range;
use crate::domain::scorer::Points;
use crate::domain::snapshot::Snapshot;
use chrono::{Datelike, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub criterion_id: String,
    pub ticker: String,
    pub timeframe: String,
    pub timestamp: NaiveDateTime,
    pub detail_1: String,
    pub detail_2: String,
    pub detail_3: String,
    pub result: String,
    pub range_id: i64,
    pub points_long: f64,
    pub points_short: f64,
    pub points_neutral: f64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub is_closed: Option<bool>,
}

/// Natural key used for idempotent emission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub criterion_id: String,
    pub ticker: String,
    pub timeframe: String,
    pub timestamp: NaiveDateTime,
    pub range_id: i64,
}

impl Alert {
    /// Build the alert for a match on `snapshot`. Secondary details start empty.
    pub fn from_match(
        snapshot: &Snapshot,
        criterion: &Criterion,
        range: &Range,
        points: Points,
        detail: String,
    ) -> Self {
        let ts = snapshot.timestamp;
        Alert {
            criterion_id: criterion.id.clone(),
            ticker: snapshot.ticker.clone(),
            timeframe: snapshot.timeframe.clone(),
            timestamp: ts,
            detail_1: detail,
            detail_2: String::new(),
            detail_3: String::new(),
            result: result_summary(range, &points),
            range_id: range.id,
            points_long: points.long,
            points_short: points.short,
            points_neutral: points.neutral,
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
            is_closed: snapshot.is_closed,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey {
            criterion_id: self.criterion_id.clone(),
            ticker: self.ticker.clone(),
            timeframe: self.timeframe.clone(),
            timestamp: self.timestamp,
            range_id: self.range_id,
        }
    }
}

/// `"<range name> | <IMPACT> | points=<p>"`
pub fn result_summary(range: &Range, points: &Points) -> String {
    format!(
        "{} | {} | points={:.2}",
        range.name,
        range.impact,
        points.assigned()
    )
}
