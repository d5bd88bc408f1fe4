//! Row mapping shared by the SQL adapters.

use crate::domain::alert::Alert;
use chrono::NaiveDateTime;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Snapshot table columns that are not indicator fields.
pub const SNAPSHOT_KEY_COLUMNS: &[&str] = &["ticker", "timeframe", "timestamp", "is_closed"];

pub const INSERT_ALERT_COLUMNS: &str = "criterion_id, ticker, timeframe, timestamp, \
     detail_1, detail_2, detail_3, result, range_id, \
     points_long, points_short, points_neutral, year, month, day, is_closed";

pub fn is_indicator_column(name: &str) -> bool {
    !SNAPSHOT_KEY_COLUMNS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(name))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// An alert flattened into bindable column values.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRow {
    pub criterion_id: String,
    pub ticker: String,
    pub timeframe: String,
    pub timestamp: String,
    pub detail_1: String,
    pub detail_2: String,
    pub detail_3: String,
    pub result: String,
    pub range_id: i64,
    pub points_long: f64,
    pub points_short: f64,
    pub points_neutral: f64,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub is_closed: Option<bool>,
}

impl From<&Alert> for AlertRow {
    fn from(alert: &Alert) -> Self {
        AlertRow {
            criterion_id: alert.criterion_id.clone(),
            ticker: alert.ticker.clone(),
            timeframe: alert.timeframe.clone(),
            timestamp: format_timestamp(alert.timestamp),
            detail_1: alert.detail_1.clone(),
            detail_2: alert.detail_2.clone(),
            detail_3: alert.detail_3.clone(),
            result: alert.result.clone(),
            range_id: alert.range_id,
            points_long: alert.points_long,
            points_short: alert.points_short,
            points_neutral: alert.points_neutral,
            year: alert.year,
            month: alert.month as i32,
            day: alert.day as i32,
            is_closed: alert.is_closed,
        }
    }
}
