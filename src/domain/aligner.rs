//! Multi-timeframe agreement scoring.
//!
//! For each snapshot on the criterion's major (first-listed) timeframe, every
//! implicated timeframe is looked up as of that timestamp, the resolved values
//! are compared against one scalar threshold, and the number that agree is
//! matched against the criterion's ranges.
//!
//! Lookups only ever see snapshots at or before the reference timestamp.

use crate::domain::alert::Alert;
use crate::domain::criterion::{Bias, Criterion};
use crate::domain::error::AlertgenError;
use crate::domain::range::{Range, RangeOperator};
use crate::domain::range_matcher::match_count;
use crate::domain::scorer::score;
use crate::domain::snapshot::{Snapshot, TimeframeIndex};

/// Threshold and comparison resolved once per criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSpec {
    pub field: String,
    pub threshold: f64,
    pub operator: RangeOperator,
}

impl AlignmentSpec {
    pub fn resolve(
        criterion: &Criterion,
        ranges: &[Range],
        field: String,
    ) -> Result<Self, AlertgenError> {
        if criterion.timeframes.is_empty() {
            return Err(AlertgenError::criterion(
                &criterion.id,
                "multi-timeframe criterion lists no timeframes",
            ));
        }
        let bias = criterion.resolved_bias();
        let threshold = resolve_threshold(bias, ranges).ok_or_else(|| {
            AlertgenError::criterion(&criterion.id, "no range bound to derive a threshold from")
        })?;
        Ok(Self {
            field,
            threshold,
            operator: resolve_operator(bias, ranges),
        })
    }
}

/// Long bias: smallest upper bound. Short bias: largest lower bound.
/// Otherwise the first range's upper bound.
pub fn resolve_threshold(bias: Option<Bias>, ranges: &[Range]) -> Option<f64> {
    match bias {
        Some(Bias::Long) => ranges
            .iter()
            .filter_map(|r| r.upper)
            .min_by(|a, b| a.total_cmp(b)),
        Some(Bias::Short) => ranges
            .iter()
            .filter_map(|r| r.lower)
            .max_by(|a, b| a.total_cmp(b)),
        None => ranges.first().and_then(|r| r.upper),
    }
}

/// First single-sided inequality among the ranges; `<=` for long bias and
/// `>=` otherwise when none is configured.
pub fn resolve_operator(bias: Option<Bias>, ranges: &[Range]) -> RangeOperator {
    ranges
        .iter()
        .map(|r| r.operator)
        .find(|op| {
            matches!(
                op,
                RangeOperator::Gt | RangeOperator::Ge | RangeOperator::Lt | RangeOperator::Le
            )
        })
        .unwrap_or(match bias {
            Some(Bias::Long) => RangeOperator::Le,
            _ => RangeOperator::Ge,
        })
}

/// Per-timeframe values as of `at`, in the criterion's timeframe order.
pub fn resolve_values<'c>(
    history: &TimeframeIndex<'_>,
    timeframes: &'c [String],
    field: &str,
    at: chrono::NaiveDateTime,
) -> Vec<(&'c str, Option<f64>)> {
    timeframes
        .iter()
        .map(|tf| {
            let value = history.as_of(tf, at).and_then(|s| s.value(field));
            (tf.as_str(), value)
        })
        .collect()
}

pub fn agreement_count(values: &[(&str, Option<f64>)], spec: &AlignmentSpec) -> i64 {
    values
        .iter()
        .filter_map(|(_, v)| *v)
        .filter(|v| spec.operator.compare(*v, spec.threshold).unwrap_or(false))
        .count() as i64
}

/// Score one reference snapshot. Snapshots not on the major timeframe never
/// produce an alert.
pub fn evaluate(
    reference: &Snapshot,
    history: &TimeframeIndex<'_>,
    criterion: &Criterion,
    ranges: &[Range],
    spec: &AlignmentSpec,
) -> Option<Alert> {
    let major = criterion.major_timeframe()?;
    if reference.timeframe != major {
        return None;
    }

    let values = resolve_values(history, &criterion.timeframes, &spec.field, reference.timestamp);
    let count = agreement_count(&values, spec);
    let range = match_count(count, ranges)?;

    let detail = values
        .iter()
        .map(|(tf, v)| match v {
            Some(v) => format!("{tf}:{v:.4}"),
            None => format!("{tf}:None"),
        })
        .collect::<Vec<_>>()
        .join(";");

    let mut alert = Alert::from_match(reference, criterion, range, score(range, criterion), detail);
    alert.timeframe = major.to_string();
    alert.detail_2 = format!("umbral {} {:.4}", spec.operator, spec.threshold);
    alert.detail_3 = format!("aligned:{}/{}", count, values.len());
    Some(alert)
}

/// Walk every major-timeframe snapshot of one ticker. Empty when the major
/// timeframe has no data.
pub fn evaluate_series(
    history: &TimeframeIndex<'_>,
    criterion: &Criterion,
    ranges: &[Range],
    spec: &AlignmentSpec,
) -> Vec<Alert> {
    let Some(major) = criterion.major_timeframe() else {
        return Vec::new();
    };
    history
        .series(major)
        .iter()
        .filter_map(|reference| evaluate(reference, history, criterion, ranges, spec))
        .collect()
}
