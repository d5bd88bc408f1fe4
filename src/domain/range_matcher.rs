//! First-match range lookup.
//!
//! Ranges are tried in their stored order and the first one whose bound test
//! succeeds wins. A range with missing bound data never matches.

use crate::domain::range::{Range, RangeOperator};

/// Match a continuous value, comparing as `f64`.
pub fn match_value(value: f64, ranges: &[Range]) -> Option<&Range> {
    ranges.iter().find(|r| value_matches(value, r))
}

/// Match an integer count. Bounds are truncated toward zero first.
pub fn match_count(count: i64, ranges: &[Range]) -> Option<&Range> {
    ranges.iter().find(|r| count_matches(count, r))
}

pub fn value_matches(value: f64, range: &Range) -> bool {
    if value.is_nan() {
        return false;
    }
    match range.operator {
        RangeOperator::Between => match (range.lower, range.upper) {
            (Some(lo), Some(hi)) => {
                within(value, lo, hi, range.include_lower, range.include_upper)
            }
            _ => false,
        },
        op => range
            .single_bound()
            .and_then(|bound| op.compare(value, bound))
            .unwrap_or(false),
    }
}

pub fn count_matches(count: i64, range: &Range) -> bool {
    let truncate = |b: f64| if b.is_finite() { Some(b.trunc() as i64) } else { None };
    match range.operator {
        RangeOperator::Between => match (
            range.lower.and_then(truncate),
            range.upper.and_then(truncate),
        ) {
            (Some(lo), Some(hi)) => {
                within(count, lo, hi, range.include_lower, range.include_upper)
            }
            _ => false,
        },
        op => range
            .single_bound()
            .and_then(truncate)
            .and_then(|bound| op.compare(count, bound))
            .unwrap_or(false),
    }
}

fn within<T: PartialOrd>(value: T, lo: T, hi: T, include_lower: bool, include_upper: bool) -> bool {
    let above = if include_lower { value >= lo } else { value > lo };
    let below = if include_upper { value <= hi } else { value < hi };
    above && below
}
