//! Converts a matched range into directional points.

use crate::domain::criterion::Criterion;
use crate::domain::range::{Impact, Range};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Points {
    pub long: f64,
    pub short: f64,
    pub neutral: f64,
}

impl Points {
    /// The non-zero bucket value, or 0.0 for neutral matches.
    pub fn assigned(&self) -> f64 {
        self.long + self.short + self.neutral
    }
}

/// `max_base_points * percentage / 100` into the impact's bucket.
///
/// Neutral matches are recorded with zero points in every bucket.
pub fn score(range: &Range, criterion: &Criterion) -> Points {
    let points = criterion.max_base_points * range.percentage / 100.0;
    match range.impact {
        Impact::Long => Points {
            long: points,
            ..Points::default()
        },
        Impact::Short => Points {
            short: points,
            ..Points::default()
        },
        Impact::Neutral => Points::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::criterion::{CriterionType, DEFAULT_MAX_BASE_POINTS, Direction};
    use crate::domain::range::RangeOperator;
    use approx::assert_relative_eq;

    fn criterion(max_base_points: f64) -> Criterion {
        Criterion {
            id: "c1".into(),
            name: "c1".into(),
            kind: CriterionType::ConstantThreshold,
            parameters: "rsi_14".into(),
            max_base_points,
            direction: Direction::Desc,
            active: true,
            timeframes: vec![],
            bias: None,
        }
    }

    fn range(percentage: f64, impact: Impact) -> Range {
        Range {
            id: 7,
            criterion_id: "c1".into(),
            operator: RangeOperator::Between,
            lower: Some(0.0),
            upper: Some(30.0),
            include_lower: true,
            include_upper: true,
            percentage,
            impact,
            name: "oversold".into(),
        }
    }

    #[test]
    fn long_half_points() {
        let p = score(&range(50.0, Impact::Long), &criterion(10.0));
        assert_eq!(p.long, 5.0);
        assert_eq!(p.short, 0.0);
        assert_eq!(p.neutral, 0.0);
    }

    #[test]
    fn short_half_points() {
        let p = score(&range(50.0, Impact::Short), &criterion(10.0));
        assert_eq!(p.long, 0.0);
        assert_eq!(p.short, 5.0);
        assert_eq!(p.neutral, 0.0);
    }

    #[test]
    fn neutral_is_always_zero() {
        for pct in [0.0, 25.0, 100.0, 250.0] {
            let p = score(&range(pct, Impact::Neutral), &criterion(10.0));
            assert_eq!(p, Points::default());
            assert_eq!(p.assigned(), 0.0);
        }
    }

    #[test]
    fn scales_with_max_base_points() {
        let p = score(&range(30.0, Impact::Long), &criterion(DEFAULT_MAX_BASE_POINTS * 2.5));
        assert_relative_eq!(p.long, 7.5);
        assert_relative_eq!(p.assigned(), 7.5);
    }
}
