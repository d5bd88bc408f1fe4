//! Criterion evaluation dispatch.
//!
//! Each criterion compiles once into a [`CriterionRule`]; evaluating a rule
//! against a snapshot yields at most one alert. Missing data and non-matches
//! resolve to `None` silently. Formula failures are logged and also yield
//! `None`.

use crate::domain::aligner;
use crate::domain::alert::Alert;
use crate::domain::criterion::{Criterion, CriterionType, Direction};
use crate::domain::error::AlertgenError;
use crate::domain::formula::Expr;
use crate::domain::formula_eval;
use crate::domain::formula_parser;
use crate::domain::range::{Range, RangeOperator};
use crate::domain::range_matcher::{match_count, match_value};
use crate::domain::scorer::score;
use crate::domain::snapshot::{Snapshot, TimeframeIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum CriterionRule {
    ConstantThreshold {
        field: String,
    },
    IndicatorRatio {
        numerator: String,
        denominator: String,
    },
    Ordering {
        fields: Vec<String>,
        direction: Direction,
    },
    DynamicFormula {
        field: String,
        formula: Expr,
    },
    MultiTimeframe(aligner::AlignmentSpec),
}

impl CriterionRule {
    /// Validate the parameter spec for the criterion's type and pre-compile
    /// whatever can be compiled ahead of evaluation.
    pub fn compile(criterion: &Criterion, ranges: &[Range]) -> Result<Self, AlertgenError> {
        let params = criterion.parameter_list();
        let id = criterion.id.as_str();

        match criterion.kind {
            CriterionType::ConstantThreshold => {
                let field = single_field(id, &params)?;
                Ok(CriterionRule::ConstantThreshold { field })
            }
            CriterionType::IndicatorRatio => match params.as_slice() {
                [a, b] if !a.is_empty() && !b.is_empty() => Ok(CriterionRule::IndicatorRatio {
                    numerator: a.clone(),
                    denominator: b.clone(),
                }),
                _ => Err(AlertgenError::criterion(
                    id,
                    format!(
                        "indicator ratio needs exactly two fields, got '{}'",
                        criterion.parameters
                    ),
                )),
            },
            CriterionType::Ordering => {
                if params.len() < 2 || params.iter().any(String::is_empty) {
                    return Err(AlertgenError::criterion(
                        id,
                        format!(
                            "ordering needs at least two fields, got '{}'",
                            criterion.parameters
                        ),
                    ));
                }
                Ok(CriterionRule::Ordering {
                    fields: params,
                    direction: criterion.direction,
                })
            }
            CriterionType::DynamicFormula => match params.as_slice() {
                [field, formula] if !field.is_empty() => {
                    let formula = formula_parser::parse(formula)?;
                    Ok(CriterionRule::DynamicFormula {
                        field: field.clone(),
                        formula,
                    })
                }
                _ => Err(AlertgenError::criterion(
                    id,
                    format!(
                        "dynamic formula needs 'field;formula', got '{}'",
                        criterion.parameters
                    ),
                )),
            },
            CriterionType::MultiTimeframeThresholdCount => {
                let field = single_field(id, &params)?;
                let spec = aligner::AlignmentSpec::resolve(criterion, ranges, field)?;
                Ok(CriterionRule::MultiTimeframe(spec))
            }
        }
    }

    pub fn evaluate(
        &self,
        snapshot: &Snapshot,
        history: &TimeframeIndex<'_>,
        criterion: &Criterion,
        ranges: &[Range],
    ) -> Option<Alert> {
        match self {
            CriterionRule::ConstantThreshold { field } => {
                evaluate_constant(snapshot, criterion, ranges, field)
            }
            CriterionRule::IndicatorRatio {
                numerator,
                denominator,
            } => evaluate_ratio(snapshot, criterion, ranges, numerator, denominator),
            CriterionRule::Ordering { fields, direction } => {
                evaluate_ordering(snapshot, criterion, ranges, fields, *direction)
            }
            CriterionRule::DynamicFormula { field, formula } => {
                evaluate_formula(snapshot, criterion, ranges, field, formula)
            }
            CriterionRule::MultiTimeframe(spec) => {
                aligner::evaluate(snapshot, history, criterion, ranges, spec)
            }
        }
    }
}

fn single_field(criterion_id: &str, params: &[String]) -> Result<String, AlertgenError> {
    match params {
        [field] if !field.is_empty() => Ok(field.clone()),
        _ => Err(AlertgenError::criterion(
            criterion_id,
            format!("expected a single field, got '{}'", params.join(";")),
        )),
    }
}

fn alert_for(
    snapshot: &Snapshot,
    criterion: &Criterion,
    range: &Range,
    detail: String,
) -> Alert {
    Alert::from_match(snapshot, criterion, range, score(range, criterion), detail)
}

pub fn evaluate_constant(
    snapshot: &Snapshot,
    criterion: &Criterion,
    ranges: &[Range],
    field: &str,
) -> Option<Alert> {
    let value = snapshot.value(field)?;
    let range = match_value(value, ranges)?;
    Some(alert_for(snapshot, criterion, range, format!("{field}:{value:.4}")))
}

/// `(numerator / denominator) * 100`; a zero denominator never matches.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator * 100.0)
    }
}

pub fn evaluate_ratio(
    snapshot: &Snapshot,
    criterion: &Criterion,
    ranges: &[Range],
    numerator: &str,
    denominator: &str,
) -> Option<Alert> {
    let a = snapshot.value(numerator)?;
    let b = snapshot.value(denominator)?;
    let result = ratio(a, b)?;
    let range = match_value(result, ranges)?;
    Some(alert_for(
        snapshot,
        criterion,
        range,
        format!("{numerator}:{a:.4}/{denominator}:{b:.4}"),
    ))
}

/// Adjacent pairs agreeing with `direction`: `desc` counts `v[i] > v[i+1]`,
/// `asc` counts `v[i] < v[i+1]`.
pub fn ordering_agreement(values: &[f64], direction: Direction) -> i64 {
    values
        .windows(2)
        .filter(|pair| match direction {
            Direction::Desc => pair[0] > pair[1],
            Direction::Asc => pair[0] < pair[1],
        })
        .count() as i64
}

pub fn evaluate_ordering(
    snapshot: &Snapshot,
    criterion: &Criterion,
    ranges: &[Range],
    fields: &[String],
    direction: Direction,
) -> Option<Alert> {
    let values = fields
        .iter()
        .map(|f| snapshot.value(f))
        .collect::<Option<Vec<f64>>>()?;
    let count = ordering_agreement(&values, direction);
    let range = match_count(count, ranges)?;
    let detail = fields
        .iter()
        .zip(&values)
        .map(|(f, v)| format!("{f}:{v:.4}"))
        .collect::<Vec<_>>()
        .join(";");
    Some(alert_for(snapshot, criterion, range, detail))
}

pub fn evaluate_formula(
    snapshot: &Snapshot,
    criterion: &Criterion,
    ranges: &[Range],
    field: &str,
    formula: &Expr,
) -> Option<Alert> {
    let value = snapshot.value(field)?;
    let threshold = match formula_eval::evaluate(formula, snapshot) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(
                criterion_id = %criterion.id,
                ticker = %snapshot.ticker,
                timestamp = %snapshot.timestamp,
                formula = %formula,
                error = %e,
                "dynamic threshold evaluation failed"
            );
            return None;
        }
    };

    let range = ranges.iter().find(|r| {
        r.operator != RangeOperator::Between
            && r.operator.compare(value, threshold).unwrap_or(false)
    })?;
    Some(alert_for(
        snapshot,
        criterion,
        range,
        format!("{field}:{value:.4}; umbral:{threshold:.4}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::criterion::DEFAULT_MAX_BASE_POINTS;
    use crate::domain::range::Impact;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(14, 35, 0)
            .unwrap()
    }

    fn criterion(kind: CriterionType, parameters: &str) -> Criterion {
        Criterion {
            id: "crit".into(),
            name: "crit".into(),
            kind,
            parameters: parameters.into(),
            max_base_points: DEFAULT_MAX_BASE_POINTS,
            direction: Direction::Desc,
            active: true,
            timeframes: vec![],
            bias: None,
        }
    }

    fn range(
        id: i64,
        op: RangeOperator,
        lo: Option<f64>,
        hi: Option<f64>,
        impact: Impact,
    ) -> Range {
        Range {
            id,
            criterion_id: "crit".into(),
            operator: op,
            lower: lo,
            upper: hi,
            include_lower: true,
            include_upper: true,
            percentage: 100.0,
            impact,
            name: format!("range {id}"),
        }
    }

    fn eval(c: &Criterion, ranges: &[Range], snapshot: &Snapshot) -> Option<Alert> {
        let rule = CriterionRule::compile(c, ranges).unwrap();
        let snapshots = [snapshot.clone()];
        let history = TimeframeIndex::build(&snapshots);
        rule.evaluate(snapshot, &history, c, ranges)
    }

    mod constant_threshold {
        use super::*;

        #[test]
        fn matches_and_formats_detail() {
            let c = criterion(CriterionType::ConstantThreshold, "rsi_14");
            let ranges = [range(1, RangeOperator::Between, Some(0.0), Some(30.0), Impact::Long)];
            let s = Snapshot::new("BTCUSDT", "5m", ts()).with_field("rsi_14", 27.123456);

            let alert = eval(&c, &ranges, &s).unwrap();
            assert_eq!(alert.detail_1, "rsi_14:27.1235");
            assert_eq!(alert.points_long, 10.0);
            assert_eq!(alert.range_id, 1);
            assert_eq!(alert.timeframe, "5m");
        }

        #[test]
        fn missing_value_yields_none() {
            let c = criterion(CriterionType::ConstantThreshold, "rsi_14");
            let ranges = [range(1, RangeOperator::Between, Some(0.0), Some(30.0), Impact::Long)];
            let s = Snapshot::new("BTCUSDT", "5m", ts()).with_field("macd", 1.0);
            assert!(eval(&c, &ranges, &s).is_none());
        }

        #[test]
        fn compile_rejects_multiple_fields() {
            let c = criterion(CriterionType::ConstantThreshold, "rsi_14;rsi_7");
            assert!(CriterionRule::compile(&c, &[]).is_err());
        }
    }

    mod indicator_ratio {
        use super::*;

        #[test]
        fn ratio_is_percentage() {
            assert_eq!(ratio(50.0, 200.0), Some(25.0));
            assert_eq!(ratio(1.0, 0.0), None);
        }

        #[test]
        fn matches_on_ratio() {
            let c = criterion(CriterionType::IndicatorRatio, "volume;volume_sma_20");
            let ranges = [range(4, RangeOperator::Between, Some(20.0), Some(30.0), Impact::Short)];
            let s = Snapshot::new("BTCUSDT", "5m", ts())
                .with_field("volume", 50.0)
                .with_field("volume_sma_20", 200.0);

            let alert = eval(&c, &ranges, &s).unwrap();
            assert_eq!(alert.detail_1, "volume:50.0000/volume_sma_20:200.0000");
            assert_eq!(alert.points_short, 10.0);
            assert_eq!(alert.points_long, 0.0);
        }

        #[test]
        fn zero_denominator_yields_none() {
            let c = criterion(CriterionType::IndicatorRatio, "a;b");
            let ranges = [range(4, RangeOperator::Gt, None, Some(-1e9), Impact::Short)];
            let s = Snapshot::new("BTCUSDT", "5m", ts())
                .with_field("a", 50.0)
                .with_field("b", 0.0);
            assert!(eval(&c, &ranges, &s).is_none());
        }

        #[test]
        fn compile_rejects_wrong_field_count() {
            let c = criterion(CriterionType::IndicatorRatio, "a;b;c");
            assert!(CriterionRule::compile(&c, &[]).is_err());
            let c = criterion(CriterionType::IndicatorRatio, "a");
            assert!(CriterionRule::compile(&c, &[]).is_err());
        }
    }

    mod ordering {
        use super::*;

        #[test]
        fn agreement_counts() {
            let values = [30.0, 20.0, 10.0];
            assert_eq!(ordering_agreement(&values, Direction::Desc), 2);
            assert_eq!(ordering_agreement(&values, Direction::Asc), 0);
            assert_eq!(ordering_agreement(&[1.0, 1.0], Direction::Desc), 0);
        }

        #[test]
        fn full_alignment_scores_detail_for_every_field() {
            let c = criterion(CriterionType::Ordering, "ema_10;ema_20;ema_50");
            let ranges = [
                range(1, RangeOperator::Between, Some(2.0), Some(2.0), Impact::Long),
                range(2, RangeOperator::Between, Some(0.0), Some(1.0), Impact::Neutral),
            ];
            let s = Snapshot::new("BTCUSDT", "1h", ts())
                .with_field("ema_10", 30.0)
                .with_field("ema_20", 20.0)
                .with_field("ema_50", 10.0);

            let alert = eval(&c, &ranges, &s).unwrap();
            assert_eq!(alert.range_id, 1);
            assert_eq!(alert.detail_1, "ema_10:30.0000;ema_20:20.0000;ema_50:10.0000");
        }

        #[test]
        fn asc_direction_on_descending_data_hits_zero_bucket() {
            let mut c = criterion(CriterionType::Ordering, "ema_10;ema_20;ema_50");
            c.direction = Direction::Asc;
            let ranges = [
                range(1, RangeOperator::Between, Some(2.0), Some(2.0), Impact::Short),
                range(2, RangeOperator::Eq, Some(0.0), None, Impact::Neutral),
            ];
            let s = Snapshot::new("BTCUSDT", "1h", ts())
                .with_field("ema_10", 30.0)
                .with_field("ema_20", 20.0)
                .with_field("ema_50", 10.0);

            let alert = eval(&c, &ranges, &s).unwrap();
            assert_eq!(alert.range_id, 2);
            assert_eq!(alert.points_long + alert.points_short + alert.points_neutral, 0.0);
        }

        #[test]
        fn any_missing_field_yields_none() {
            let c = criterion(CriterionType::Ordering, "ema_10;ema_20;ema_50");
            let ranges = [range(1, RangeOperator::Between, Some(0.0), Some(2.0), Impact::Long)];
            let s = Snapshot::new("BTCUSDT", "1h", ts())
                .with_field("ema_10", 30.0)
                .with_field("ema_50", 10.0);
            assert!(eval(&c, &ranges, &s).is_none());
        }

        #[test]
        fn compile_needs_two_fields() {
            let c = criterion(CriterionType::Ordering, "ema_10");
            assert!(CriterionRule::compile(&c, &[]).is_err());
        }
    }

    mod dynamic_formula {
        use super::*;

        #[test]
        fn compares_field_against_computed_threshold() {
            let c = criterion(CriterionType::DynamicFormula, "close; sma_20 + atr_14 * 2");
            let ranges = [
                range(1, RangeOperator::Between, Some(0.0), Some(1e9), Impact::Neutral),
                range(2, RangeOperator::Gt, None, None, Impact::Long),
            ];
            let s = Snapshot::new("BTCUSDT", "5m", ts())
                .with_field("close", 106.0)
                .with_field("sma_20", 100.0)
                .with_field("atr_14", 2.5);

            let alert = eval(&c, &ranges, &s).unwrap();
            assert_eq!(alert.range_id, 2);
            assert_eq!(alert.detail_1, "close:106.0000; umbral:105.0000");
        }

        #[test]
        fn no_operator_match_yields_none() {
            let c = criterion(CriterionType::DynamicFormula, "close;sma_20");
            let ranges = [range(1, RangeOperator::Lt, None, None, Impact::Short)];
            let s = Snapshot::new("BTCUSDT", "5m", ts())
                .with_field("close", 106.0)
                .with_field("sma_20", 100.0);
            assert!(eval(&c, &ranges, &s).is_none());
        }

        #[test]
        fn runtime_failure_yields_none() {
            let c = criterion(CriterionType::DynamicFormula, "close;sma_200 * 1.02");
            let ranges = [range(1, RangeOperator::Gt, None, None, Impact::Long)];
            let s = Snapshot::new("BTCUSDT", "5m", ts()).with_field("close", 106.0);
            assert!(eval(&c, &ranges, &s).is_none());
        }

        #[test]
        fn compile_rejects_bad_formula() {
            let c = criterion(CriterionType::DynamicFormula, "close;open(1)");
            let err = CriterionRule::compile(&c, &[]).unwrap_err();
            assert!(matches!(err, AlertgenError::FormulaParse(_)));
        }

        #[test]
        fn compile_rejects_deeply_nested_formula() {
            let nested = format!("close;{}1{}", "(".repeat(3000), ")".repeat(3000));
            let c = criterion(CriterionType::DynamicFormula, &nested);
            let err = CriterionRule::compile(&c, &[]).unwrap_err();
            assert!(matches!(err, AlertgenError::FormulaParse(_)));
        }

        #[test]
        fn compile_rejects_missing_formula() {
            let c = criterion(CriterionType::DynamicFormula, "close");
            assert!(CriterionRule::compile(&c, &[]).is_err());
        }
    }
}
