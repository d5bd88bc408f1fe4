//! Criterion catalog compilation.
//!
//! Raw catalog rows are translated into immutable [`CompiledCriterion`]s once
//! per run. Malformed rows never abort the run: they are skipped and reported
//! as [`CatalogIssue`]s.

use crate::domain::alert::Alert;
use crate::domain::criterion::{
    Bias, Criterion, CriterionType, DEFAULT_MAX_BASE_POINTS, Direction, parse_timeframes,
};
use crate::domain::error::AlertgenError;
use crate::domain::evaluator::CriterionRule;
use crate::domain::operator_table::OperatorTable;
use crate::domain::range::{Impact, Range, RangeOperator};
use crate::domain::snapshot::{Snapshot, TimeframeIndex};
use crate::ports::catalog_port::CatalogPort;

/// A criterion row as stored in the external catalog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CriterionRecord {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub parameters: String,
    pub max_base_points: Option<f64>,
    pub direction: Option<String>,
    pub active: bool,
    pub timeframes: Option<String>,
    pub bias: Option<String>,
}

/// A range row as stored in the external catalog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeRecord {
    pub id: i64,
    pub criterion_id: String,
    pub operator: Option<String>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub include_lower: Option<bool>,
    pub include_upper: Option<bool>,
    pub percentage: Option<f64>,
    pub impact: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogIssue {
    pub criterion_id: String,
    pub range_id: Option<i64>,
    pub reason: String,
    /// Formula text with a caret under the failing position.
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledCriterion {
    pub criterion: Criterion,
    pub ranges: Vec<Range>,
    pub rule: CriterionRule,
}

impl CompiledCriterion {
    pub fn compile(criterion: Criterion, ranges: Vec<Range>) -> Result<Self, AlertgenError> {
        let rule = CriterionRule::compile(&criterion, &ranges)?;
        Ok(Self {
            criterion,
            ranges,
            rule,
        })
    }

    pub fn evaluate(&self, snapshot: &Snapshot, history: &TimeframeIndex<'_>) -> Option<Alert> {
        self.rule
            .evaluate(snapshot, history, &self.criterion, &self.ranges)
    }

    pub fn is_multi_timeframe(&self) -> bool {
        self.criterion.kind.is_multi_timeframe()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub criteria: Vec<CompiledCriterion>,
    pub issues: Vec<CatalogIssue>,
}

impl Catalog {
    /// Fetch active criteria and their ranges through the port and compile them.
    pub fn load(port: &dyn CatalogPort, operators: &OperatorTable) -> Result<Self, AlertgenError> {
        let records = port.list_active_criteria()?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let ranges = port.list_ranges(&record.id)?;
            entries.push((record, ranges));
        }
        Ok(Self::compile(entries, operators))
    }

    pub fn compile(
        entries: Vec<(CriterionRecord, Vec<RangeRecord>)>,
        operators: &OperatorTable,
    ) -> Self {
        let mut catalog = Catalog::default();

        for (record, range_records) in entries {
            if !record.active {
                continue;
            }
            let criterion = match criterion_from_record(&record) {
                Ok(c) => c,
                Err(e) => {
                    catalog.report(&record.id, None, e.to_string());
                    continue;
                }
            };

            let mut ranges = Vec::with_capacity(range_records.len());
            for rr in &range_records {
                match range_from_record(rr, operators) {
                    Ok(range) => {
                        if range.operator == RangeOperator::Between
                            && (range.lower.is_none() || range.upper.is_none())
                        {
                            catalog.report(
                                &criterion.id,
                                Some(rr.id),
                                "BETWEEN range is missing a bound and will never match".into(),
                            );
                        }
                        ranges.push(range);
                    }
                    Err(e) => catalog.report(&criterion.id, Some(rr.id), e.to_string()),
                }
            }

            if ranges.is_empty() {
                tracing::debug!(
                    criterion_id = %criterion.id,
                    "criterion has no usable ranges, skipping"
                );
                continue;
            }

            let formula = match criterion.kind {
                CriterionType::DynamicFormula => criterion.parameter_list().get(1).cloned(),
                _ => None,
            };
            match CompiledCriterion::compile(criterion, ranges) {
                Ok(compiled) => catalog.criteria.push(compiled),
                Err(AlertgenError::FormulaParse(e)) => {
                    let context = formula.map(|f| e.display_with_context(&f));
                    catalog.report(&record.id, None, e.to_string());
                    if let Some(issue) = catalog.issues.last_mut() {
                        issue.context = context;
                    }
                }
                Err(e) => catalog.report(&record.id, None, e.to_string()),
            }
        }

        tracing::info!(
            compiled = catalog.criteria.len(),
            issues = catalog.issues.len(),
            "catalog compiled"
        );
        catalog
    }

    fn report(&mut self, criterion_id: &str, range_id: Option<i64>, reason: String) {
        tracing::warn!(criterion_id, range_id, %reason, "catalog entry skipped");
        self.issues.push(CatalogIssue {
            criterion_id: criterion_id.to_string(),
            range_id,
            reason,
            context: None,
        });
    }

    pub fn simple(&self) -> impl Iterator<Item = &CompiledCriterion> {
        self.criteria.iter().filter(|c| !c.is_multi_timeframe())
    }

    pub fn multi_timeframe(&self) -> impl Iterator<Item = &CompiledCriterion> {
        self.criteria.iter().filter(|c| c.is_multi_timeframe())
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

pub fn criterion_from_record(record: &CriterionRecord) -> Result<Criterion, AlertgenError> {
    let kind = CriterionType::parse(&record.kind).ok_or_else(|| {
        AlertgenError::criterion(&record.id, format!("unknown criterion type '{}'", record.kind))
    })?;

    let bias = match record.bias.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => Some(Bias::parse(text).ok_or_else(|| {
            AlertgenError::criterion(&record.id, format!("unknown bias '{}'", text))
        })?),
    };

    Ok(Criterion {
        id: record.id.clone(),
        name: record.name.clone(),
        kind,
        parameters: record.parameters.clone(),
        max_base_points: record.max_base_points.unwrap_or(DEFAULT_MAX_BASE_POINTS),
        direction: Direction::parse(record.direction.as_deref()),
        active: record.active,
        timeframes: record
            .timeframes
            .as_deref()
            .map(parse_timeframes)
            .unwrap_or_default(),
        bias,
    })
}

pub fn range_from_record(
    record: &RangeRecord,
    operators: &OperatorTable,
) -> Result<Range, AlertgenError> {
    let invalid = |reason: String| AlertgenError::RangeInvalid {
        range_id: record.id,
        reason,
    };

    let op_text = record
        .operator
        .as_deref()
        .ok_or_else(|| invalid("missing operator".into()))?;
    let operator = operators
        .resolve(op_text)
        .ok_or_else(|| invalid(format!("unknown operator '{}'", op_text)))?;

    let impact_text = record.impact.as_deref().unwrap_or("");
    let impact = Impact::parse(impact_text)
        .ok_or_else(|| invalid(format!("unknown impact '{}'", impact_text)))?;

    let percentage = record
        .percentage
        .filter(|p| p.is_finite())
        .ok_or_else(|| invalid("missing percentage".into()))?;

    Ok(Range {
        id: record.id,
        criterion_id: record.criterion_id.clone(),
        operator,
        lower: record.lower.filter(|v| v.is_finite()),
        upper: record.upper.filter(|v| v.is_finite()),
        include_lower: record.include_lower.unwrap_or(true),
        include_upper: record.include_upper.unwrap_or(true),
        percentage,
        impact,
        name: record.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion_record(id: &str, kind: &str, parameters: &str) -> CriterionRecord {
        CriterionRecord {
            id: id.into(),
            name: id.into(),
            kind: kind.into(),
            parameters: parameters.into(),
            active: true,
            ..Default::default()
        }
    }

    fn range_record(id: i64, criterion_id: &str, operator: &str) -> RangeRecord {
        RangeRecord {
            id,
            criterion_id: criterion_id.into(),
            operator: Some(operator.into()),
            lower: Some(0.0),
            upper: Some(30.0),
            percentage: Some(100.0),
            impact: Some("LONG".into()),
            name: format!("range {id}"),
            ..Default::default()
        }
    }

    #[test]
    fn record_defaults_applied() {
        let c = criterion_from_record(&criterion_record("c1", "indicador_vs_constante", "rsi_14"))
            .unwrap();
        assert_eq!(c.max_base_points, DEFAULT_MAX_BASE_POINTS);
        assert_eq!(c.direction, Direction::Desc);
        assert!(c.timeframes.is_empty());

        let r = range_from_record(&range_record(1, "c1", "between"), &OperatorTable::default())
            .unwrap();
        assert!(r.include_lower && r.include_upper);
        assert_eq!(r.operator, RangeOperator::Between);
    }

    #[test]
    fn unknown_type_is_reported_and_skipped() {
        let catalog = Catalog::compile(
            vec![
                (
                    criterion_record("bad", "astrology", "moon"),
                    vec![range_record(1, "bad", "between")],
                ),
                (
                    criterion_record("good", "constant_threshold", "rsi_14"),
                    vec![range_record(2, "good", "between")],
                ),
            ],
            &OperatorTable::default(),
        );
        assert_eq!(catalog.criteria.len(), 1);
        assert_eq!(catalog.criteria[0].criterion.id, "good");
        assert_eq!(catalog.issues.len(), 1);
        assert_eq!(catalog.issues[0].criterion_id, "bad");
    }

    #[test]
    fn bad_range_is_dropped_but_order_of_rest_preserved() {
        let mut unknown_op = range_record(2, "c", "like");
        unknown_op.upper = Some(99.0);
        let catalog = Catalog::compile(
            vec![(
                criterion_record("c", "constant_threshold", "rsi_14"),
                vec![
                    range_record(3, "c", ">"),
                    unknown_op,
                    range_record(1, "c", "between"),
                ],
            )],
            &OperatorTable::default(),
        );
        let ids: Vec<i64> = catalog.criteria[0].ranges.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(catalog.issues.len(), 1);
        assert_eq!(catalog.issues[0].range_id, Some(2));
    }

    #[test]
    fn missing_between_bound_is_kept_and_flagged() {
        let mut open_ended = range_record(5, "c", "between");
        open_ended.upper = None;
        let catalog = Catalog::compile(
            vec![(
                criterion_record("c", "constant_threshold", "rsi_14"),
                vec![open_ended],
            )],
            &OperatorTable::default(),
        );
        assert_eq!(catalog.criteria[0].ranges.len(), 1);
        assert_eq!(catalog.issues.len(), 1);
    }

    #[test]
    fn criterion_without_ranges_is_skipped_silently() {
        let catalog = Catalog::compile(
            vec![(criterion_record("c", "constant_threshold", "rsi_14"), vec![])],
            &OperatorTable::default(),
        );
        assert!(catalog.is_empty());
        assert!(catalog.issues.is_empty());
    }

    #[test]
    fn inactive_records_are_ignored() {
        let mut record = criterion_record("c", "constant_threshold", "rsi_14");
        record.active = false;
        let catalog = Catalog::compile(
            vec![(record, vec![range_record(1, "c", "between")])],
            &OperatorTable::default(),
        );
        assert!(catalog.is_empty());
    }

    #[test]
    fn formula_parse_failure_is_reported() {
        let catalog = Catalog::compile(
            vec![(
                criterion_record("dyn", "umbral_dinamico", "close;__import__('os')"),
                vec![range_record(1, "dyn", ">")],
            )],
            &OperatorTable::default(),
        );
        assert!(catalog.is_empty());
        assert!(catalog.issues[0].reason.contains("function calls are not allowed"));
        assert_eq!(
            catalog.issues[0].context.as_deref().unwrap().lines().nth(1),
            Some("^")
        );
    }

    #[test]
    fn formula_issue_points_at_failing_token() {
        let catalog = Catalog::compile(
            vec![(
                criterion_record("dyn", "dynamic_formula", "close; sma_20 + * 2"),
                vec![range_record(1, "dyn", ">")],
            )],
            &OperatorTable::default(),
        );
        let context = catalog.issues[0].context.as_deref().unwrap();
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(lines[0], "sma_20 + * 2");
        assert_eq!(lines[1], "         ^");
    }

    #[test]
    fn non_formula_issues_have_no_context() {
        let catalog = Catalog::compile(
            vec![(
                criterion_record("ratio", "indicator_ratio", "volume"),
                vec![range_record(1, "ratio", ">")],
            )],
            &OperatorTable::default(),
        );
        assert_eq!(catalog.issues.len(), 1);
        assert!(catalog.issues[0].context.is_none());
    }

    #[test]
    fn splits_simple_and_multi_timeframe() {
        let mut mtf = criterion_record("mtf_long", "multi_timeframe", "rsi_14");
        mtf.timeframes = Some("15m,1h,4h".into());
        let catalog = Catalog::compile(
            vec![
                (mtf, vec![range_record(1, "mtf_long", "between")]),
                (
                    criterion_record("c", "constant_threshold", "rsi_14"),
                    vec![range_record(2, "c", "between")],
                ),
            ],
            &OperatorTable::default(),
        );
        assert_eq!(catalog.simple().count(), 1);
        assert_eq!(catalog.multi_timeframe().count(), 1);
        let mtf = catalog.multi_timeframe().next().unwrap();
        assert_eq!(mtf.criterion.timeframes, vec!["15m", "1h", "4h"]);
    }

    #[test]
    fn unknown_impact_and_missing_percentage_are_invalid() {
        let mut r = range_record(1, "c", "between");
        r.impact = Some("sideways".into());
        assert!(range_from_record(&r, &OperatorTable::default()).is_err());

        let mut r = range_record(1, "c", "between");
        r.percentage = None;
        assert!(range_from_record(&r, &OperatorTable::default()).is_err());
    }
}
