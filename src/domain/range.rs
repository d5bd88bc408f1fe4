//! Weighted outcome buckets attached to a criterion.

use std::fmt;

/// Bound test applied by a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOperator {
    Between,
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl RangeOperator {
    /// Direct comparison `left <op> right`. `Between` has no two-operand form.
    pub fn compare<T: PartialOrd>(self, left: T, right: T) -> Option<bool> {
        match self {
            RangeOperator::Gt => Some(left > right),
            RangeOperator::Ge => Some(left >= right),
            RangeOperator::Lt => Some(left < right),
            RangeOperator::Le => Some(left <= right),
            RangeOperator::Eq => Some(left == right),
            RangeOperator::Between => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RangeOperator::Between => "BETWEEN",
            RangeOperator::Gt => ">",
            RangeOperator::Ge => ">=",
            RangeOperator::Lt => "<",
            RangeOperator::Le => "<=",
            RangeOperator::Eq => "==",
        }
    }
}

impl fmt::Display for RangeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Directional classification of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Impact {
    Long,
    Short,
    Neutral,
}

impl Impact {
    pub fn parse(text: &str) -> Option<Impact> {
        match text.trim().to_uppercase().as_str() {
            "LONG" => Some(Impact::Long),
            "SHORT" => Some(Impact::Short),
            "NEUTRAL" => Some(Impact::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Impact::Long => "LONG",
            Impact::Short => "SHORT",
            Impact::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub id: i64,
    pub criterion_id: String,
    pub operator: RangeOperator,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub include_lower: bool,
    pub include_upper: bool,
    pub percentage: f64,
    pub impact: Impact,
    pub name: String,
}

impl Range {
    /// The bound used by single-sided operators: upper if present, else lower.
    pub fn single_bound(&self) -> Option<f64> {
        self.upper.or(self.lower)
    }
}
