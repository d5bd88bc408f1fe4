//! Criterion definitions as loaded from the catalog.

use std::fmt;

pub const DEFAULT_MAX_BASE_POINTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CriterionType {
    ConstantThreshold,
    IndicatorRatio,
    Ordering,
    DynamicFormula,
    MultiTimeframeThresholdCount,
}

impl CriterionType {
    /// Accepts the canonical tags and the legacy catalog tags.
    pub fn parse(tag: &str) -> Option<CriterionType> {
        match tag.trim().to_lowercase().as_str() {
            "constant_threshold" | "indicador_vs_constante" => {
                Some(CriterionType::ConstantThreshold)
            }
            "indicator_ratio" | "indicador_vs_indicador" => Some(CriterionType::IndicatorRatio),
            "ordering" | "orden_indicadores" => Some(CriterionType::Ordering),
            "dynamic_formula" | "umbral_dinamico" => Some(CriterionType::DynamicFormula),
            "multi_timeframe" | "multi_timeframe_threshold_count" => {
                Some(CriterionType::MultiTimeframeThresholdCount)
            }
            _ => None,
        }
    }

    pub fn is_multi_timeframe(self) -> bool {
        self == CriterionType::MultiTimeframeThresholdCount
    }
}

impl fmt::Display for CriterionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CriterionType::ConstantThreshold => "constant_threshold",
            CriterionType::IndicatorRatio => "indicator_ratio",
            CriterionType::Ordering => "ordering",
            CriterionType::DynamicFormula => "dynamic_formula",
            CriterionType::MultiTimeframeThresholdCount => "multi_timeframe",
        };
        f.write_str(s)
    }
}

/// Which adjacent-pair relation the ordering evaluator counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    /// Anything other than `asc` counts as `desc`.
    pub fn parse(text: Option<&str>) -> Direction {
        match text.map(|t| t.trim().to_lowercase()) {
            Some(t) if t == "asc" => Direction::Asc,
            _ => Direction::Desc,
        }
    }
}

/// Threshold aggregation direction for multi-timeframe criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Long,
    Short,
}

impl Bias {
    pub fn parse(text: &str) -> Option<Bias> {
        match text.trim().to_lowercase().as_str() {
            "long" => Some(Bias::Long),
            "short" => Some(Bias::Short),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub id: String,
    pub name: String,
    pub kind: CriterionType,
    pub parameters: String,
    pub max_base_points: f64,
    pub direction: Direction,
    pub active: bool,
    /// Ordered; the first entry is the major (reference) timeframe.
    pub timeframes: Vec<String>,
    pub bias: Option<Bias>,
}

impl Criterion {
    /// Parameter tokens split on `;`, trimmed.
    pub fn parameter_list(&self) -> Vec<String> {
        self.parameters
            .split(';')
            .map(|p| p.trim().to_string())
            .collect()
    }

    pub fn major_timeframe(&self) -> Option<&str> {
        self.timeframes.first().map(String::as_str)
    }

    /// Explicit bias if configured, otherwise inferred from the identifier.
    pub fn resolved_bias(&self) -> Option<Bias> {
        if self.bias.is_some() {
            return self.bias;
        }
        let id = self.id.to_lowercase();
        if id.contains("long") {
            Some(Bias::Long)
        } else if id.contains("short") {
            Some(Bias::Short)
        } else {
            None
        }
    }
}

/// Split a stored timeframe list (`"1h,4h,1d"` or `"1h;4h;1d"`).
pub fn parse_timeframes(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(|t| t.trim().trim_matches(|c| c == '{' || c == '}' || c == '"'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(id: &str) -> Criterion {
        Criterion {
            id: id.into(),
            name: "test".into(),
            kind: CriterionType::MultiTimeframeThresholdCount,
            parameters: "rsi_14".into(),
            max_base_points: DEFAULT_MAX_BASE_POINTS,
            direction: Direction::Desc,
            active: true,
            timeframes: vec!["1h".into(), "4h".into()],
            bias: None,
        }
    }

    #[test]
    fn parse_accepts_legacy_and_canonical_tags() {
        assert_eq!(
            CriterionType::parse("indicador_vs_constante"),
            Some(CriterionType::ConstantThreshold)
        );
        assert_eq!(
            CriterionType::parse("INDICATOR_RATIO"),
            Some(CriterionType::IndicatorRatio)
        );
        assert_eq!(
            CriterionType::parse("orden_indicadores"),
            Some(CriterionType::Ordering)
        );
        assert_eq!(
            CriterionType::parse("umbral_dinamico"),
            Some(CriterionType::DynamicFormula)
        );
        assert_eq!(
            CriterionType::parse("multi_timeframe"),
            Some(CriterionType::MultiTimeframeThresholdCount)
        );
        assert_eq!(CriterionType::parse("mystery"), None);
    }

    #[test]
    fn direction_defaults_to_desc() {
        assert_eq!(Direction::parse(None), Direction::Desc);
        assert_eq!(Direction::parse(Some("ASC")), Direction::Asc);
        assert_eq!(Direction::parse(Some("sideways")), Direction::Desc);
    }

    #[test]
    fn bias_inferred_from_identifier() {
        assert_eq!(criterion("mtf_rsi_long").resolved_bias(), Some(Bias::Long));
        assert_eq!(criterion("MTF_RSI_SHORT").resolved_bias(), Some(Bias::Short));
        assert_eq!(criterion("mtf_rsi").resolved_bias(), None);
    }

    #[test]
    fn explicit_bias_overrides_identifier() {
        let mut c = criterion("mtf_rsi_long");
        c.bias = Some(Bias::Short);
        assert_eq!(c.resolved_bias(), Some(Bias::Short));
    }

    #[test]
    fn parameter_list_trims_tokens() {
        let mut c = criterion("c");
        c.parameters = " ema_10 ; ema_20;ema_50 ".into();
        assert_eq!(c.parameter_list(), vec!["ema_10", "ema_20", "ema_50"]);
    }

    #[test]
    fn parse_timeframes_handles_separators() {
        assert_eq!(parse_timeframes("1h, 4h,1d"), vec!["1h", "4h", "1d"]);
        assert_eq!(parse_timeframes("{15m;1h}"), vec!["15m", "1h"]);
        assert!(parse_timeframes("").is_empty());
    }
}
