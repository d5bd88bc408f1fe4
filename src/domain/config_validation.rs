//! Configuration validation.
//!
//! Validates the `[run]` and `[logging]` sections before any storage is
//! touched, and turns them into typed settings.

use crate::domain::error::AlertgenError;
use crate::domain::operator_table::OperatorTable;
use crate::domain::orchestrator::{DEFAULT_WORKERS, RunConfig};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveDateTime};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

pub fn validate_run_config(config: &dyn ConfigPort) -> Result<RunConfig, AlertgenError> {
    let start = parse_bound(config.get_string("run", "start").as_deref(), "start", false)?;
    let end = parse_bound(config.get_string("run", "end").as_deref(), "end", true)?;

    if start > end {
        return Err(AlertgenError::ConfigInvalid {
            section: "run".to_string(),
            key: "start".to_string(),
            reason: "start must not be after end".to_string(),
        });
    }

    let workers = config.get_int("run", "workers", DEFAULT_WORKERS as i64);
    if workers < 1 {
        return Err(AlertgenError::ConfigInvalid {
            section: "run".to_string(),
            key: "workers".to_string(),
            reason: "workers must be at least 1".to_string(),
        });
    }

    let tickers = config
        .get_string("run", "tickers")
        .map(|s| {
            s.split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty());

    Ok(RunConfig {
        start,
        end,
        workers: workers as usize,
        dry_run: config.get_bool("run", "dry_run", false),
        tickers,
    })
}

pub fn validate_logging_config(config: &dyn ConfigPort) -> Result<LoggingSettings, AlertgenError> {
    let level = config
        .get_string("logging", "level")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());

    let format = match config.get_string("logging", "format").as_deref().map(str::trim) {
        None | Some("") | Some("pretty") => LogFormat::Pretty,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(AlertgenError::ConfigInvalid {
                section: "logging".to_string(),
                key: "format".to_string(),
                reason: format!("unknown format '{other}', expected pretty or json"),
            });
        }
    };

    Ok(LoggingSettings { level, format })
}

/// Built-in operators extended with the `[operators]` alias section.
pub fn operator_table(config: &dyn ConfigPort) -> Result<OperatorTable, AlertgenError> {
    OperatorTable::default().with_aliases(config.section_entries("operators"))
}

/// A bare date is widened to the start of day for `start` and the last second
/// of the day for `end`.
fn parse_bound(
    value: Option<&str>,
    field: &str,
    end_of_day: bool,
) -> Result<NaiveDateTime, AlertgenError> {
    let Some(s) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(AlertgenError::ConfigMissing {
            section: "run".to_string(),
            key: field.to_string(),
        });
    };

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
        return Ok(dt);
    }

    let invalid = || AlertgenError::ConfigInvalid {
        section: "run".to_string(),
        key: field.to_string(),
        reason: format!("invalid {field} format, expected YYYY-MM-DD[ HH:MM:SS]"),
    };

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.ok_or_else(invalid)
}
