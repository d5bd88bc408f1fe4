//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::{Storage, open_storage};
use crate::domain::catalog::Catalog;
use crate::domain::config_validation::{
    operator_table, validate_logging_config, validate_run_config,
};
use crate::domain::error::AlertgenError;
use crate::domain::orchestrator::{self, RunConfig, RunSummary};
use crate::logging::init_logging;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "alertgen", about = "Criteria evaluation and alert scoring engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate every active criterion over the configured window
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [run] start
        #[arg(long)]
        start: Option<String>,
        /// Overrides [run] end
        #[arg(long)]
        end: Option<String>,
        #[arg(short, long)]
        workers: Option<usize>,
        /// Restrict to these tickers (repeatable)
        #[arg(short, long = "ticker")]
        tickers: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Compile the criterion catalog and report malformed entries
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the SQLite tables
    InitSchema {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the compiled criteria
    ListCriteria {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            start,
            end,
            workers,
            tickers,
            dry_run,
        } => run_alerts(&config, start, end, workers, tickers, dry_run),
        Command::Validate { config } => run_validate(&config),
        Command::InitSchema { config } => run_init_schema(&config),
        Command::ListCriteria { config } => run_list_criteria(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = AlertgenError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: AlertgenError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

/// Load the config file and install logging from its `[logging]` section.
fn prepare(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    let config = load_config(path)?;
    let settings = validate_logging_config(&config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    init_logging(&settings);
    Ok(config)
}

/// Config overrides layered on `[run]`: command-line values win.
struct Overrides<'a> {
    base: &'a dyn ConfigPort,
    start: Option<String>,
    end: Option<String>,
}

impl ConfigPort for Overrides<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match (section, key) {
            ("run", "start") if self.start.is_some() => self.start.clone(),
            ("run", "end") if self.end.is_some() => self.end.clone(),
            _ => self.base.get_string(section, key),
        }
    }
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.base.get_int(section, key, default)
    }
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.base.get_double(section, key, default)
    }
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.base.get_bool(section, key, default)
    }
    fn section_entries(&self, section: &str) -> Vec<(String, String)> {
        self.base.section_entries(section)
    }
}

pub fn build_run_config(
    config: &dyn ConfigPort,
    start: Option<String>,
    end: Option<String>,
    workers: Option<usize>,
    tickers: Vec<String>,
    dry_run: bool,
) -> Result<RunConfig, AlertgenError> {
    let layered = Overrides {
        base: config,
        start,
        end,
    };
    let mut run = validate_run_config(&layered)?;

    if let Some(w) = workers {
        if w == 0 {
            return Err(AlertgenError::ConfigInvalid {
                section: "run".into(),
                key: "workers".into(),
                reason: "workers must be at least 1".into(),
            });
        }
        run.workers = w;
    }
    if !tickers.is_empty() {
        run.tickers = Some(tickers);
    }
    run.dry_run |= dry_run;
    Ok(run)
}

fn run_alerts(
    config_path: &PathBuf,
    start: Option<String>,
    end: Option<String>,
    workers: Option<usize>,
    tickers: Vec<String>,
    dry_run: bool,
) -> ExitCode {
    let config = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let run_config = match build_run_config(&config, start, end, workers, tickers, dry_run) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    let operators = match operator_table(&config) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    let storage = match open_storage(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    tracing::info!(
        start = %run_config.start,
        end = %run_config.end,
        workers = run_config.workers,
        dry_run = run_config.dry_run,
        "run starting"
    );

    let summary = match orchestrator::run(
        storage.catalog(),
        storage.snapshots(),
        storage.sink(),
        &operators,
        &run_config,
    ) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    print_summary(&summary, run_config.dry_run);
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(5)
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!("{:<16} {:>8} {:>8} {:>6}", "TICKER", "ALERTS", "STORED", "DAYS");
    for report in &summary.completed {
        println!(
            "{:<16} {:>8} {:>8} {:>6}",
            report.ticker, report.alerts, report.stored, report.days
        );
    }
    for failure in &summary.failed {
        println!("{:<16} FAILED: {}", failure.ticker, failure.error);
    }
    println!(
        "{} tickers, {} alerts, {} stored{}",
        summary.completed.len() + summary.failed.len(),
        summary.total_alerts(),
        summary.total_stored(),
        if dry_run { " (dry run)" } else { "" }
    );
}

fn load_catalog(config: &FileConfigAdapter) -> Result<(Box<dyn Storage>, Catalog), AlertgenError> {
    let operators = operator_table(config)?;
    let storage = open_storage(config)?;
    let catalog = Catalog::load(storage.catalog(), &operators)?;
    Ok((storage, catalog))
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let config = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_run_config(&config) {
        return fail(e);
    }

    let (_storage, catalog) = match load_catalog(&config) {
        Ok(loaded) => loaded,
        Err(e) => return fail(e),
    };

    for issue in &catalog.issues {
        match issue.range_id {
            Some(range_id) => println!(
                "criterion {} range {}: {}",
                issue.criterion_id, range_id, issue.reason
            ),
            None => println!("criterion {}: {}", issue.criterion_id, issue.reason),
        }
        if let Some(context) = &issue.context {
            for line in context.lines() {
                println!("    {line}");
            }
        }
    }
    println!(
        "{} criteria compiled, {} issues",
        catalog.criteria.len(),
        catalog.issues.len()
    );

    if catalog.issues.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(4)
    }
}

fn run_init_schema(config_path: &PathBuf) -> ExitCode {
    let config = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let result = SqliteAdapter::from_config(&config).and_then(|a| a.initialize_schema());
        match result {
            Ok(()) => {
                println!("schema initialized");
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        eprintln!("error: sqlite feature is required for init-schema");
        ExitCode::from(1)
    }
}

fn run_list_criteria(config_path: &PathBuf) -> ExitCode {
    let config = match prepare(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let (_storage, catalog) = match load_catalog(&config) {
        Ok(loaded) => loaded,
        Err(e) => return fail(e),
    };

    println!(
        "{:<24} {:<20} {:>6} {:>8}  {}",
        "ID", "TYPE", "RANGES", "MAX_PTS", "PARAMETERS"
    );
    for compiled in &catalog.criteria {
        let c = &compiled.criterion;
        let parameters = if c.kind.is_multi_timeframe() {
            format!("{} @ {}", c.parameters, c.timeframes.join(","))
        } else {
            c.parameters.clone()
        };
        println!(
            "{:<24} {:<20} {:>6} {:>8.2}  {}",
            c.id,
            c.kind.to_string(),
            compiled.ranges.len(),
            c.max_base_points,
            parameters
        );
    }
    ExitCode::SUCCESS
}
