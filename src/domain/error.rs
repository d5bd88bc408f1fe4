//! Domain error types.

/// A parse error with position information for formula parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Runtime failure while evaluating a compiled formula against one snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("formula produced a non-finite value")]
    NonFinite,
}

/// Top-level error type for alertgen.
#[derive(Debug, thiserror::Error)]
pub enum AlertgenError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    FormulaParse(#[from] ParseError),

    #[error("invalid criterion {criterion_id}: {reason}")]
    CriterionInvalid {
        criterion_id: String,
        reason: String,
    },

    #[error("invalid range {range_id}: {reason}")]
    RangeInvalid { range_id: i64, reason: String },

    #[error("worker for {ticker} failed: {reason}")]
    Worker { ticker: String, reason: String },

    #[error("worker pool error: {reason}")]
    WorkerPool { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AlertgenError {
    pub fn criterion(criterion_id: &str, reason: impl Into<String>) -> Self {
        AlertgenError::CriterionInvalid {
            criterion_id: criterion_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&AlertgenError> for std::process::ExitCode {
    fn from(err: &AlertgenError) -> Self {
        let code: u8 = match err {
            AlertgenError::Io(_) => 1,
            AlertgenError::ConfigParse { .. }
            | AlertgenError::ConfigMissing { .. }
            | AlertgenError::ConfigInvalid { .. } => 2,
            AlertgenError::Database { .. } | AlertgenError::DatabaseQuery { .. } => 3,
            AlertgenError::FormulaParse(_)
            | AlertgenError::CriterionInvalid { .. }
            | AlertgenError::RangeInvalid { .. } => 4,
            AlertgenError::Worker { .. } | AlertgenError::WorkerPool { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
