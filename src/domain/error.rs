//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for quantloop.
#[derive(Debug, thiserror::Error)]
pub enum QuantloopError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid configuration [{section}] {key}: {reason}")]
    InvalidConfiguration {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error("insufficient data for {instrument}: have {have} records, need {need}")]
    InsufficientData {
        instrument: String,
        have: usize,
        need: usize,
    },

    #[error("insufficient cash for {instrument}: required {required:.2}, available {available:.2}")]
    InsufficientCash {
        instrument: String,
        required: f64,
        available: f64,
    },

    #[error("no price for {instrument} at {timestamp}")]
    MissingPrice {
        instrument: String,
        timestamp: NaiveDateTime,
    },

    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantloopError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        QuantloopError::InvalidConfiguration {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Recoverable errors skip a step or reject a single order; everything
    /// else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QuantloopError::InsufficientData { .. }
                | QuantloopError::InsufficientCash { .. }
                | QuantloopError::MissingPrice { .. }
        )
    }
}

impl From<csv::Error> for QuantloopError {
    fn from(err: csv::Error) -> Self {
        QuantloopError::Data {
            reason: format!("CSV error: {err}"),
        }
    }
}

impl From<&QuantloopError> for std::process::ExitCode {
    fn from(err: &QuantloopError) -> Self {
        let code: u8 = match err {
            QuantloopError::Io(_) => 1,
            QuantloopError::ConfigParse { .. }
            | QuantloopError::ConfigMissing { .. }
            | QuantloopError::InvalidConfiguration { .. } => 2,
            QuantloopError::Data { .. } | QuantloopError::NoData { .. } => 3,
            QuantloopError::InsufficientData { .. }
            | QuantloopError::InsufficientCash { .. }
            | QuantloopError::MissingPrice { .. } => 4,
            QuantloopError::InvariantViolation { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
