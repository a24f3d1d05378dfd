//! Error types for the improvement pipeline
//!
//! Input errors (malformed records, candidate rules that do not compile,
//! templates whose placeholders disagree with their body) are surfaced to the
//! caller. Evaluation errors are raised per record and are meant to be caught,
//! logged, and excluded by the experiment code.

use thiserror::Error;
use uuid::Uuid;

use crate::model::Recommendation;

#[derive(Debug, Error)]
pub enum TunerError {
    /// A record is missing a required field or carries an invalid value
    #[error("Invalid interaction record: field '{field}' {reason}")]
    InvalidRecord { field: String, reason: String },

    /// A candidate or control rule does not compile as a regular expression
    #[error("Invalid rule expression '{expression}': {message}")]
    InvalidPattern { expression: String, message: String },

    /// A response template violates the placeholder/body invariant
    #[error("Invalid response template for '{category}': {message}")]
    InvalidTemplate { category: String, message: String },

    /// Not enough records for the requested operation
    #[error("Insufficient data: need at least {required} records, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// A single record could not be evaluated against a rule
    #[error("Evaluation failed for record '{record_id}': {message}")]
    Evaluation { record_id: String, message: String },

    #[error("Experiment {0} not found")]
    ExperimentNotFound(Uuid),

    /// Publication requested for a comparison that did not recommend adoption
    #[error("Comparison recommends {0:?}; only adopted candidates can be published")]
    NotAdopted(Recommendation),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rule sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl TunerError {
    pub fn invalid_record(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord { field: field.into(), reason: reason.into() }
    }

    pub fn invalid_pattern(expression: impl Into<String>, err: &regex::Error) -> Self {
        Self::InvalidPattern { expression: expression.into(), message: err.to_string() }
    }

    /// True for the error class that must never be silently dropped
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRecord { .. } | Self::InvalidPattern { .. } | Self::InvalidTemplate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TunerError>;
