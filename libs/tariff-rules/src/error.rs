//! Rule store error types

use thiserror::Error;

/// Result type for rule store operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Rule store errors
///
/// Only loading can fail. Auditing never returns an error: missing tariffs
/// become SKIPPED results and bad steps contribute nothing.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Tariff document is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tariff document does not exist
    #[error("Tariff document not found: {0}")]
    ConfigNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        RuleError::Serialization(err.to_string())
    }
}
