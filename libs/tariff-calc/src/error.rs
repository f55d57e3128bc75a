//! Error types for tariff-calc

use thiserror::Error;

/// Expression errors
///
/// Every failure of the tokenizer, parser or evaluator ends up here. Callers in
/// the audit path never propagate these; they log them and fall back to a zero
/// contribution for the offending step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    #[error("Expression nested deeper than {0} levels")]
    TooDeep(usize),
}

impl CalcError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    pub fn undefined_variable(name: impl Into<String>) -> Self {
        Self::UndefinedVariable(name.into())
    }

    pub fn unsupported_function(name: impl Into<String>) -> Self {
        Self::UnsupportedFunction(name.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn arithmetic(msg: impl Into<String>) -> Self {
        Self::Arithmetic(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
