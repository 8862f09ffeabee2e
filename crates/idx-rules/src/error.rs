//! Rule evaluation error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("Unknown field: {field}")]
    UnknownField { field: String },

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Incomparable operands for {field} {operator}: {left} vs {right}")]
    Incomparable {
        field: String,
        operator: String,
        left: String,
        right: String,
    },
}

pub type RuleResult<T> = Result<T, RuleError>;
