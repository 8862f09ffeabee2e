//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filter {filter} misconfigured: {reason}")]
    InvalidFilter { filter: String, reason: String },
}

pub type RiskResult<T> = Result<T, RiskError>;
