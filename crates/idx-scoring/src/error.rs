//! Scoring error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Category {category} misconfigured: {reason}")]
    InvalidCategory { category: String, reason: String },

    #[error("Scenario {scenario} misconfigured: {reason}")]
    InvalidScenario { scenario: String, reason: String },
}

pub type ScoringResult<T> = Result<T, ScoringError>;
