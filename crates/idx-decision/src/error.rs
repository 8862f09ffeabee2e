//! Decision error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Risk configuration error: {0}")]
    Risk(#[from] idx_risk::RiskError),

    #[error("Scoring configuration error: {0}")]
    Scoring(#[from] idx_scoring::ScoringError),

    #[error("Risk profile {profile} invalid: {source}")]
    Profile {
        profile: String,
        #[source]
        source: idx_core::CoreError,
    },

    #[error("Ambiguous signal: long {long_scenario} and short {short_scenario} both matched")]
    Ambiguous {
        long_scenario: String,
        short_scenario: String,
    },

    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

pub type DecisionResult<T> = Result<T, DecisionError>;
