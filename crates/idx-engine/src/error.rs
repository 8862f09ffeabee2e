//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decision error: {0}")]
    Decision(#[from] idx_decision::DecisionError),

    #[error("Position error: {0}")]
    Position(#[from] idx_position::PositionError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] idx_telemetry::TelemetryError),

    #[error("Malformed input at line {line}: {source}")]
    Input {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
