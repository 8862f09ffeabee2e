//! Position error types.

use idx_core::PositionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Position {position_id} state corrupted: {reason}")]
    StateCorruption {
        position_id: PositionId,
        reason: String,
    },

    #[error("Position not found: {0}")]
    NotFound(PositionId),

    #[error("Position already exists: {0}")]
    Duplicate(PositionId),

    #[error("Invalid risk profile: {0}")]
    InvalidProfile(#[from] idx_core::CoreError),
}

pub type PositionResult<T> = Result<T, PositionError>;
