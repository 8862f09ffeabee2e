//! Exit events emitted by the position lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;
use crate::direction::PositionId;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// The initial configured stop was breached.
    StoplossHit,
    /// A stop that had trailed (breakeven or milestone) was breached.
    TrailingStoplossHit,
    /// The profit target was reached.
    TargetHit,
    /// The opposite-direction scenario matched while the position was open.
    StrategyReversal,
    /// Price reversed against the short moving average.
    Reversal,
    /// Price stayed neutral for too many consecutive updates.
    NeutralTimeout,
    /// Position state became inconsistent; closed for safety.
    StateError,
}

impl ExitReason {
    pub const ALL: [ExitReason; 7] = [
        ExitReason::StoplossHit,
        ExitReason::TrailingStoplossHit,
        ExitReason::TargetHit,
        ExitReason::StrategyReversal,
        ExitReason::Reversal,
        ExitReason::NeutralTimeout,
        ExitReason::StateError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoplossHit => "STOPLOSS_HIT",
            Self::TrailingStoplossHit => "TRAILING_STOPLOSS_HIT",
            Self::TargetHit => "TARGET_HIT",
            Self::StrategyReversal => "STRATEGY_REVERSAL",
            Self::Reversal => "REVERSAL",
            Self::NeutralTimeout => "NEUTRAL_TIMEOUT",
            Self::StateError => "STATE_ERROR",
        }
    }

    /// Stop-based exit (initial or trailing).
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::StoplossHit | Self::TrailingStoplossHit)
    }

    pub fn is_trailing_stop(&self) -> bool {
        matches!(self, Self::TrailingStoplossHit)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position closure, consumed by order-closing and notification collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub position_id: PositionId,
    pub reason: ExitReason,
    pub exit_price: Price,
    pub timestamp_ms: u64,
}

impl ExitEvent {
    pub fn new(
        position_id: PositionId,
        reason: ExitReason,
        exit_price: Price,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            position_id,
            reason,
            exit_price,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reason_wire_names() {
        for reason in ExitReason::ALL {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
    }

    #[test]
    fn test_stop_classification() {
        assert!(ExitReason::StoplossHit.is_stop());
        assert!(ExitReason::TrailingStoplossHit.is_stop());
        assert!(ExitReason::TrailingStoplossHit.is_trailing_stop());
        assert!(!ExitReason::TargetHit.is_stop());
        assert!(!ExitReason::StoplossHit.is_trailing_stop());
    }
}
