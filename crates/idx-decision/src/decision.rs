//! Entry decisions and rejection reasons.

use std::fmt;

use idx_core::{Direction, Price, RiskProfile};
use idx_risk::RiskGateResult;
use idx_scoring::{CategoryScoreResult, DirectionScore, ScenarioMiss};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why no entry was emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// A position is already open; entries are not evaluated.
    PositionOpen,
    MandatoryFilter {
        filters: Vec<String>,
    },
    RiskWeightExceeded {
        total: Decimal,
        ceiling: Decimal,
    },
    NoScenarioMatched {
        direction: Direction,
        misses: Vec<ScenarioMiss>,
    },
    /// Both directions matched; never choose between them.
    AmbiguousSignal {
        long_scenario: String,
        short_scenario: String,
    },
    EvaluationFailed {
        message: String,
    },
}

impl RejectReason {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PositionOpen => "position_open",
            Self::MandatoryFilter { .. } => "mandatory_filter",
            Self::RiskWeightExceeded { .. } => "risk_weight_exceeded",
            Self::NoScenarioMatched { .. } => "no_scenario_matched",
            Self::AmbiguousSignal { .. } => "ambiguous_signal",
            Self::EvaluationFailed { .. } => "evaluation_failed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PositionOpen => write!(f, "position already open"),
            Self::MandatoryFilter { filters } => {
                write!(f, "mandatory filter fired: {}", filters.join(", "))
            }
            Self::RiskWeightExceeded { total, ceiling } => {
                write!(f, "risk weight {total} exceeds ceiling {ceiling}")
            }
            Self::NoScenarioMatched { direction, misses } => {
                write!(f, "no {direction} scenario matched")?;
                if !misses.is_empty() {
                    let detail: Vec<String> = misses.iter().map(ToString::to_string).collect();
                    write!(f, " ({})", detail.join("; "))?;
                }
                Ok(())
            }
            Self::AmbiguousSignal {
                long_scenario,
                short_scenario,
            } => write!(
                f,
                "ambiguous: long {long_scenario} and short {short_scenario} both matched"
            ),
            Self::EvaluationFailed { message } => write!(f, "evaluation failed: {message}"),
        }
    }
}

/// Result of one entry attempt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDecision {
    pub instrument: String,
    pub timestamp_ms: u64,
    pub price: Price,
    /// `None` when no entry is made.
    pub direction: Option<Direction>,
    pub scenario: Option<String>,
    /// Quality mapped to `[0, 1]`.
    pub confidence: f64,
    pub quality: f64,
    pub scores: Vec<DirectionScore>,
    pub risk: Option<RiskGateResult>,
    pub reasoning: String,
    pub risk_profile: Option<RiskProfile>,
    pub rejections: Vec<RejectReason>,
    pub config_version: u64,
}

impl EntryDecision {
    /// Decision with no direction, for the given reasons.
    pub fn rejected(
        instrument: &str,
        timestamp_ms: u64,
        price: Price,
        config_version: u64,
        rejections: Vec<RejectReason>,
    ) -> Self {
        let reasoning = rejections
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            instrument: instrument.to_string(),
            timestamp_ms,
            price,
            direction: None,
            scenario: None,
            confidence: 0.0,
            quality: 0.0,
            scores: Vec::new(),
            risk: None,
            reasoning,
            risk_profile: None,
            rejections,
            config_version,
        }
    }

    /// True when a direction and profile were selected.
    pub fn is_actionable(&self) -> bool {
        self.direction.is_some() && self.risk_profile.is_some()
    }

    /// Category breakdown of the chosen direction, or of all directions when rejected.
    pub fn category_scores(&self) -> Vec<&CategoryScoreResult> {
        self.scores
            .iter()
            .filter(|s| self.direction.map_or(true, |d| s.direction == d))
            .flat_map(|s| s.categories.iter())
            .collect()
    }

    pub fn score_for(&self, direction: Direction) -> Option<&DirectionScore> {
        self.scores.iter().find(|s| s.direction == direction)
    }
}

/// Outcome of a strategy-reversal check for an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalCheck {
    pub triggered: bool,
    /// Direction whose scenarios were checked (opposite of the position).
    pub signal_direction: Direction,
    pub scenario: Option<String>,
    pub quality: f64,
}
