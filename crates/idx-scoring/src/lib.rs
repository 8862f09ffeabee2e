//! Category and scenario scoring.
//!
//! Indicator values are grouped into named categories. Each category yields
//! a satisfied/required ratio, categories combine into a quality score, and
//! the result is matched against an ordered list of scenarios.

pub mod category;
pub mod error;
pub mod scenario;
pub mod scorer;

pub use category::{CategoryDefinition, CategoryScoreResult, IndicatorHit, IndicatorSpec};
pub use error::{ScoringError, ScoringResult};
pub use scenario::{MatchedScenario, MissReason, ScenarioDefinition, ScenarioMatch, ScenarioMiss};
pub use scorer::{quality_score, DirectionConfig, DirectionScore, ScenarioScorer};
