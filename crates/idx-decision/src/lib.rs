//! Entry and exit decisions.
//!
//! Orchestrates the risk gate and the scenario scorer:
//! - `DecisionEngine`: entry decisions and strategy-reversal checks
//! - `StrategyConfig`: versioned filters, categories, scenarios and risk profiles
//! - `ConfigStore`: atomic swap-the-pointer configuration reload

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;

pub use config::{ConfigStore, StrategyConfig};
pub use decision::{EntryDecision, RejectReason, ReversalCheck};
pub use engine::DecisionEngine;
pub use error::{DecisionError, DecisionResult};
