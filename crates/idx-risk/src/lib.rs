//! No-trade-zone risk gate.
//!
//! A weighted, composite set of independent filters deciding whether the
//! market is currently eligible for a new position:
//! - Session filters: trading hours, blackout windows
//! - Indicator filters: volume surge, RSI dead zone, moving-average distance,
//!   support/resistance proximity
//! - Candle filters: body ratio, consecutive doji run
//! - Price filters: round-number proximity
//! - Rule filters: arbitrary conditions over the snapshot
//!
//! Mandatory filters fail the gate outright; optional ones add weight that is
//! compared against a ceiling.

pub mod error;
pub mod filter;
pub mod gate;
pub mod window;

pub use error::{RiskError, RiskResult};
pub use filter::{validate_filters, FilterDefinition, FilterKind, FilterOutcome};
pub use gate::{FiredFilter, RiskGate, RiskGateConfig, RiskGateResult};
pub use window::{snapshot_local_time, TimeWindow};
