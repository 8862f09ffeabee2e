//! Position lifecycle management.
//!
//! - `ManagedPosition`: per-position state machine with milestone trailing stops
//! - `MilestoneLadder`: decreasing-step profit checkpoints
//! - `PriceReversalDetector`: moving-average reversal and neutral-timeout signals
//! - `PositionBook`: concurrent registry routing price updates to positions

pub mod book;
pub mod error;
pub mod lifecycle;
pub mod milestone;
pub mod reversal;

pub use book::{PositionBook, PriceSweep};
pub use error::{PositionError, PositionResult};
pub use lifecycle::{ManagedPosition, PositionState, PositionSummary, StopSource, UpdateOutcome};
pub use milestone::{Milestone, MilestoneLadder};
pub use reversal::{PriceClass, PriceReversalDetector, ReversalObservation, ReversalSignal};
