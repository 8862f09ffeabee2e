//! Core domain types for the index derivative decision engine.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Price`, `Quantity`: Precision-safe numeric types
//! - `Direction`, `PositionId`: Trade direction and position identity
//! - `IndicatorSnapshot`, `PriceUpdate`: Inputs produced by the indicator pipeline
//! - `ExitReason`, `ExitEvent`: Position closure outputs
//! - `RiskProfile`: Stop/target/milestone parameters applied to a position

pub mod decimal;
pub mod direction;
pub mod error;
pub mod event;
pub mod profile;
pub mod snapshot;

pub use decimal::{Price, Quantity};
pub use direction::{Direction, PositionId};
pub use error::{CoreError, Result};
pub use event::{ExitEvent, ExitReason};
pub use profile::{MilestoneSchedule, ReversalConfig, RiskProfile};
pub use snapshot::{decimal_to_f64, CandleSummary, IndicatorSnapshot, IndicatorValue, PriceUpdate};
