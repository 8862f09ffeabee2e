//! Observability for the index decision engine.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics owned by an injected `Metrics` instance
//! - Session summary output at shutdown

pub mod error;
pub mod logging;
pub mod metrics;
pub mod summary;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use summary::SessionSummary;
