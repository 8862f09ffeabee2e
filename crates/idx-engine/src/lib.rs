//! Index derivative entry/exit decision engine application.
//!
//! Wires the decision and position crates into a running service:
//! - `Engine`: snapshot publication, periodic evaluation, price routing
//! - `spawn_instrument_task`: cancellable per-instrument evaluation loop
//! - `ConfigWatcher`: strategy hot reload
//! - `run_replay`: JSON-lines replay driver

pub mod app;
pub mod config;
pub mod error;
pub mod replay;
pub mod watcher;

pub use app::{spawn_instrument_task, Engine, EngineEvent, EngineInput, SnapshotSlot};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use replay::{run_replay, ReplayStats};
pub use watcher::ConfigWatcher;
