//! Shared helpers for engine integration tests.

use std::sync::Arc;

use idx_decision::{ConfigStore, StrategyConfig};
use idx_engine::{run_replay, AppConfig, Engine, ReplayStats};
use idx_telemetry::Metrics;

/// Engine over an inline strategy with default application settings.
pub fn engine_for(strategy: &str) -> Engine {
    let config = StrategyConfig::from_toml_str(strategy).expect("strategy parses");
    let store = ConfigStore::new(config).expect("strategy is valid");
    Engine::new(
        &AppConfig::default(),
        Arc::new(store),
        Arc::new(Metrics::new().expect("metrics register")),
    )
}

/// Replay `input` and return the emitted JSON lines.
pub fn replay(engine: &Engine, input: &str) -> (ReplayStats, Vec<serde_json::Value>) {
    let mut output = Vec::new();
    let stats = run_replay(engine, input.as_bytes(), &mut output).expect("replay succeeds");
    let lines = String::from_utf8(output)
        .expect("utf-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    (stats, lines)
}

/// Snapshot input line for NIFTY at `price` with boolean indicator flags.
pub fn snapshot_line(ts: u64, price: &str, flags: &[(&str, bool)]) -> String {
    let values: serde_json::Map<String, serde_json::Value> = flags
        .iter()
        .map(|(key, value)| (key.to_string(), serde_json::Value::Bool(*value)))
        .collect();
    serde_json::json!({
        "type": "snapshot",
        "instrument": "NIFTY",
        "price": price,
        "timestamp_ms": ts,
        "values": values,
    })
    .to_string()
}

pub fn price_line(ts: u64, price: &str) -> String {
    serde_json::json!({ "type": "price", "price": price, "timestamp_ms": ts }).to_string()
}
