//! End-to-end decision flow tests.
//!
//! Drives the engine through JSON-lines replay:
//! - risk gate mandatory/optional weighting
//! - milestone trailing stop exits
//! - contradictory signals and strategy reversals
//! - determinism and hot reload

mod common;

use common::{engine_for, price_line, replay, snapshot_line};
use idx_decision::StrategyConfig;
use idx_engine::AppConfig;

/// One always-on scenario per direction, gated on a single flag each.
const BASE_STRATEGY: &str = r#"
    version = 1

    [risk_gate]
    max_weight = 3

    [[long.categories]]
    name = "signal"
    indicators = [{ key = "go_long" }]

    [[long.scenarios]]
    name = "long_setup"
    risk_profile = "standard"
    category_minimums = { signal = 100 }

    [[short.categories]]
    name = "signal"
    indicators = [{ key = "go_short" }]

    [[short.scenarios]]
    name = "short_setup"
    risk_profile = "standard"
    category_minimums = { signal = 100 }

    [risk_profiles.standard]
    stop_distance = 20
    target_distance = 50

    [risk_profiles.standard.milestones]
    base_step = 10
    min_step = 2
    decreasing_count = 5

    [risk_profiles.standard.reversal]
    threshold_pct = 50.0
"#;

const GATED_FILTERS: &str = r#"
    [[risk_gate.filters]]
    name = "A"
    type = "rule"
    mandatory = true
    weight = 1
    rule = { conditions = [{ field = "a_fires", operator = "==", value = true }] }

    [[risk_gate.filters]]
    name = "B"
    type = "rule"
    weight = 2
    rule = { conditions = [{ field = "b_fires", operator = "==", value = true }] }
"#;

fn gated_strategy() -> String {
    format!("{BASE_STRATEGY}\n{GATED_FILTERS}")
}

// ============================================================================
// Risk gate
// ============================================================================

#[test]
fn test_mandatory_filter_alone_blocks_entry() {
    let engine = engine_for(&gated_strategy());
    let input = snapshot_line(1, "22537", &[("go_long", true), ("a_fires", true), ("b_fires", false)]);
    let (_, events) = replay(&engine, &input);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "rejected");
    assert_eq!(events[0]["data"]["rejections"][0]["reason"], "mandatory_filter");
    assert_eq!(events[0]["data"]["rejections"][0]["filters"][0], "A");
}

#[test]
fn test_optional_filter_within_ceiling_passes() {
    let engine = engine_for(&gated_strategy());
    let input = snapshot_line(1, "22537", &[("go_long", true), ("a_fires", false), ("b_fires", true)]);
    let (_, events) = replay(&engine, &input);

    assert_eq!(events[0]["type"], "entry");
    assert_eq!(events[0]["data"]["direction"], "long");
    assert_eq!(events[0]["data"]["scenario"], "long_setup");
    assert_eq!(events[0]["data"]["risk"]["fired"][0]["name"], "B");
}

#[test]
fn test_both_filters_block_entry() {
    let engine = engine_for(&gated_strategy());
    let input = snapshot_line(1, "22537", &[("go_long", true), ("a_fires", true), ("b_fires", true)]);
    let (_, events) = replay(&engine, &input);

    assert_eq!(events[0]["type"], "rejected");
    assert_eq!(events[0]["data"]["rejections"][0]["reason"], "mandatory_filter");
}

// ============================================================================
// Position lifecycle
// ============================================================================

#[test]
fn test_trailing_stop_after_milestone_two() {
    let engine = engine_for(BASE_STRATEGY);
    let input = [
        snapshot_line(1, "100", &[("go_long", true)]),
        price_line(2, "112"),
        price_line(3, "118"),
        price_line(4, "117"),
        price_line(5, "90"),
    ]
    .join("\n");
    let (stats, events) = replay(&engine, &input);

    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.prices, 4);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.exits, 1);

    assert_eq!(events[1]["type"], "exit");
    assert_eq!(events[1]["data"]["reason"], "TRAILING_STOPLOSS_HIT");
    assert_eq!(events[1]["data"]["exit_price"], "117");
    assert!(!engine.positions().has_open());
    assert_eq!(engine.metrics().milestones_hit_count(), 2);
}

#[test]
fn test_initial_stop_is_plain_stoploss() {
    let engine = engine_for(BASE_STRATEGY);
    let input = [
        snapshot_line(1, "100", &[("go_short", true)]),
        price_line(2, "105"),
        price_line(3, "121"),
    ]
    .join("\n");
    let (_, events) = replay(&engine, &input);

    assert_eq!(events[0]["data"]["direction"], "short");
    assert_eq!(events[1]["data"]["reason"], "STOPLOSS_HIT");
}

#[test]
fn test_strategy_reversal_exit() {
    let engine = engine_for(BASE_STRATEGY);
    let input = [
        snapshot_line(1, "100", &[("go_long", true)]),
        price_line(2, "103"),
        snapshot_line(3, "102", &[("go_short", true)]),
    ]
    .join("\n");
    let (_, events) = replay(&engine, &input);

    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["type"], "exit");
    assert_eq!(events[1]["data"]["reason"], "STRATEGY_REVERSAL");
    assert_eq!(events[1]["data"]["exit_price"], "102");
}

// ============================================================================
// Decision properties
// ============================================================================

#[test]
fn test_contradictory_signal_yields_no_decision() {
    let engine = engine_for(BASE_STRATEGY);
    let input = snapshot_line(1, "100", &[("go_long", true), ("go_short", true)]);
    let (_, events) = replay(&engine, &input);

    assert_eq!(events[0]["type"], "rejected");
    assert_eq!(events[0]["data"]["rejections"][0]["reason"], "ambiguous_signal");
    assert!(!engine.positions().has_open());
}

#[test]
fn test_replay_is_deterministic() {
    let input = [
        snapshot_line(1, "22537", &[("go_long", true), ("b_fires", true), ("a_fires", false)]),
        price_line(2, "22549"),
        snapshot_line(3, "22551", &[("go_long", true)]),
        price_line(4, "22510"),
        snapshot_line(5, "22512", &[("a_fires", true)]),
    ]
    .join("\n");

    let (_, first) = replay(&engine_for(&gated_strategy()), &input);
    let (_, second) = replay(&engine_for(&gated_strategy()), &input);

    // position ids are random; everything else must match exactly
    let strip = |events: Vec<serde_json::Value>| -> Vec<serde_json::Value> {
        events
            .into_iter()
            .map(|mut e| {
                if let Some(data) = e.get_mut("data").and_then(|d| d.as_object_mut()) {
                    data.remove("position_id");
                }
                e
            })
            .collect()
    };
    assert_eq!(strip(first), strip(second));
}

#[test]
fn test_malformed_lines_are_skipped() {
    let engine = engine_for(BASE_STRATEGY);
    let input = [
        "# header".to_string(),
        "{broken".to_string(),
        snapshot_line(1, "100", &[("go_long", true)]),
    ]
    .join("\n");
    let (stats, events) = replay(&engine, &input);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.entries, 1);
    assert_eq!(events.len(), 1);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_reload_applies_to_next_evaluation() {
    let engine = engine_for(BASE_STRATEGY);
    let (_, events) = replay(&engine, &snapshot_line(1, "100", &[("go_long", true), ("a_fires", true)]));
    assert_eq!(events[0]["type"], "entry");
    assert_eq!(events[0]["data"]["config_version"], 1);

    engine.positions().close(
        &engine.positions().open_directions()[0].0,
        idx_core::ExitReason::StrategyReversal,
        idx_core::Price::new(rust_decimal_macros::dec!(100)),
        2,
    )
    .unwrap();
    engine.positions().prune_closed();

    let gated = StrategyConfig::from_toml_str(&gated_strategy()).unwrap();
    assert_eq!(engine.store().install(gated).unwrap(), 2);

    let (_, events) = replay(&engine, &snapshot_line(3, "100", &[("go_long", true), ("a_fires", true)]));
    assert_eq!(events[0]["type"], "rejected");
    assert_eq!(events[0]["data"]["config_version"], 2);
}

#[test]
fn test_shipped_configuration_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/default.toml");
    let app = AppConfig::from_file(path).unwrap();
    let strategy = StrategyConfig::from_file(app.strategy_file()).unwrap();
    strategy.validate().unwrap();
    assert_eq!(strategy.long.scenarios.len(), 2);
    assert_eq!(strategy.risk_gate.filters.len(), 10);
}
