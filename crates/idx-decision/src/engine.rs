//! Decision engine.
//!
//! Runs the risk gate and the scenario scorer for both directions and turns
//! the outcome into one `EntryDecision`. For open positions it runs the
//! opposite direction's scenarios as a strategy-reversal exit check.
//!
//! Evaluation never fails outward: internal errors degrade to a rejected
//! decision carrying the reason.

use std::sync::Arc;

use idx_core::{Direction, IndicatorSnapshot};
use idx_risk::{RiskGate, RiskGateResult};
use idx_scoring::{DirectionScore, MatchedScenario, ScenarioMatch, ScenarioScorer};
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, StrategyConfig};
use crate::decision::{EntryDecision, RejectReason, ReversalCheck};
use crate::error::{DecisionError, DecisionResult};

/// Entry and strategy-reversal decisions against the active configuration.
pub struct DecisionEngine {
    store: Arc<ConfigStore>,
    gate: RiskGate,
    scorer: ScenarioScorer,
}

impl DecisionEngine {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            gate: RiskGate::new(),
            scorer: ScenarioScorer::new(),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Look for a new entry.
    ///
    /// With a position open nothing is evaluated. Both directions matching
    /// yields no decision.
    pub fn evaluate_entry(
        &self,
        snapshot: &IndicatorSnapshot,
        has_open_position: bool,
    ) -> EntryDecision {
        let config = self.store.current();

        if has_open_position {
            return EntryDecision::rejected(
                &snapshot.instrument,
                snapshot.timestamp_ms,
                snapshot.price,
                config.version,
                vec![RejectReason::PositionOpen],
            );
        }

        match self.try_evaluate_entry(&config, snapshot) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    instrument = %snapshot.instrument,
                    error = %e,
                    "Entry evaluation failed, no decision"
                );
                EntryDecision::rejected(
                    &snapshot.instrument,
                    snapshot.timestamp_ms,
                    snapshot.price,
                    config.version,
                    vec![RejectReason::EvaluationFailed {
                        message: e.to_string(),
                    }],
                )
            }
        }
    }

    fn try_evaluate_entry(
        &self,
        config: &StrategyConfig,
        snapshot: &IndicatorSnapshot,
    ) -> DecisionResult<EntryDecision> {
        validate_snapshot(snapshot)?;

        let risk = self.gate.evaluate(&config.risk_gate, snapshot);
        if risk.mandatory_fired {
            let filters = risk
                .mandatory_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            debug!(
                instrument = %snapshot.instrument,
                fired = ?risk.fired_names(),
                "Entry blocked by mandatory filter"
            );
            let mut decision = EntryDecision::rejected(
                &snapshot.instrument,
                snapshot.timestamp_ms,
                snapshot.price,
                config.version,
                vec![RejectReason::MandatoryFilter { filters }],
            );
            decision.risk = Some(risk);
            return Ok(decision);
        }

        let mut scores = Vec::with_capacity(2);
        let mut matches: Vec<(Direction, MatchedScenario)> = Vec::new();
        let mut rejections = Vec::new();

        for direction in Direction::ALL {
            let (score, matched) =
                self.scorer
                    .evaluate(direction, snapshot, config.direction(direction), Some(&risk));
            match matched {
                ScenarioMatch::Matched(m) => matches.push((direction, m)),
                ScenarioMatch::NoMatch { misses } => {
                    rejections.push(RejectReason::NoScenarioMatched { direction, misses });
                }
            }
            scores.push(score);
        }

        let base = EntryDecision {
            instrument: snapshot.instrument.clone(),
            timestamp_ms: snapshot.timestamp_ms,
            price: snapshot.price,
            direction: None,
            scenario: None,
            confidence: 0.0,
            quality: 0.0,
            scores,
            risk: None,
            reasoning: String::new(),
            risk_profile: None,
            rejections: Vec::new(),
            config_version: config.version,
        };

        let decision = match matches.as_slice() {
            [] => {
                if !risk.pass {
                    rejections.insert(
                        0,
                        RejectReason::RiskWeightExceeded {
                            total: risk.total_weight,
                            ceiling: risk.ceiling,
                        },
                    );
                }
                debug!(
                    instrument = %snapshot.instrument,
                    risk_weight = %risk.total_weight,
                    "No scenario matched"
                );
                reject(base, rejections, risk)
            }
            [(direction, matched)] => accept(base, config, *direction, matched, risk)?,
            [(_, long), (_, short), ..] => {
                let ambiguity = DecisionError::Ambiguous {
                    long_scenario: long.name.clone(),
                    short_scenario: short.name.clone(),
                };
                warn!(
                    instrument = %snapshot.instrument,
                    error = %ambiguity,
                    "Contradictory signal, no decision"
                );
                reject(
                    base,
                    vec![RejectReason::AmbiguousSignal {
                        long_scenario: long.name.clone(),
                        short_scenario: short.name.clone(),
                    }],
                    risk,
                )
            }
        };

        Ok(decision)
    }

    /// Check whether the opposite direction's scenarios match for an open position.
    ///
    /// The no-trade-zone does not apply: exits are never blocked by entry filters.
    pub fn evaluate_reversal(
        &self,
        snapshot: &IndicatorSnapshot,
        open_direction: Direction,
    ) -> ReversalCheck {
        let config = self.store.current();
        let signal_direction = open_direction.opposite();

        if let Err(e) = validate_snapshot(snapshot) {
            warn!(
                instrument = %snapshot.instrument,
                error = %e,
                "Reversal evaluation failed, not triggering"
            );
            return ReversalCheck {
                triggered: false,
                signal_direction,
                scenario: None,
                quality: 0.0,
            };
        }

        let (score, matched) = self.scorer.evaluate(
            signal_direction,
            snapshot,
            config.direction(signal_direction),
            None,
        );

        match matched.matched() {
            Some(m) => {
                info!(
                    instrument = %snapshot.instrument,
                    open_direction = %open_direction,
                    scenario = %m.name,
                    quality = score.quality,
                    "Strategy reversal signal"
                );
                ReversalCheck {
                    triggered: true,
                    signal_direction,
                    scenario: Some(m.name.clone()),
                    quality: score.quality,
                }
            }
            None => ReversalCheck {
                triggered: false,
                signal_direction,
                scenario: None,
                quality: score.quality,
            },
        }
    }
}

fn validate_snapshot(snapshot: &IndicatorSnapshot) -> DecisionResult<()> {
    if !snapshot.price.is_positive() {
        return Err(DecisionError::Evaluation(format!(
            "snapshot price must be positive, got {}",
            snapshot.price
        )));
    }
    Ok(())
}

fn reject(mut base: EntryDecision, rejections: Vec<RejectReason>, risk: RiskGateResult) -> EntryDecision {
    base.reasoning = rejections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    base.rejections = rejections;
    base.risk = Some(risk);
    base
}

fn accept(
    mut base: EntryDecision,
    config: &StrategyConfig,
    direction: Direction,
    matched: &MatchedScenario,
    risk: RiskGateResult,
) -> DecisionResult<EntryDecision> {
    let profile = config.profile(&matched.risk_profile).ok_or_else(|| {
        DecisionError::Config(format!(
            "scenario {} references unknown risk profile {}",
            matched.name, matched.risk_profile
        ))
    })?;

    base.reasoning = build_reasoning(direction, matched, &base.scores, &risk);
    base.direction = Some(direction);
    base.scenario = Some(matched.name.clone());
    base.quality = matched.quality;
    base.confidence = (matched.quality / 100.0).clamp(0.0, 1.0);
    base.risk_profile = Some(profile.clone());
    base.risk = Some(risk);

    info!(
        instrument = %base.instrument,
        direction = %direction,
        scenario = %matched.name,
        quality = matched.quality,
        price = %base.price,
        "Entry decision"
    );
    Ok(base)
}

fn build_reasoning(
    direction: Direction,
    matched: &MatchedScenario,
    scores: &[DirectionScore],
    risk: &RiskGateResult,
) -> String {
    let categories = scores
        .iter()
        .find(|s| s.direction == direction)
        .map(|s| {
            s.categories
                .iter()
                .map(|c| c.summary())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let ceiling = matched.risk_ceiling.unwrap_or(risk.ceiling);
    format!(
        "{direction} via {} (quality {:.1}); categories: [{categories}]; risk {}/{ceiling}",
        matched.name, matched.quality, risk.total_weight
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use idx_core::{Price, RiskProfile};
    use idx_risk::{FilterDefinition, FilterKind, RiskGateConfig};
    use idx_rules::{Condition, Operator, Rule};
    use idx_scoring::{CategoryDefinition, DirectionConfig, IndicatorSpec, ScenarioDefinition};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn flag_filter(name: &str, weight: Decimal, flag: &str) -> FilterDefinition {
        FilterDefinition::new(
            name,
            weight,
            FilterKind::Rule {
                rule: Rule::all(vec![Condition::new(flag, Operator::Eq, true)]),
            },
        )
    }

    fn direction_config(key: &str) -> DirectionConfig {
        DirectionConfig {
            categories: vec![CategoryDefinition::new("signal", vec![IndicatorSpec::new(key)])],
            scenarios: vec![ScenarioDefinition::new("breakout", "standard")
                .require("signal", 100.0)
                .with_min_quality(50.0)],
        }
    }

    fn strategy() -> StrategyConfig {
        let mut risk_profiles = BTreeMap::new();
        risk_profiles.insert("standard".to_string(), RiskProfile::default());
        StrategyConfig {
            version: 1,
            risk_gate: RiskGateConfig {
                max_weight: dec!(3),
                filters: vec![
                    flag_filter("session", dec!(1), "closed").mandatory(),
                    flag_filter("chop", dec!(2), "choppy"),
                    flag_filter("news", dec!(2), "news"),
                ],
            },
            long: direction_config("bull"),
            short: direction_config("bear"),
            risk_profiles,
        }
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(Arc::new(ConfigStore::new(strategy()).unwrap()))
    }

    fn snapshot(bull: bool, bear: bool) -> IndicatorSnapshot {
        IndicatorSnapshot::new("NIFTY", Price::new(dec!(22500)), 1_000)
            .with_value("bull", bull)
            .with_value("bear", bear)
            .with_value("closed", false)
            .with_value("choppy", false)
            .with_value("news", false)
    }

    // ========================================================================
    // Entries
    // ========================================================================

    #[test]
    fn test_single_direction_emits_decision() {
        let decision = engine().evaluate_entry(&snapshot(true, false), false);
        assert!(decision.is_actionable());
        assert_eq!(decision.direction, Some(Direction::Long));
        assert_eq!(decision.scenario.as_deref(), Some("breakout"));
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.config_version, 1);
        assert_eq!(decision.scores.len(), 2);
        assert_eq!(decision.category_scores().len(), 1);
        assert!(decision.reasoning.starts_with("long via breakout"));
    }

    #[test]
    fn test_short_direction() {
        let decision = engine().evaluate_entry(&snapshot(false, true), false);
        assert_eq!(decision.direction, Some(Direction::Short));
    }

    #[test]
    fn test_both_directions_is_ambiguous() {
        let decision = engine().evaluate_entry(&snapshot(true, true), false);
        assert!(!decision.is_actionable());
        assert_eq!(decision.direction, None);
        assert!(matches!(
            decision.rejections.as_slice(),
            [RejectReason::AmbiguousSignal { .. }]
        ));
    }

    #[test]
    fn test_no_match_lists_both_directions() {
        let decision = engine().evaluate_entry(&snapshot(false, false), false);
        assert_eq!(decision.rejections.len(), 2);
        assert!(decision
            .rejections
            .iter()
            .all(|r| matches!(r, RejectReason::NoScenarioMatched { .. })));
        assert_eq!(decision.category_scores().len(), 2);
    }

    #[test]
    fn test_open_position_skips_entry() {
        let decision = engine().evaluate_entry(&snapshot(true, false), true);
        assert_eq!(decision.rejections, vec![RejectReason::PositionOpen]);
        assert!(decision.risk.is_none());
    }

    #[test]
    fn test_mandatory_filter_short_circuits() {
        let snap = snapshot(true, false).with_value("closed", true);
        let decision = engine().evaluate_entry(&snap, false);
        assert!(!decision.is_actionable());
        assert_eq!(
            decision.rejections,
            vec![RejectReason::MandatoryFilter {
                filters: vec!["session".to_string()]
            }]
        );
        assert!(decision.scores.is_empty());
        assert!(decision.risk.unwrap().mandatory_fired);
    }

    #[test]
    fn test_risk_weight_exceeded() {
        let snap = snapshot(true, false)
            .with_value("choppy", true)
            .with_value("news", true);
        let decision = engine().evaluate_entry(&snap, false);
        assert!(!decision.is_actionable());
        assert!(matches!(
            decision.rejections[0],
            RejectReason::RiskWeightExceeded { .. }
        ));
    }

    #[test]
    fn test_scenario_ceiling_override_allows_entry() {
        let mut config = strategy();
        config.long.scenarios[0].risk_ceiling = Some(dec!(5));
        let engine = DecisionEngine::new(Arc::new(ConfigStore::new(config).unwrap()));
        let snap = snapshot(true, false)
            .with_value("choppy", true)
            .with_value("news", true);
        let decision = engine.evaluate_entry(&snap, false);
        assert_eq!(decision.direction, Some(Direction::Long));
    }

    #[test]
    fn test_invalid_snapshot_degrades_to_rejection() {
        let snap = IndicatorSnapshot::new("NIFTY", Price::ZERO, 1_000).with_value("bull", true);
        let decision = engine().evaluate_entry(&snap, false);
        assert!(matches!(
            decision.rejections.as_slice(),
            [RejectReason::EvaluationFailed { .. }]
        ));
    }

    #[test]
    fn test_entry_is_deterministic() {
        let engine = engine();
        let snap = snapshot(true, false);
        assert_eq!(
            engine.evaluate_entry(&snap, false),
            engine.evaluate_entry(&snap, false)
        );
    }

    #[test]
    fn test_reload_takes_effect_on_next_evaluation() {
        let engine = engine();
        let mut next = strategy();
        next.version = 2;
        next.long.scenarios[0].min_quality = 100.0;
        next.long.categories[0].indicators.push(IndicatorSpec::new("extra"));
        engine.store().install(next).unwrap();

        let decision = engine.evaluate_entry(&snapshot(true, false), false);
        assert_eq!(decision.config_version, 2);
        assert!(!decision.is_actionable());
    }

    // ========================================================================
    // Strategy reversal
    // ========================================================================

    #[test]
    fn test_reversal_uses_opposite_direction() {
        let engine = engine();
        let check = engine.evaluate_reversal(&snapshot(false, true), Direction::Long);
        assert!(check.triggered);
        assert_eq!(check.signal_direction, Direction::Short);

        let check = engine.evaluate_reversal(&snapshot(true, false), Direction::Long);
        assert!(!check.triggered);
    }

    #[test]
    fn test_reversal_ignores_risk_gate() {
        let snap = snapshot(false, true).with_value("closed", true);
        let check = engine().evaluate_reversal(&snap, Direction::Long);
        assert!(check.triggered);
    }
}
