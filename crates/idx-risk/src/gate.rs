//! Composite no-trade-zone gate.
//!
//! Every enabled filter is evaluated; fired filters contribute their weight
//! to a running total. The gate passes iff no mandatory filter fired and the
//! total stays within the ceiling. The full list of fired filters is kept
//! for post-trade diagnostics.

use idx_core::IndicatorSnapshot;
use idx_rules::RuleEvaluator;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{RiskError, RiskResult};
use crate::filter::{validate_filters, FilterDefinition, FilterOutcome};

fn default_max_weight() -> Decimal {
    Decimal::from(3)
}

/// Risk gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGateConfig {
    /// Maximum accumulated weight that still passes.
    #[serde(default = "default_max_weight")]
    pub max_weight: Decimal,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            max_weight: default_max_weight(),
            filters: Vec::new(),
        }
    }
}

impl RiskGateConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.max_weight < Decimal::ZERO {
            return Err(RiskError::Config(format!(
                "max_weight must be non-negative, got {}",
                self.max_weight
            )));
        }
        validate_filters(&self.filters)
    }

    pub fn enabled_filters(&self) -> impl Iterator<Item = &FilterDefinition> {
        self.filters.iter().filter(|f| f.enabled)
    }
}

/// A filter that fired during one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiredFilter {
    pub name: String,
    pub weight: Decimal,
    pub mandatory: bool,
    pub reason: String,
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskGateResult {
    pub total_weight: Decimal,
    pub ceiling: Decimal,
    pub fired: Vec<FiredFilter>,
    /// Number of enabled filters evaluated.
    pub evaluated: usize,
    pub mandatory_fired: bool,
    pub pass: bool,
    /// Rule filters that failed to evaluate (not counted as fired).
    #[serde(default)]
    pub rule_errors: u32,
}

impl RiskGateResult {
    /// Re-derive pass/fail against another ceiling.
    pub fn passes_with_ceiling(&self, ceiling: Decimal) -> bool {
        !self.mandatory_fired && self.total_weight <= ceiling
    }

    pub fn fired_names(&self) -> Vec<&str> {
        self.fired.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn mandatory_names(&self) -> Vec<&str> {
        self.fired
            .iter()
            .filter(|f| f.mandatory)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// No-trade-zone gate.
///
/// Stateless: the configuration is passed per evaluation so a reloaded
/// configuration takes effect on the next call.
#[derive(Debug, Default)]
pub struct RiskGate {
    rules: RuleEvaluator<IndicatorSnapshot>,
}

impl RiskGate {
    pub fn new() -> Self {
        Self {
            rules: RuleEvaluator::for_snapshots(),
        }
    }

    /// Evaluate every enabled filter against `snapshot`.
    pub fn evaluate(&self, config: &RiskGateConfig, snapshot: &IndicatorSnapshot) -> RiskGateResult {
        let mut total_weight = Decimal::ZERO;
        let mut fired = Vec::new();
        let mut evaluated = 0;
        let mut mandatory_fired = false;
        let mut rule_errors = 0;

        for filter in config.enabled_filters() {
            evaluated += 1;
            match filter.kind.check(snapshot, &self.rules) {
                FilterOutcome::Clear => {
                    trace!(filter = %filter.name, "Risk filter clear");
                }
                FilterOutcome::Fired(reason) => {
                    trace!(
                        filter = %filter.name,
                        weight = %filter.weight,
                        mandatory = filter.mandatory,
                        reason = %reason,
                        "Risk filter fired"
                    );
                    total_weight += filter.weight;
                    mandatory_fired |= filter.mandatory;
                    fired.push(FiredFilter {
                        name: filter.name.clone(),
                        weight: filter.weight,
                        mandatory: filter.mandatory,
                        reason,
                    });
                }
                FilterOutcome::Errored(error) => {
                    warn!(
                        filter = %filter.name,
                        error = %error,
                        "Risk filter evaluation failed, not counted"
                    );
                    rule_errors += 1;
                }
            }
        }

        let pass = !mandatory_fired && total_weight <= config.max_weight;
        debug!(
            instrument = %snapshot.instrument,
            total_weight = %total_weight,
            ceiling = %config.max_weight,
            fired = fired.len(),
            evaluated,
            mandatory_fired,
            pass,
            "Risk gate evaluated"
        );

        RiskGateResult {
            total_weight,
            ceiling: config.max_weight,
            fired,
            evaluated,
            mandatory_fired,
            pass,
            rule_errors,
        }
    }
}
