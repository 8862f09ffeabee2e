//! Scenario scorer.
//!
//! Scores every category of one direction, then walks the scenarios in
//! configuration order and selects the first one whose requirements are all
//! met. Configuration order is the only tie-break.

use std::collections::HashSet;

use idx_core::{Direction, IndicatorSnapshot};
use idx_risk::RiskGateResult;
use idx_rules::RuleEvaluator;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::category::{CategoryDefinition, CategoryScoreResult};
use crate::error::{ScoringError, ScoringResult};
use crate::scenario::{MatchedScenario, MissReason, ScenarioDefinition, ScenarioMatch, ScenarioMiss};

/// Categories and scenarios of one direction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectionConfig {
    #[serde(default)]
    pub categories: Vec<CategoryDefinition>,
    /// Tried in order; first full match wins.
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

impl DirectionConfig {
    pub fn category(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn validate(&self) -> ScoringResult<()> {
        let mut names = HashSet::new();
        for category in &self.categories {
            category.validate()?;
            if !names.insert(category.name.as_str()) {
                return Err(ScoringError::Config(format!(
                    "duplicate category name: {}",
                    category.name
                )));
            }
        }

        let mut scenario_names = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !scenario_names.insert(scenario.name.as_str()) {
                return Err(ScoringError::Config(format!(
                    "duplicate scenario name: {}",
                    scenario.name
                )));
            }
            if let Some(unknown) = scenario
                .category_minimums
                .keys()
                .find(|c| !names.contains(c.as_str()))
            {
                return Err(ScoringError::InvalidScenario {
                    scenario: scenario.name.clone(),
                    reason: format!("references unknown category {unknown}"),
                });
            }
        }
        Ok(())
    }
}

/// Category scores and overall quality for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionScore {
    pub direction: Direction,
    pub categories: Vec<CategoryScoreResult>,
    /// Weighted mean of category percentages, in `[0, 100]`.
    pub quality: f64,
}

impl DirectionScore {
    pub fn category(&self, name: &str) -> Option<&CategoryScoreResult> {
        self.categories.iter().find(|c| c.category == name)
    }

    pub fn rule_errors(&self) -> u32 {
        self.categories.iter().map(|c| c.rule_errors).sum()
    }
}

/// Weighted mean of category percentages; 100 when nothing carries weight.
pub fn quality_score(categories: &[CategoryScoreResult]) -> f64 {
    let total_weight: f64 = categories.iter().map(|c| c.weight).sum();
    if total_weight <= 0.0 {
        return 100.0;
    }
    let weighted: f64 = categories.iter().map(|c| c.weight * c.percentage).sum();
    (weighted / total_weight).clamp(0.0, 100.0)
}

/// Scores snapshots against direction configurations.
#[derive(Debug, Default)]
pub struct ScenarioScorer {
    rules: RuleEvaluator<IndicatorSnapshot>,
}

impl ScenarioScorer {
    pub fn new() -> Self {
        Self {
            rules: RuleEvaluator::for_snapshots(),
        }
    }

    /// Score every category of `config` for `direction`.
    pub fn score(
        &self,
        direction: Direction,
        snapshot: &IndicatorSnapshot,
        config: &DirectionConfig,
    ) -> DirectionScore {
        let categories: Vec<CategoryScoreResult> = config
            .categories
            .iter()
            .map(|c| c.score(snapshot, &self.rules))
            .collect();
        let quality = quality_score(&categories);

        trace!(
            direction = %direction,
            quality,
            categories = categories.len(),
            "Direction scored"
        );

        DirectionScore {
            direction,
            categories,
            quality,
        }
    }

    /// Select the first scenario whose requirements are all met.
    ///
    /// `risk` is `None` when the risk gate does not apply (reversal checks).
    pub fn match_scenario(
        &self,
        score: &DirectionScore,
        config: &DirectionConfig,
        risk: Option<&RiskGateResult>,
    ) -> ScenarioMatch {
        let mut misses = Vec::new();

        for scenario in &config.scenarios {
            let reasons = check_scenario(scenario, score, risk);
            if reasons.is_empty() {
                debug!(
                    direction = %score.direction,
                    scenario = %scenario.name,
                    quality = score.quality,
                    "Scenario matched"
                );
                return ScenarioMatch::Matched(MatchedScenario {
                    name: scenario.name.clone(),
                    risk_profile: scenario.risk_profile.clone(),
                    risk_ceiling: scenario.risk_ceiling,
                    quality: score.quality,
                });
            }
            trace!(
                direction = %score.direction,
                scenario = %scenario.name,
                misses = reasons.len(),
                "Scenario missed"
            );
            misses.push(ScenarioMiss {
                scenario: scenario.name.clone(),
                reasons,
            });
        }

        ScenarioMatch::NoMatch { misses }
    }

    /// Score and match in one call.
    pub fn evaluate(
        &self,
        direction: Direction,
        snapshot: &IndicatorSnapshot,
        config: &DirectionConfig,
        risk: Option<&RiskGateResult>,
    ) -> (DirectionScore, ScenarioMatch) {
        let score = self.score(direction, snapshot, config);
        let matched = self.match_scenario(&score, config, risk);
        (score, matched)
    }
}

fn check_scenario(
    scenario: &ScenarioDefinition,
    score: &DirectionScore,
    risk: Option<&RiskGateResult>,
) -> Vec<MissReason> {
    if !scenario.enabled {
        return vec![MissReason::Disabled];
    }

    let mut reasons = Vec::new();

    for (category, required) in &scenario.category_minimums {
        let Some(result) = score.category(category) else {
            reasons.push(MissReason::UnknownCategory {
                category: category.clone(),
            });
            continue;
        };
        if result.percentage < *required {
            reasons.push(MissReason::CategoryBelowMinimum {
                category: category.clone(),
                required: *required,
                actual: result.percentage,
            });
        }
        if !result.minimum_met {
            reasons.push(MissReason::CategoryMinimumNotMet {
                category: category.clone(),
            });
        }
    }

    if let Some(risk) = risk {
        let ceiling = scenario.risk_ceiling.unwrap_or(risk.ceiling);
        if risk.mandatory_fired {
            reasons.push(MissReason::MandatoryFilterFired);
        } else if !risk.passes_with_ceiling(ceiling) {
            reasons.push(MissReason::RiskCeilingExceeded {
                total: risk.total_weight,
                ceiling,
            });
        }
    }

    if score.quality < scenario.min_quality {
        reasons.push(MissReason::QualityBelowMinimum {
            required: scenario.min_quality,
            actual: score.quality,
        });
    }

    reasons
}
