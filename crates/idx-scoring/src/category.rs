//! Indicator categories and their per-evaluation scores.

use std::collections::HashSet;

use idx_core::IndicatorSnapshot;
use idx_rules::{Rule, RuleEvaluator};
use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, ScoringResult};

fn default_weight() -> f64 {
    1.0
}

/// One member indicator of a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    /// Snapshot key; its truthiness satisfies the indicator unless `condition` is set.
    pub key: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Display label; defaults to the key.
    #[serde(default)]
    pub label: Option<String>,
    /// Optional rule replacing the plain truthiness check.
    #[serde(default)]
    pub condition: Option<Rule>,
}

impl IndicatorSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            weight: default_weight(),
            label: None,
            condition: None,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_condition(mut self, rule: Rule) -> Self {
        self.condition = Some(rule);
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

/// A named group of indicators scored together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,
    /// Weight of this category in the overall quality mean.
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
    /// Minimum number of satisfied indicators.
    #[serde(default)]
    pub min_satisfied: Option<u32>,
    /// Minimum achieved percentage.
    #[serde(default)]
    pub min_percent: Option<f64>,
}

impl CategoryDefinition {
    pub fn new(name: impl Into<String>, indicators: Vec<IndicatorSpec>) -> Self {
        Self {
            name: name.into(),
            weight: default_weight(),
            indicators,
            min_satisfied: None,
            min_percent: None,
        }
    }

    #[must_use]
    pub fn with_min_satisfied(mut self, n: u32) -> Self {
        self.min_satisfied = Some(n);
        self
    }

    #[must_use]
    pub fn with_min_percent(mut self, pct: f64) -> Self {
        self.min_percent = Some(pct);
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn validate(&self) -> ScoringResult<()> {
        let invalid = |reason: String| ScoringError::InvalidCategory {
            category: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(ScoringError::Config("category name must not be empty".to_string()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(invalid(format!("weight must be non-negative, got {}", self.weight)));
        }
        let mut keys = HashSet::new();
        for spec in &self.indicators {
            if !spec.weight.is_finite() || spec.weight < 0.0 {
                return Err(invalid(format!(
                    "indicator {} weight must be non-negative, got {}",
                    spec.key, spec.weight
                )));
            }
            if !keys.insert(spec.key.as_str()) {
                return Err(invalid(format!("duplicate indicator {}", spec.key)));
            }
        }
        if let Some(n) = self.min_satisfied {
            if n as usize > self.indicators.len() {
                return Err(invalid(format!(
                    "min_satisfied {n} exceeds {} indicators",
                    self.indicators.len()
                )));
            }
        }
        if let Some(pct) = self.min_percent {
            if !(0.0..=100.0).contains(&pct) {
                return Err(invalid(format!("min_percent must be within [0, 100], got {pct}")));
            }
        }
        Ok(())
    }

    /// Score this category against a snapshot.
    pub fn score(
        &self,
        snapshot: &IndicatorSnapshot,
        rules: &RuleEvaluator<IndicatorSnapshot>,
    ) -> CategoryScoreResult {
        let mut satisfied = Vec::new();
        let mut unsatisfied = Vec::new();
        let mut total_weight = 0.0;
        let mut achieved_weight = 0.0;
        let mut rule_errors = 0;

        for spec in &self.indicators {
            let hit = match &spec.condition {
                Some(rule) => {
                    let (result, error) = rules.snapshot_or_false(rule, snapshot);
                    if error.is_some() {
                        rule_errors += 1;
                    }
                    result
                }
                None => snapshot.flag(&spec.key),
            };

            total_weight += spec.weight;
            let entry = IndicatorHit {
                key: spec.key.clone(),
                label: spec.display_label().to_string(),
                weight: spec.weight,
            };
            if hit {
                achieved_weight += spec.weight;
                satisfied.push(entry);
            } else {
                unsatisfied.push(entry);
            }
        }

        // Empty categories are vacuously satisfied.
        let percentage = if total_weight > 0.0 {
            (achieved_weight / total_weight * 100.0).clamp(0.0, 100.0)
        } else {
            100.0
        };

        let satisfied_count = satisfied.len() as u32;
        let minimum_met = self.indicators.is_empty()
            || (self.min_satisfied.map_or(true, |n| satisfied_count >= n)
                && self.min_percent.map_or(true, |p| percentage >= p));

        CategoryScoreResult {
            category: self.name.clone(),
            weight: self.weight,
            satisfied_count,
            total_count: self.indicators.len() as u32,
            total_weight,
            achieved_weight,
            percentage,
            minimum_met,
            satisfied,
            unsatisfied,
            rule_errors,
        }
    }
}

/// Display metadata for one indicator in a score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorHit {
    pub key: String,
    pub label: String,
    pub weight: f64,
}

/// Score of one category for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScoreResult {
    pub category: String,
    /// Category weight in the quality mean.
    pub weight: f64,
    pub satisfied_count: u32,
    pub total_count: u32,
    pub total_weight: f64,
    pub achieved_weight: f64,
    /// Achieved percentage in `[0, 100]`.
    pub percentage: f64,
    /// Category-level count/percent minima satisfied.
    pub minimum_met: bool,
    pub satisfied: Vec<IndicatorHit>,
    pub unsatisfied: Vec<IndicatorHit>,
    #[serde(default)]
    pub rule_errors: u32,
}

impl CategoryScoreResult {
    pub fn satisfied_keys(&self) -> Vec<&str> {
        self.satisfied.iter().map(|h| h.key.as_str()).collect()
    }

    /// `"trend 2/3 (66.7%)"`
    pub fn summary(&self) -> String {
        format!(
            "{} {}/{} ({:.1}%)",
            self.category, self.satisfied_count, self.total_count, self.percentage
        )
    }
}
