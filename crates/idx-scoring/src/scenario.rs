//! Scenario definitions and match outcomes.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, ScoringResult};

fn default_true() -> bool {
    true
}

/// A named, fully configured tradeable setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum achieved percentage per category.
    #[serde(default)]
    pub category_minimums: BTreeMap<String, f64>,
    /// Minimum overall quality score in `[0, 100]`.
    #[serde(default)]
    pub min_quality: f64,
    /// Replaces the global risk-gate ceiling for this scenario.
    #[serde(default)]
    pub risk_ceiling: Option<Decimal>,
    /// Name of the risk profile applied to positions opened by this scenario.
    pub risk_profile: String,
}

impl ScenarioDefinition {
    pub fn new(name: impl Into<String>, risk_profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            category_minimums: BTreeMap::new(),
            min_quality: 0.0,
            risk_ceiling: None,
            risk_profile: risk_profile.into(),
        }
    }

    #[must_use]
    pub fn require(mut self, category: impl Into<String>, min_percent: f64) -> Self {
        self.category_minimums.insert(category.into(), min_percent);
        self
    }

    #[must_use]
    pub fn with_min_quality(mut self, min_quality: f64) -> Self {
        self.min_quality = min_quality;
        self
    }

    #[must_use]
    pub fn with_risk_ceiling(mut self, ceiling: Decimal) -> Self {
        self.risk_ceiling = Some(ceiling);
        self
    }

    pub fn validate(&self) -> ScoringResult<()> {
        let invalid = |reason: String| ScoringError::InvalidScenario {
            scenario: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(ScoringError::Config("scenario name must not be empty".to_string()));
        }
        if self.risk_profile.trim().is_empty() {
            return Err(invalid("risk_profile must not be empty".to_string()));
        }
        if !(0.0..=100.0).contains(&self.min_quality) {
            return Err(invalid(format!(
                "min_quality must be within [0, 100], got {}",
                self.min_quality
            )));
        }
        for (category, pct) in &self.category_minimums {
            if !(0.0..=100.0).contains(pct) {
                return Err(invalid(format!(
                    "minimum for {category} must be within [0, 100], got {pct}"
                )));
            }
        }
        if let Some(ceiling) = self.risk_ceiling {
            if ceiling < Decimal::ZERO {
                return Err(invalid(format!("risk_ceiling must be non-negative, got {ceiling}")));
            }
        }
        Ok(())
    }
}

/// Why a scenario did not match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissReason {
    Disabled,
    UnknownCategory {
        category: String,
    },
    CategoryBelowMinimum {
        category: String,
        required: f64,
        actual: f64,
    },
    CategoryMinimumNotMet {
        category: String,
    },
    MandatoryFilterFired,
    RiskCeilingExceeded {
        total: Decimal,
        ceiling: Decimal,
    },
    QualityBelowMinimum {
        required: f64,
        actual: f64,
    },
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::UnknownCategory { category } => write!(f, "unknown category {category}"),
            Self::CategoryBelowMinimum {
                category,
                required,
                actual,
            } => write!(f, "{category} {actual:.1}% < {required:.1}%"),
            Self::CategoryMinimumNotMet { category } => {
                write!(f, "{category} category minimum not met")
            }
            Self::MandatoryFilterFired => write!(f, "mandatory risk filter fired"),
            Self::RiskCeilingExceeded { total, ceiling } => {
                write!(f, "risk weight {total} > {ceiling}")
            }
            Self::QualityBelowMinimum { required, actual } => {
                write!(f, "quality {actual:.1} < {required:.1}")
            }
        }
    }
}

/// A scenario that failed, with every unmet condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMiss {
    pub scenario: String,
    pub reasons: Vec<MissReason>,
}

impl fmt::Display for ScenarioMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.reasons.iter().map(ToString::to_string).collect();
        write!(f, "{}: {}", self.scenario, reasons.join(", "))
    }
}

/// The scenario selected for a direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedScenario {
    pub name: String,
    pub risk_profile: String,
    pub risk_ceiling: Option<Decimal>,
    pub quality: f64,
}

/// Outcome of scenario matching for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScenarioMatch {
    Matched(MatchedScenario),
    NoMatch { misses: Vec<ScenarioMiss> },
}

impl ScenarioMatch {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    pub fn matched(&self) -> Option<&MatchedScenario> {
        match self {
            Self::Matched(m) => Some(m),
            Self::NoMatch { .. } => None,
        }
    }
}
