//! Risk-management profiles attached to scenarios.
//!
//! A profile describes how a position opened by a scenario is managed:
//! initial stop and target distances, the milestone ladder used for
//! trailing, and the reversal detector parameters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Quantity;
use crate::error::{CoreError, Result};

fn default_decreasing_count() -> u32 {
    5
}

fn default_history_capacity() -> usize {
    50
}

fn default_ma_window() -> usize {
    10
}

fn default_threshold_pct() -> f64 {
    2.0
}

fn default_neutral_timeout() -> u32 {
    50
}

fn default_quantity() -> Quantity {
    Quantity::ONE
}

fn default_true() -> bool {
    true
}

/// Decreasing-step milestone schedule.
///
/// The first `decreasing_count` milestones step down linearly from
/// `base_step` to `min_step`; every later milestone uses `min_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSchedule {
    pub base_step: Decimal,
    pub min_step: Decimal,
    #[serde(default = "default_decreasing_count")]
    pub decreasing_count: u32,
}

impl Default for MilestoneSchedule {
    fn default() -> Self {
        Self {
            base_step: Decimal::from(10),
            min_step: Decimal::from(2),
            decreasing_count: default_decreasing_count(),
        }
    }
}

impl MilestoneSchedule {
    pub fn new(base_step: Decimal, min_step: Decimal, decreasing_count: u32) -> Self {
        Self {
            base_step,
            min_step,
            decreasing_count,
        }
    }

    /// Point increment required to reach milestone `n` (1-indexed).
    ///
    /// `n == 0` is treated as `n == 1`.
    pub fn step(&self, n: u32) -> Decimal {
        let n = n.max(1);
        let k = self.decreasing_count.max(1);
        if n > k {
            return self.min_step;
        }
        if k == 1 {
            return self.base_step.max(self.min_step);
        }
        let decrement = (self.base_step - self.min_step) / Decimal::from(k - 1);
        let step = self.base_step - decrement * Decimal::from(n - 1);
        step.max(self.min_step)
    }

    /// First `count` steps of the schedule.
    pub fn steps(&self, count: u32) -> Vec<Decimal> {
        (1..=count).map(|n| self.step(n)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_step <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "milestone min_step must be positive, got {}",
                self.min_step
            )));
        }
        if self.base_step < self.min_step {
            return Err(CoreError::InvalidConfig(format!(
                "milestone base_step {} is below min_step {}",
                self.base_step, self.min_step
            )));
        }
        if self.decreasing_count == 0 {
            return Err(CoreError::InvalidConfig(
                "milestone decreasing_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the moving-average reversal detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReversalConfig {
    /// Maximum number of price observations retained.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Moving-average window (most recent observations).
    #[serde(default = "default_ma_window")]
    pub ma_window: usize,
    /// Deviation from the average, in percent, separating neutral from a move.
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,
    /// Consecutive neutral updates before a timeout recommendation.
    #[serde(default = "default_neutral_timeout")]
    pub neutral_timeout: u32,
}

impl Default for ReversalConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            ma_window: default_ma_window(),
            threshold_pct: default_threshold_pct(),
            neutral_timeout: default_neutral_timeout(),
        }
    }
}

impl ReversalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ma_window == 0 {
            return Err(CoreError::InvalidConfig(
                "reversal ma_window must be at least 1".to_string(),
            ));
        }
        if self.history_capacity < self.ma_window {
            return Err(CoreError::InvalidConfig(format!(
                "reversal history_capacity {} is smaller than ma_window {}",
                self.history_capacity, self.ma_window
            )));
        }
        if !self.threshold_pct.is_finite() || self.threshold_pct < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "reversal threshold_pct must be a non-negative number, got {}",
                self.threshold_pct
            )));
        }
        if self.neutral_timeout == 0 {
            return Err(CoreError::InvalidConfig(
                "reversal neutral_timeout must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Risk-management profile applied to a position opened by a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Initial stop distance from entry, in points.
    pub stop_distance: Decimal,
    /// Target distance from entry, in points.
    pub target_distance: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: Quantity,
    #[serde(default)]
    pub milestones: MilestoneSchedule,
    /// Favorable excursion (points) after which the stop moves to entry.
    #[serde(default)]
    pub breakeven_trigger: Option<Decimal>,
    #[serde(default)]
    pub reversal: ReversalConfig,
    /// Whether detector recommendations close the position.
    #[serde(default = "default_true")]
    pub reversal_exit_enabled: bool,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            stop_distance: Decimal::from(20),
            target_distance: Decimal::from(40),
            quantity: default_quantity(),
            milestones: MilestoneSchedule::default(),
            breakeven_trigger: None,
            reversal: ReversalConfig::default(),
            reversal_exit_enabled: true,
        }
    }
}

impl RiskProfile {
    pub fn validate(&self) -> Result<()> {
        if self.stop_distance <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "stop_distance must be positive, got {}",
                self.stop_distance
            )));
        }
        if self.target_distance <= Decimal::ZERO {
            return Err(CoreError::InvalidConfig(format!(
                "target_distance must be positive, got {}",
                self.target_distance
            )));
        }
        if !self.quantity.is_positive() {
            return Err(CoreError::InvalidQuantity(format!(
                "profile quantity must be positive, got {}",
                self.quantity
            )));
        }
        if let Some(trigger) = self.breakeven_trigger {
            if trigger <= Decimal::ZERO {
                return Err(CoreError::InvalidConfig(format!(
                    "breakeven_trigger must be positive, got {trigger}"
                )));
            }
        }
        self.milestones.validate()?;
        self.reversal.validate()?;
        Ok(())
    }
}
