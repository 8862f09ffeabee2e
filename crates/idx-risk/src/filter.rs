//! No-trade-zone filter definitions.
//!
//! Every filter is an independent predicate over the snapshot and its recent
//! candles. A filter "fires" when the market is unfavorable for new entries.
//! When the data a filter needs is missing, it fires: when in doubt, block.

use std::collections::HashSet;

use idx_core::IndicatorSnapshot;
use idx_rules::RuleEvaluator;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};
use crate::window::{snapshot_local_time, TimeWindow};

fn default_true() -> bool {
    true
}

fn default_weight() -> Decimal {
    Decimal::ONE
}

fn default_volume_indicator() -> String {
    "volume_multiplier".to_string()
}

fn default_ma_indicator() -> String {
    "ma_long".to_string()
}

fn default_rsi_indicator() -> String {
    "rsi".to_string()
}

fn default_rsi_lower() -> f64 {
    45.0
}

fn default_rsi_upper() -> f64 {
    55.0
}

fn default_support_indicator() -> String {
    "support".to_string()
}

fn default_resistance_indicator() -> String {
    "resistance".to_string()
}

fn default_doji_body_ratio() -> f64 {
    0.1
}

/// Result of a single filter check.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// Conditions acceptable.
    Clear,
    /// Filter fired with reason.
    Fired(String),
    /// Filter could not be evaluated (rule error); does not contribute weight.
    Errored(String),
}

impl FilterOutcome {
    pub fn is_fired(&self) -> bool {
        matches!(self, Self::Fired(_))
    }

    fn unavailable(what: &str) -> Self {
        Self::Fired(format!("data unavailable: {what}"))
    }
}

/// Filter-specific thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Fires outside every allowed session window.
    TradingHours {
        windows: Vec<TimeWindow>,
        #[serde(default)]
        utc_offset_minutes: i32,
    },
    /// Fires inside any blackout window.
    Blackout {
        windows: Vec<TimeWindow>,
        #[serde(default)]
        utc_offset_minutes: i32,
    },
    /// Fires when the volume multiplier is below the floor.
    VolumeSurge {
        #[serde(default = "default_volume_indicator")]
        indicator: String,
        min_multiplier: f64,
    },
    /// Fires when the last candle's body ratio is below the floor.
    CandleBody { min_body_ratio: f64 },
    /// Fires when price sits closer than `min_distance` points to a multiple of `step`.
    RoundNumber { step: Decimal, min_distance: Decimal },
    /// Fires when price is too close to, or too far from, a long moving average.
    MovingAverageDistance {
        #[serde(default = "default_ma_indicator")]
        indicator: String,
        #[serde(default)]
        min_distance_pct: Option<f64>,
        #[serde(default)]
        max_distance_pct: Option<f64>,
    },
    /// Fires when RSI is inside `[lower, upper]`.
    RsiDeadZone {
        #[serde(default = "default_rsi_indicator")]
        indicator: String,
        #[serde(default = "default_rsi_lower")]
        lower: f64,
        #[serde(default = "default_rsi_upper")]
        upper: f64,
    },
    /// Fires when price is within `min_distance_pct` of support or resistance.
    SupportResistance {
        #[serde(default = "default_support_indicator")]
        support: String,
        #[serde(default = "default_resistance_indicator")]
        resistance: String,
        min_distance_pct: f64,
    },
    /// Fires when the trailing run of doji candles reaches `max_consecutive`.
    ConsecutiveDoji {
        #[serde(default = "default_doji_body_ratio")]
        doji_body_ratio: f64,
        max_consecutive: usize,
    },
    /// Fires when the rule evaluates true.
    Rule { rule: idx_rules::Rule },
}

impl FilterKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TradingHours { .. } => "trading_hours",
            Self::Blackout { .. } => "blackout",
            Self::VolumeSurge { .. } => "volume_surge",
            Self::CandleBody { .. } => "candle_body",
            Self::RoundNumber { .. } => "round_number",
            Self::MovingAverageDistance { .. } => "moving_average_distance",
            Self::RsiDeadZone { .. } => "rsi_dead_zone",
            Self::SupportResistance { .. } => "support_resistance",
            Self::ConsecutiveDoji { .. } => "consecutive_doji",
            Self::Rule { .. } => "rule",
        }
    }

    /// Evaluate this filter against a snapshot.
    pub fn check(
        &self,
        snapshot: &IndicatorSnapshot,
        rules: &RuleEvaluator<IndicatorSnapshot>,
    ) -> FilterOutcome {
        match self {
            Self::TradingHours {
                windows,
                utc_offset_minutes,
            } => check_trading_hours(snapshot, windows, *utc_offset_minutes),
            Self::Blackout {
                windows,
                utc_offset_minutes,
            } => check_blackout(snapshot, windows, *utc_offset_minutes),
            Self::VolumeSurge {
                indicator,
                min_multiplier,
            } => check_volume_surge(snapshot, indicator, *min_multiplier),
            Self::CandleBody { min_body_ratio } => check_candle_body(snapshot, *min_body_ratio),
            Self::RoundNumber { step, min_distance } => {
                check_round_number(snapshot, *step, *min_distance)
            }
            Self::MovingAverageDistance {
                indicator,
                min_distance_pct,
                max_distance_pct,
            } => check_ma_distance(snapshot, indicator, *min_distance_pct, *max_distance_pct),
            Self::RsiDeadZone {
                indicator,
                lower,
                upper,
            } => check_rsi_dead_zone(snapshot, indicator, *lower, *upper),
            Self::SupportResistance {
                support,
                resistance,
                min_distance_pct,
            } => check_support_resistance(snapshot, support, resistance, *min_distance_pct),
            Self::ConsecutiveDoji {
                doji_body_ratio,
                max_consecutive,
            } => check_consecutive_doji(snapshot, *doji_body_ratio, *max_consecutive),
            Self::Rule { rule } => match rules.evaluate_snapshot(rule, snapshot) {
                Ok(true) => FilterOutcome::Fired("rule matched".to_string()),
                Ok(false) => FilterOutcome::Clear,
                Err(e) => FilterOutcome::Errored(e.to_string()),
            },
        }
    }

    /// Threshold sanity checks.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::TradingHours {
                windows,
                utc_offset_minutes,
            } => {
                if windows.is_empty() {
                    return Err("trading_hours needs at least one window".to_string());
                }
                validate_windows(windows, *utc_offset_minutes)
            }
            Self::Blackout {
                windows,
                utc_offset_minutes,
            } => validate_windows(windows, *utc_offset_minutes),
            Self::VolumeSurge { min_multiplier, .. } => {
                non_negative("min_multiplier", *min_multiplier)
            }
            Self::CandleBody { min_body_ratio } => unit_interval("min_body_ratio", *min_body_ratio),
            Self::RoundNumber { step, min_distance } => {
                if *step <= Decimal::ZERO {
                    return Err(format!("step must be positive, got {step}"));
                }
                if *min_distance < Decimal::ZERO {
                    return Err(format!("min_distance must be non-negative, got {min_distance}"));
                }
                Ok(())
            }
            Self::MovingAverageDistance {
                min_distance_pct,
                max_distance_pct,
                ..
            } => {
                if min_distance_pct.is_none() && max_distance_pct.is_none() {
                    return Err("set min_distance_pct or max_distance_pct".to_string());
                }
                if let Some(min) = min_distance_pct {
                    non_negative("min_distance_pct", *min)?;
                }
                if let Some(max) = max_distance_pct {
                    non_negative("max_distance_pct", *max)?;
                }
                if let (Some(min), Some(max)) = (min_distance_pct, max_distance_pct) {
                    if min > max {
                        return Err(format!("min_distance_pct {min} > max_distance_pct {max}"));
                    }
                }
                Ok(())
            }
            Self::RsiDeadZone { lower, upper, .. } => {
                if !(0.0..=100.0).contains(lower) || !(0.0..=100.0).contains(upper) {
                    return Err(format!("rsi bounds must be within [0, 100], got {lower}..{upper}"));
                }
                if lower > upper {
                    return Err(format!("lower {lower} > upper {upper}"));
                }
                Ok(())
            }
            Self::SupportResistance {
                min_distance_pct, ..
            } => non_negative("min_distance_pct", *min_distance_pct),
            Self::ConsecutiveDoji {
                doji_body_ratio,
                max_consecutive,
            } => {
                unit_interval("doji_body_ratio", *doji_body_ratio)?;
                if *max_consecutive == 0 {
                    return Err("max_consecutive must be at least 1".to_string());
                }
                Ok(())
            }
            Self::Rule { rule } => {
                if rule.conditions.is_empty() {
                    return Err("rule has no conditions".to_string());
                }
                Ok(())
            }
        }
    }
}

fn validate_windows(windows: &[TimeWindow], utc_offset_minutes: i32) -> Result<(), String> {
    if let Some(bad) = windows.iter().find(|w| !w.is_valid()) {
        return Err(format!("invalid window {}-{} (expected HH:MM)", bad.start, bad.end));
    }
    if utc_offset_minutes.abs() > 14 * 60 {
        return Err(format!("utc_offset_minutes out of range: {utc_offset_minutes}"));
    }
    Ok(())
}

fn non_negative(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{name} must be a non-negative number, got {value}"));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{name} must be within [0, 1], got {value}"));
    }
    Ok(())
}

/// A configured no-trade-zone filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// A mandatory filter firing fails the gate regardless of weight.
    #[serde(default)]
    pub mandatory: bool,
    /// Risk weight (NTP) contributed when the filter fires.
    #[serde(default = "default_weight")]
    pub weight: Decimal,
    #[serde(flatten)]
    pub kind: FilterKind,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, weight: Decimal, kind: FilterKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            mandatory: false,
            weight,
            kind,
        }
    }

    /// Builder: mark the filter mandatory.
    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Builder: disable the filter.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> RiskResult<()> {
        if self.name.trim().is_empty() {
            return Err(RiskError::Config("filter name must not be empty".to_string()));
        }
        if self.weight < Decimal::ZERO {
            return Err(RiskError::InvalidFilter {
                filter: self.name.clone(),
                reason: format!("weight must be non-negative, got {}", self.weight),
            });
        }
        self.kind.validate().map_err(|reason| RiskError::InvalidFilter {
            filter: self.name.clone(),
            reason,
        })
    }
}

/// Validate a filter set: each definition plus unique names.
pub fn validate_filters(filters: &[FilterDefinition]) -> RiskResult<()> {
    let mut seen = HashSet::new();
    for filter in filters {
        filter.validate()?;
        if !seen.insert(filter.name.as_str()) {
            return Err(RiskError::Config(format!(
                "duplicate filter name: {}",
                filter.name
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Individual checks
// ============================================================================

fn check_trading_hours(
    snapshot: &IndicatorSnapshot,
    windows: &[TimeWindow],
    utc_offset_minutes: i32,
) -> FilterOutcome {
    let Some(time) = snapshot_local_time(snapshot, utc_offset_minutes) else {
        return FilterOutcome::unavailable("snapshot time");
    };
    if windows.iter().any(|w| w.contains(time)) {
        FilterOutcome::Clear
    } else {
        FilterOutcome::Fired(format!("outside trading hours at {}", time.format("%H:%M")))
    }
}

fn check_blackout(
    snapshot: &IndicatorSnapshot,
    windows: &[TimeWindow],
    utc_offset_minutes: i32,
) -> FilterOutcome {
    let Some(time) = snapshot_local_time(snapshot, utc_offset_minutes) else {
        return FilterOutcome::unavailable("snapshot time");
    };
    match windows.iter().find(|w| w.contains(time)) {
        Some(w) => FilterOutcome::Fired(format!(
            "blackout {}-{} at {}",
            w.start,
            w.end,
            time.format("%H:%M")
        )),
        None => FilterOutcome::Clear,
    }
}

fn check_volume_surge(
    snapshot: &IndicatorSnapshot,
    indicator: &str,
    min_multiplier: f64,
) -> FilterOutcome {
    let Some(multiplier) = snapshot.number(indicator) else {
        return FilterOutcome::unavailable(indicator);
    };
    if multiplier < min_multiplier {
        FilterOutcome::Fired(format!(
            "volume multiplier {multiplier:.2} < {min_multiplier:.2}"
        ))
    } else {
        FilterOutcome::Clear
    }
}

fn check_candle_body(snapshot: &IndicatorSnapshot, min_body_ratio: f64) -> FilterOutcome {
    let Some(candle) = snapshot.last_candle() else {
        return FilterOutcome::unavailable("recent candles");
    };
    let ratio = candle.body_ratio();
    if ratio < min_body_ratio {
        FilterOutcome::Fired(format!("candle body ratio {ratio:.2} < {min_body_ratio:.2}"))
    } else {
        FilterOutcome::Clear
    }
}

fn check_round_number(
    snapshot: &IndicatorSnapshot,
    step: Decimal,
    min_distance: Decimal,
) -> FilterOutcome {
    let Some(distance) = snapshot.price.distance_to_multiple(step) else {
        return FilterOutcome::unavailable("round number step");
    };
    if distance < min_distance {
        FilterOutcome::Fired(format!(
            "price {} is {distance} points from a multiple of {step}",
            snapshot.price
        ))
    } else {
        FilterOutcome::Clear
    }
}

fn check_ma_distance(
    snapshot: &IndicatorSnapshot,
    indicator: &str,
    min_distance_pct: Option<f64>,
    max_distance_pct: Option<f64>,
) -> FilterOutcome {
    let ma = match snapshot.number(indicator) {
        Some(ma) if ma > 0.0 && ma.is_finite() => ma,
        _ => return FilterOutcome::unavailable(indicator),
    };
    let distance_pct = (snapshot.price_f64() - ma).abs() / ma * 100.0;

    if let Some(min) = min_distance_pct {
        if distance_pct < min {
            return FilterOutcome::Fired(format!(
                "price {distance_pct:.2}% from {indicator} < {min:.2}%"
            ));
        }
    }
    if let Some(max) = max_distance_pct {
        if distance_pct > max {
            return FilterOutcome::Fired(format!(
                "price {distance_pct:.2}% from {indicator} > {max:.2}%"
            ));
        }
    }
    FilterOutcome::Clear
}

fn check_rsi_dead_zone(
    snapshot: &IndicatorSnapshot,
    indicator: &str,
    lower: f64,
    upper: f64,
) -> FilterOutcome {
    let Some(rsi) = snapshot.number(indicator) else {
        return FilterOutcome::unavailable(indicator);
    };
    if (lower..=upper).contains(&rsi) {
        FilterOutcome::Fired(format!("rsi {rsi:.1} in dead zone [{lower}, {upper}]"))
    } else {
        FilterOutcome::Clear
    }
}

fn check_support_resistance(
    snapshot: &IndicatorSnapshot,
    support: &str,
    resistance: &str,
    min_distance_pct: f64,
) -> FilterOutcome {
    let price = snapshot.price_f64();
    if price <= 0.0 || price.is_nan() {
        return FilterOutcome::unavailable("price");
    }

    let levels: Vec<(&str, f64)> = [support, resistance]
        .into_iter()
        .filter_map(|key| snapshot.number(key).map(|level| (key, level)))
        .filter(|(_, level)| *level > 0.0 && level.is_finite())
        .collect();
    if levels.is_empty() {
        return FilterOutcome::unavailable("support/resistance levels");
    }

    for (key, level) in levels {
        let distance_pct = (price - level).abs() / price * 100.0;
        if distance_pct < min_distance_pct {
            return FilterOutcome::Fired(format!(
                "price within {distance_pct:.2}% of {key} {level}"
            ));
        }
    }
    FilterOutcome::Clear
}

fn check_consecutive_doji(
    snapshot: &IndicatorSnapshot,
    doji_body_ratio: f64,
    max_consecutive: usize,
) -> FilterOutcome {
    if snapshot.recent_candles.is_empty() {
        return FilterOutcome::unavailable("recent candles");
    }
    let run = snapshot
        .recent_candles
        .iter()
        .rev()
        .take_while(|c| c.body_ratio() <= doji_body_ratio)
        .count();
    if run >= max_consecutive {
        FilterOutcome::Fired(format!("{run} consecutive doji candles (max {max_consecutive})"))
    } else {
        FilterOutcome::Clear
    }
}
