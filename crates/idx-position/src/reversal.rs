//! Moving-average price reversal detector.
//!
//! Each update is classified relative to the average of the most recent
//! `ma_window` observations (including the current one):
//! - beyond `+threshold_pct` in the position's favor: continuation
//! - beyond `threshold_pct` against the position: reversal
//! - otherwise neutral
//!
//! A reversal recommends an immediate exit; `neutral_timeout` consecutive
//! neutral updates recommend a timeout exit, once per neutral run. The
//! detector only recommends.

use std::collections::VecDeque;
use std::fmt;

use idx_core::{decimal_to_f64, Direction, Price, ReversalConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceClass {
    Continuation,
    Reversal,
    Neutral,
}

/// Exit recommendation for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReversalSignal {
    Hold,
    Reversal,
    NeutralTimeout,
}

impl fmt::Display for ReversalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hold => write!(f, "HOLD"),
            Self::Reversal => write!(f, "REVERSAL"),
            Self::NeutralTimeout => write!(f, "NEUTRAL_TIMEOUT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReversalObservation {
    pub class: PriceClass,
    pub moving_average: Price,
    /// Signed deviation from the average in percent, positive in the position's favor.
    pub deviation_pct: f64,
    pub consecutive_neutral: u32,
    pub signal: ReversalSignal,
}

#[derive(Debug, Clone)]
pub struct PriceReversalDetector {
    config: ReversalConfig,
    direction: Direction,
    history: VecDeque<Price>,
    consecutive_neutral: u32,
}

impl PriceReversalDetector {
    pub fn new(config: ReversalConfig, direction: Direction) -> Self {
        Self {
            config,
            direction,
            history: VecDeque::with_capacity(config.history_capacity),
            consecutive_neutral: 0,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn consecutive_neutral(&self) -> u32 {
        self.consecutive_neutral
    }

    /// Record `price` and classify it.
    pub fn observe(&mut self, price: Price) -> ReversalObservation {
        let capacity = self.config.history_capacity.max(1);
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(price);

        let moving_average = self.moving_average();
        let deviation_pct = if moving_average.is_zero() {
            0.0
        } else {
            let raw = (price.inner() - moving_average.inner()) / moving_average.inner()
                * Decimal::from(100);
            decimal_to_f64(raw) * f64::from(self.direction.sign())
        };

        let threshold = self.config.threshold_pct;
        let class = if deviation_pct > threshold {
            PriceClass::Continuation
        } else if deviation_pct < -threshold {
            PriceClass::Reversal
        } else {
            PriceClass::Neutral
        };

        let signal = match class {
            PriceClass::Continuation => {
                self.consecutive_neutral = 0;
                ReversalSignal::Hold
            }
            PriceClass::Reversal => {
                self.consecutive_neutral = 0;
                ReversalSignal::Reversal
            }
            PriceClass::Neutral => {
                self.consecutive_neutral = self.consecutive_neutral.saturating_add(1);
                // Fires once per neutral run; only a non-neutral update re-arms it.
                if self.consecutive_neutral == self.config.neutral_timeout {
                    ReversalSignal::NeutralTimeout
                } else {
                    ReversalSignal::Hold
                }
            }
        };
        let consecutive_neutral = self.consecutive_neutral;

        trace!(
            price = %price,
            moving_average = %moving_average,
            deviation_pct,
            class = ?class,
            consecutive_neutral,
            "Reversal detector update"
        );

        ReversalObservation {
            class,
            moving_average,
            deviation_pct,
            consecutive_neutral,
            signal,
        }
    }

    /// Mean of the last `ma_window` observations (fewer while warming up).
    fn moving_average(&self) -> Price {
        let window = self.config.ma_window.max(1).min(self.history.len());
        if window == 0 {
            return Price::ZERO;
        }
        let sum: Decimal = self
            .history
            .iter()
            .rev()
            .take(window)
            .map(Price::inner)
            .sum();
        Price::new(sum / Decimal::from(window as u64))
    }
}
