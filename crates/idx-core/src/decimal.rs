//! Precision-safe decimal types for index prices and contract quantities.
//!
//! Uses `rust_decimal` for exact decimal arithmetic so that milestone ladders
//! and trailing stops land on exact price levels.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

use crate::direction::Direction;

/// Index price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with quantities in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Move `points` in the favorable direction for `direction`.
    ///
    /// Long: `self + points`, Short: `self - points`.
    #[inline]
    pub fn favorable(&self, direction: Direction, points: Decimal) -> Self {
        match direction {
            Direction::Long => Self(self.0 + points),
            Direction::Short => Self(self.0 - points),
        }
    }

    /// Move `points` in the adverse direction for `direction`.
    #[inline]
    pub fn adverse(&self, direction: Direction, points: Decimal) -> Self {
        self.favorable(direction.opposite(), points)
    }

    /// Signed excursion from `entry` in points, positive when favorable.
    #[inline]
    pub fn excursion_from(&self, entry: Price, direction: Direction) -> Decimal {
        match direction {
            Direction::Long => self.0 - entry.0,
            Direction::Short => entry.0 - self.0,
        }
    }

    /// True when `self` is at or beyond `level` in the favorable direction.
    #[inline]
    pub fn has_reached(&self, level: Price, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.0 >= level.0,
            Direction::Short => self.0 <= level.0,
        }
    }

    /// True when `self` is strictly better than `other` for `direction`.
    #[inline]
    pub fn is_better_than(&self, other: Price, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.0 > other.0,
            Direction::Short => self.0 < other.0,
        }
    }

    /// Calculate percentage difference from another price.
    #[inline]
    pub fn pct_from(&self, other: Price) -> Option<Decimal> {
        if other.is_zero() {
            return None;
        }
        Some((self.0 - other.0) / other.0 * Decimal::from(100))
    }

    /// Absolute distance to the nearest multiple of `step`.
    #[inline]
    pub fn distance_to_multiple(&self, step: Decimal) -> Option<Decimal> {
        if step.is_zero() {
            return None;
        }
        let rem = (self.0 % step).abs();
        Some(rem.min(step.abs() - rem))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Contract quantity (lots) with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(pub Decimal);

impl Quantity {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Calculate notional value: quantity * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Quantity {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Quantity {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}
