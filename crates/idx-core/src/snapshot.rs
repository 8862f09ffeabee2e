//! Indicator snapshots and price updates.
//!
//! Snapshots are immutable value objects produced by the indicator pipeline
//! once per refresh. They are published behind an `Arc` and never mutated
//! after construction, so readers cannot observe a partial update.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;

/// A single named indicator value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl IndicatorValue {
    /// Interpret the value as a boolean signal.
    ///
    /// Numbers are truthy when non-zero and not NaN, text when non-empty.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short type name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for IndicatorValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for IndicatorValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for IndicatorValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for IndicatorValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// OHLC shape of a recent candle, used by candle-shape filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleSummary {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
}

impl CandleSummary {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            open: Price::new(open),
            high: Price::new(high),
            low: Price::new(low),
            close: Price::new(close),
        }
    }

    /// Body size relative to the full range, in `[0, 1]`.
    ///
    /// A zero-range candle has ratio 0 (treated as a doji).
    pub fn body_ratio(&self) -> f64 {
        let range = self.high.inner() - self.low.inner();
        if range <= Decimal::ZERO {
            return 0.0;
        }
        let body = (self.close.inner() - self.open.inner()).abs();
        decimal_to_f64(body / range).clamp(0.0, 1.0)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Immutable indicator snapshot for one instrument/timeframe refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Instrument symbol (e.g. the tracked index).
    pub instrument: String,
    /// Timeframe label the indicators were computed on (e.g. "5m").
    #[serde(default)]
    pub timeframe: String,
    /// Price at which the snapshot was taken.
    pub price: Price,
    /// Snapshot timestamp (Unix ms).
    pub timestamp_ms: u64,
    /// Named indicator values.
    #[serde(default)]
    pub values: BTreeMap<String, IndicatorValue>,
    /// Recent candles, oldest first.
    #[serde(default)]
    pub recent_candles: Vec<CandleSummary>,
}

impl IndicatorSnapshot {
    pub fn new(instrument: impl Into<String>, price: Price, timestamp_ms: u64) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe: String::new(),
            price,
            timestamp_ms,
            values: BTreeMap::new(),
            recent_candles: Vec::new(),
        }
    }

    /// Builder: add an indicator value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<IndicatorValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder: set the recent candles (oldest first).
    #[must_use]
    pub fn with_candles(mut self, candles: Vec<CandleSummary>) -> Self {
        self.recent_candles = candles;
        self
    }

    /// Builder: set the timeframe label.
    #[must_use]
    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = timeframe.into();
        self
    }

    pub fn value(&self, key: &str) -> Option<&IndicatorValue> {
        self.values.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(IndicatorValue::as_number)
    }

    /// Boolean view of an indicator; absent keys are `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(IndicatorValue::truthy)
    }

    pub fn last_candle(&self) -> Option<&CandleSummary> {
        self.recent_candles.last()
    }

    /// Snapshot time as UTC datetime.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp_ms)
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Snapshot price as `f64` for comparisons against indicator values.
    pub fn price_f64(&self) -> f64 {
        decimal_to_f64(self.price.inner())
    }
}

/// A single tick delivered to every open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub price: Price,
    pub timestamp_ms: u64,
}

impl PriceUpdate {
    pub fn new(price: Price, timestamp_ms: u64) -> Self {
        Self {
            price,
            timestamp_ms,
        }
    }
}

/// Lossy conversion used at the boundary between prices and indicator math.
pub fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_truthy() {
        assert!(IndicatorValue::Bool(true).truthy());
        assert!(!IndicatorValue::Bool(false).truthy());
        assert!(IndicatorValue::Number(1.5).truthy());
        assert!(!IndicatorValue::Number(0.0).truthy());
        assert!(!IndicatorValue::Number(f64::NAN).truthy());
        assert!(IndicatorValue::Text("bullish".into()).truthy());
        assert!(!IndicatorValue::Text(String::new()).truthy());
    }

    #[test]
    fn test_body_ratio() {
        let candle = CandleSummary::new(dec!(100), dec!(110), dec!(95), dec!(106));
        let ratio = candle.body_ratio();
        assert!((ratio - 0.4).abs() < 1e-9);

        let flat = CandleSummary::new(dec!(100), dec!(100), dec!(100), dec!(100));
        assert_eq!(flat.body_ratio(), 0.0);
    }

    #[test]
    fn test_snapshot_lookup() {
        let snapshot = IndicatorSnapshot::new("NIFTY", Price::new(dec!(22500)), 1_000)
            .with_value("rsi", 61.0)
            .with_value("ema_cross_up", true);

        assert_eq!(snapshot.number("rsi"), Some(61.0));
        assert!(snapshot.flag("ema_cross_up"));
        assert!(!snapshot.flag("missing"));
        assert_eq!(snapshot.number("ema_cross_up"), None);
    }

    #[test]
    fn test_snapshot_deserializes_untagged_values() {
        let json = r#"{
            "instrument": "NIFTY",
            "price": "22500.5",
            "timestamp_ms": 1700000000000,
            "values": { "rsi": 48.2, "ema_cross_up": true, "trend": "up" }
        }"#;
        let snapshot: IndicatorSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.price, Price::new(dec!(22500.5)));
        assert_eq!(snapshot.value("trend"), Some(&IndicatorValue::Text("up".into())));
        assert!(snapshot.recent_candles.is_empty());
    }
}
