//! Typed field accessors used as the fallback value source of a rule.
//!
//! Each evaluated object type registers its addressable fields up front as
//! plain function pointers, so a condition can only reach fields that were
//! explicitly exposed.

use std::collections::HashMap;
use std::fmt;

use idx_core::{decimal_to_f64, IndicatorSnapshot, IndicatorValue};

/// Getter for one named field of `T`.
pub type Accessor<T> = fn(&T) -> Option<IndicatorValue>;

/// Map from field name to typed getter.
pub struct AccessorRegistry<T> {
    getters: HashMap<&'static str, Accessor<T>>,
}

impl<T> AccessorRegistry<T> {
    pub fn new() -> Self {
        Self {
            getters: HashMap::new(),
        }
    }

    /// Builder: expose a field.
    #[must_use]
    pub fn with(mut self, field: &'static str, getter: Accessor<T>) -> Self {
        self.getters.insert(field, getter);
        self
    }

    pub fn register(&mut self, field: &'static str, getter: Accessor<T>) {
        self.getters.insert(field, getter);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.getters.contains_key(field)
    }

    /// Resolve `field` on `object`.
    ///
    /// Outer `None`: field not registered. Inner `None`: registered but
    /// the object has no value for it right now.
    pub fn resolve(&self, object: &T, field: &str) -> Option<Option<IndicatorValue>> {
        self.getters.get(field).map(|getter| getter(object))
    }

    /// Registered field names, sorted.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.getters.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<T> Default for AccessorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AccessorRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorRegistry")
            .field("fields", &self.fields())
            .finish()
    }
}

/// Fields of an `IndicatorSnapshot` addressable from rules.
pub fn snapshot_registry() -> AccessorRegistry<IndicatorSnapshot> {
    AccessorRegistry::<IndicatorSnapshot>::new()
        .with("price", |s| Some(IndicatorValue::Number(s.price_f64())))
        .with("timestamp_ms", |s| {
            Some(IndicatorValue::Number(s.timestamp_ms as f64))
        })
        .with("instrument", |s| {
            Some(IndicatorValue::Text(s.instrument.clone()))
        })
        .with("timeframe", |s| Some(IndicatorValue::Text(s.timeframe.clone())))
        .with("candle_count", |s| {
            Some(IndicatorValue::Number(s.recent_candles.len() as f64))
        })
        .with("last_body_ratio", |s| {
            s.last_candle()
                .map(|c| IndicatorValue::Number(c.body_ratio()))
        })
        .with("last_close", |s| {
            s.last_candle()
                .map(|c| IndicatorValue::Number(decimal_to_f64(c.close.inner())))
        })
}
