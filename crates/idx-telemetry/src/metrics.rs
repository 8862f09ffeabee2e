//! Prometheus metrics for the decision engine.
//!
//! Every series lives in a `Registry` owned by one [`Metrics`] instance,
//! which is shared as `Arc<Metrics>` by the components of a single engine.
//! Two engines in one process therefore never share counters.

use std::fmt;

use idx_core::{Direction, ExitReason};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::error::TelemetryResult;

const RISK_WEIGHT_BUCKETS: &[f64] = &[0.0, 0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 8.0, 13.0];

/// Engine metrics, registered into an instance-owned registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    decisions_total: IntCounterVec,
    rejections_total: IntCounterVec,
    filter_fired_total: IntCounterVec,
    risk_weight: Histogram,
    exits_total: IntCounterVec,
    milestones_hit_total: IntCounter,
    open_positions: IntGauge,
    rule_errors_total: IntCounter,
    config_reloads_total: IntCounterVec,
}

impl Metrics {
    /// Create and register all series in a fresh registry.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let decisions_total = IntCounterVec::new(
            Opts::new("idx_decisions_total", "Actionable entry decisions"),
            &["direction", "scenario"],
        )?;
        let rejections_total = IntCounterVec::new(
            Opts::new("idx_rejections_total", "Rejected entry evaluations"),
            &["reason"],
        )?;
        let filter_fired_total = IntCounterVec::new(
            Opts::new("idx_filter_fired_total", "Risk filters fired"),
            &["filter"],
        )?;
        let risk_weight = Histogram::with_opts(
            HistogramOpts::new("idx_risk_weight", "Accumulated risk-gate weight per evaluation")
                .buckets(RISK_WEIGHT_BUCKETS.to_vec()),
        )?;
        let exits_total = IntCounterVec::new(
            Opts::new("idx_exits_total", "Position exits"),
            &["reason"],
        )?;
        let milestones_hit_total =
            IntCounter::new("idx_milestones_hit_total", "Milestones reached by positions")?;
        let open_positions = IntGauge::new("idx_open_positions", "Currently open positions")?;
        let rule_errors_total = IntCounter::new(
            "idx_rule_errors_total",
            "Rule evaluation errors recovered as false",
        )?;
        let config_reloads_total = IntCounterVec::new(
            Opts::new("idx_config_reloads_total", "Strategy configuration reloads"),
            &["result"],
        )?;

        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(filter_fired_total.clone()))?;
        registry.register(Box::new(risk_weight.clone()))?;
        registry.register(Box::new(exits_total.clone()))?;
        registry.register(Box::new(milestones_hit_total.clone()))?;
        registry.register(Box::new(open_positions.clone()))?;
        registry.register(Box::new(rule_errors_total.clone()))?;
        registry.register(Box::new(config_reloads_total.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            rejections_total,
            filter_fired_total,
            risk_weight,
            exits_total,
            milestones_hit_total,
            open_positions,
            rule_errors_total,
            config_reloads_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all series in the Prometheus text format.
    pub fn encode_text(&self) -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    // =========================================================================
    // Entry decisions
    // =========================================================================

    pub fn decision(&self, direction: Direction, scenario: &str) {
        self.decisions_total
            .with_label_values(&[direction.as_str(), scenario])
            .inc();
    }

    pub fn rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn filter_fired(&self, filter: &str) {
        self.filter_fired_total.with_label_values(&[filter]).inc();
    }

    pub fn risk_weight(&self, weight: f64) {
        self.risk_weight.observe(weight);
    }

    pub fn rule_errors(&self, count: usize) {
        self.rule_errors_total.inc_by(count as u64);
    }

    // =========================================================================
    // Positions
    // =========================================================================

    pub fn exit(&self, reason: ExitReason) {
        self.exits_total.with_label_values(&[reason.as_str()]).inc();
    }

    pub fn milestones_hit(&self, count: usize) {
        self.milestones_hit_total.inc_by(count as u64);
    }

    pub fn set_open_positions(&self, count: usize) {
        self.open_positions.set(count as i64);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Record a reload attempt; `result` is `"ok"` or `"rejected"`.
    pub fn config_reload(&self, result: &str) {
        self.config_reloads_total.with_label_values(&[result]).inc();
    }

    // =========================================================================
    // Readers (session summary)
    // =========================================================================

    pub(crate) fn decisions_vec(&self) -> &IntCounterVec {
        &self.decisions_total
    }

    pub(crate) fn rejections_vec(&self) -> &IntCounterVec {
        &self.rejections_total
    }

    pub(crate) fn exits_vec(&self) -> &IntCounterVec {
        &self.exits_total
    }

    pub(crate) fn filter_fired_vec(&self) -> &IntCounterVec {
        &self.filter_fired_total
    }

    pub(crate) fn config_reloads_vec(&self) -> &IntCounterVec {
        &self.config_reloads_total
    }

    pub fn milestones_hit_count(&self) -> u64 {
        self.milestones_hit_total.get()
    }

    pub fn rule_error_count(&self) -> u64 {
        self.rule_errors_total.get()
    }

    pub fn open_position_count(&self) -> i64 {
        self.open_positions.get()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("open_positions", &self.open_positions.get())
            .field("milestones_hit_total", &self.milestones_hit_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_do_not_share_state() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.milestones_hit(3);
        assert_eq!(a.milestones_hit_count(), 3);
        assert_eq!(b.milestones_hit_count(), 0);
    }

    #[test]
    fn test_encode_text_contains_series() {
        let metrics = Metrics::new().unwrap();
        metrics.decision(Direction::Long, "breakout");
        metrics.exit(ExitReason::TrailingStoplossHit);
        metrics.risk_weight(2.0);
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("idx_decisions_total{direction=\"long\",scenario=\"breakout\"} 1"));
        assert!(text.contains("idx_exits_total{reason=\"TRAILING_STOPLOSS_HIT\"} 1"));
        assert!(text.contains("idx_risk_weight_count 1"));
    }

    #[test]
    fn test_open_positions_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_open_positions(2);
        assert_eq!(metrics.open_position_count(), 2);
        metrics.set_open_positions(0);
        assert_eq!(metrics.open_position_count(), 0);
    }
}
