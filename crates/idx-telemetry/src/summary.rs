//! Session summary output.
//!
//! Reads the engine counters at shutdown and logs a compact report:
//! decisions per direction, rejections and exits per reason, the most
//! frequently fired filters, milestones hit and reload outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use prometheus::IntCounterVec;
use serde::Serialize;
use tracing::info;

use crate::metrics::Metrics;

/// Snapshot of the session counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub instrument: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Keyed by direction.
    pub decisions: BTreeMap<String, u64>,
    pub rejections: BTreeMap<String, u64>,
    pub exits: BTreeMap<String, u64>,
    pub filters_fired: BTreeMap<String, u64>,
    pub config_reloads: BTreeMap<String, u64>,
    pub milestones_hit: u64,
    pub rule_errors: u64,
    pub open_positions: i64,
}

impl SessionSummary {
    pub fn collect(instrument: impl Into<String>, started_at: DateTime<Utc>, metrics: &Metrics) -> Self {
        Self {
            instrument: instrument.into(),
            started_at,
            ended_at: Utc::now(),
            decisions: totals_by_label(metrics.decisions_vec(), "direction"),
            rejections: totals_by_label(metrics.rejections_vec(), "reason"),
            exits: totals_by_label(metrics.exits_vec(), "reason"),
            filters_fired: totals_by_label(metrics.filter_fired_vec(), "filter"),
            config_reloads: totals_by_label(metrics.config_reloads_vec(), "result"),
            milestones_hit: metrics.milestones_hit_count(),
            rule_errors: metrics.rule_error_count(),
            open_positions: metrics.open_position_count(),
        }
    }

    pub fn total_decisions(&self) -> u64 {
        self.decisions.values().sum()
    }

    pub fn total_exits(&self) -> u64 {
        self.exits.values().sum()
    }

    /// Filters ordered by fire count, most frequent first.
    pub fn top_filters(&self, limit: usize) -> Vec<(&str, u64)> {
        let mut filters: Vec<(&str, u64)> = self
            .filters_fired
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        filters.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        filters.truncate(limit);
        filters
    }

    pub fn log(&self) {
        let duration = self.ended_at - self.started_at;
        let hours = duration.num_hours();
        let minutes = duration.num_minutes() % 60;

        info!("========== Session Summary ==========");
        info!(
            "Instrument: {} from {} ({} hours {} minutes)",
            self.instrument,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            hours,
            minutes
        );
        info!(
            "  Entries: {} {:?}",
            self.total_decisions(),
            self.decisions
        );
        info!("  Rejections: {:?}", self.rejections);
        info!("  Exits: {} {:?}", self.total_exits(), self.exits);
        info!("  Top filters: {:?}", self.top_filters(5));
        info!(
            "  Milestones hit: {}, rule errors: {}, still open: {}",
            self.milestones_hit, self.rule_errors, self.open_positions
        );
        if !self.config_reloads.is_empty() {
            info!("  Config reloads: {:?}", self.config_reloads);
        }
        info!("=====================================");
    }
}

/// Sum a counter vector's samples grouped by one label.
fn totals_by_label(counter: &IntCounterVec, label: &str) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for family in counter.collect() {
        for metric in family.get_metric() {
            let Some(pair) = metric.get_label().iter().find(|p| p.get_name() == label) else {
                continue;
            };
            let value = metric.get_counter().get_value() as u64;
            *totals.entry(pair.get_value().to_string()).or_insert(0) += value;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use idx_core::{Direction, ExitReason};

    #[test]
    fn test_collect_groups_by_label() {
        let metrics = Metrics::new().unwrap();
        metrics.decision(Direction::Long, "breakout");
        metrics.decision(Direction::Long, "pullback");
        metrics.decision(Direction::Short, "breakdown");
        metrics.exit(ExitReason::TargetHit);
        metrics.exit(ExitReason::TargetHit);
        metrics.rejection("mandatory_filter");
        metrics.milestones_hit(4);

        let summary = SessionSummary::collect("NIFTY", Utc::now(), &metrics);
        assert_eq!(summary.decisions.get("long"), Some(&2));
        assert_eq!(summary.decisions.get("short"), Some(&1));
        assert_eq!(summary.total_decisions(), 3);
        assert_eq!(summary.exits.get("TARGET_HIT"), Some(&2));
        assert_eq!(summary.rejections.get("mandatory_filter"), Some(&1));
        assert_eq!(summary.milestones_hit, 4);
    }

    #[test]
    fn test_top_filters_ordering() {
        let metrics = Metrics::new().unwrap();
        for _ in 0..3 {
            metrics.filter_fired("rsi_dead_zone");
        }
        metrics.filter_fired("trading_hours");
        metrics.filter_fired("candle_body");

        let summary = SessionSummary::collect("NIFTY", Utc::now(), &metrics);
        let top = summary.top_filters(2);
        assert_eq!(top, vec![("rsi_dead_zone", 3), ("candle_body", 1)]);
    }

    #[test]
    fn test_empty_session() {
        let metrics = Metrics::new().unwrap();
        let summary = SessionSummary::collect("NIFTY", Utc::now(), &metrics);
        assert_eq!(summary.total_decisions(), 0);
        assert!(summary.exits.is_empty());
        summary.log();
    }
}
