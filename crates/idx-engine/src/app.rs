//! Engine orchestration.
//!
//! Coordinates the decision engine with the position book for one instrument:
//! - snapshots are published atomically into a [`SnapshotSlot`]
//! - a periodic tick evaluates entries (flat) or strategy reversals (open)
//! - every price update is routed to all open positions
//! - decisions and exits are emitted fire-and-forget on an event channel

use std::sync::Arc;
use std::time::Duration;

use idx_core::{decimal_to_f64, ExitEvent, ExitReason, IndicatorSnapshot, PriceUpdate};
use idx_decision::{ConfigStore, DecisionEngine, EntryDecision};
use idx_position::PositionBook;
use idx_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;

/// Output of the engine, one JSON object per line when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Entry(EntryDecision),
    Rejected(EntryDecision),
    Exit(ExitEvent),
}

/// Input to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineInput {
    Snapshot(IndicatorSnapshot),
    Price(PriceUpdate),
}

/// Latest published indicator snapshot.
///
/// Readers get a whole snapshot or none; publishing replaces the pointer.
#[derive(Debug, Default)]
pub struct SnapshotSlot {
    latest: RwLock<Option<Arc<IndicatorSnapshot>>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: IndicatorSnapshot) {
        *self.latest.write() = Some(Arc::new(snapshot));
    }

    pub fn latest(&self) -> Option<Arc<IndicatorSnapshot>> {
        self.latest.read().clone()
    }
}

/// Decision engine plus position state for one instrument.
pub struct Engine {
    instrument: String,
    decisions: DecisionEngine,
    positions: PositionBook,
    snapshots: SnapshotSlot,
    metrics: Arc<Metrics>,
    events: Option<mpsc::Sender<EngineEvent>>,
    auto_open: bool,
    /// Timestamp of the last snapshot evaluated, so a stale snapshot is
    /// not re-evaluated on every tick.
    last_evaluated_ms: Mutex<Option<u64>>,
}

impl Engine {
    pub fn new(config: &AppConfig, store: Arc<ConfigStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            instrument: config.instrument.clone(),
            decisions: DecisionEngine::new(store),
            positions: PositionBook::new(),
            snapshots: SnapshotSlot::new(),
            metrics,
            events: None,
            auto_open: config.auto_open,
            last_evaluated_ms: Mutex::new(None),
        }
    }

    /// Emit events on `sender` in addition to returning them.
    pub fn with_events(mut self, sender: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        self.decisions.store()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn handle_input(&self, input: EngineInput) -> Vec<EngineEvent> {
        match input {
            EngineInput::Snapshot(snapshot) => {
                self.on_snapshot(snapshot);
                Vec::new()
            }
            EngineInput::Price(update) => self.on_price(update),
        }
    }

    /// Publish a new snapshot for the next evaluation.
    pub fn on_snapshot(&self, snapshot: IndicatorSnapshot) {
        if snapshot.instrument != self.instrument {
            warn!(
                expected = %self.instrument,
                received = %snapshot.instrument,
                "Ignoring snapshot for another instrument"
            );
            return;
        }
        self.snapshots.publish(snapshot);
    }

    /// Evaluate the latest snapshot once.
    ///
    /// Flat: look for an entry. Open: check each position for a strategy reversal.
    pub fn evaluate_tick(&self) -> Vec<EngineEvent> {
        let Some(snapshot) = self.snapshots.latest() else {
            return Vec::new();
        };
        {
            let mut last = self.last_evaluated_ms.lock();
            if *last == Some(snapshot.timestamp_ms) {
                return Vec::new();
            }
            *last = Some(snapshot.timestamp_ms);
        }

        let open = self.positions.open_directions();
        let events = if open.is_empty() {
            self.evaluate_entry(&snapshot)
        } else {
            self.evaluate_reversals(&snapshot, open)
        };

        for event in &events {
            self.emit(event.clone());
        }
        events
    }

    /// Route a price update to every open position.
    pub fn on_price(&self, update: PriceUpdate) -> Vec<EngineEvent> {
        let sweep = self.positions.on_price(update);
        if sweep.milestones_hit > 0 {
            self.metrics.milestones_hit(sweep.milestones_hit);
        }

        let events: Vec<EngineEvent> = sweep
            .exits
            .into_iter()
            .map(|exit| {
                self.metrics.exit(exit.reason);
                EngineEvent::Exit(exit)
            })
            .collect();

        if !events.is_empty() {
            self.positions.prune_closed();
            self.metrics.set_open_positions(self.positions.len());
        }
        for event in &events {
            self.emit(event.clone());
        }
        events
    }

    fn evaluate_entry(&self, snapshot: &IndicatorSnapshot) -> Vec<EngineEvent> {
        let decision = self.decisions.evaluate_entry(snapshot, false);
        self.record_decision(&decision);

        if !decision.is_actionable() {
            return vec![EngineEvent::Rejected(decision)];
        }

        if self.auto_open {
            self.open_from(&decision);
        }
        vec![EngineEvent::Entry(decision)]
    }

    fn open_from(&self, decision: &EntryDecision) {
        let (Some(direction), Some(profile)) = (decision.direction, decision.risk_profile.clone())
        else {
            return;
        };
        let quantity = profile.quantity;
        match self.positions.open_new(
            direction,
            decision.price,
            quantity,
            decision.timestamp_ms,
            profile,
        ) {
            Ok(id) => {
                info!(
                    position_id = %id,
                    scenario = ?decision.scenario,
                    "Position opened from entry decision"
                );
                self.metrics.set_open_positions(self.positions.len());
            }
            Err(e) => error!(error = %e, "Failed to open position from entry decision"),
        }
    }

    fn evaluate_reversals(
        &self,
        snapshot: &IndicatorSnapshot,
        open: Vec<(idx_core::PositionId, idx_core::Direction)>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        for (id, direction) in open {
            let check = self.decisions.evaluate_reversal(snapshot, direction);
            if !check.triggered {
                continue;
            }
            match self.positions.close(
                &id,
                ExitReason::StrategyReversal,
                snapshot.price,
                snapshot.timestamp_ms,
            ) {
                Ok(Some(exit)) => {
                    self.metrics.exit(exit.reason);
                    events.push(EngineEvent::Exit(exit));
                }
                Ok(None) => {}
                Err(e) => warn!(position_id = %id, error = %e, "Strategy reversal close failed"),
            }
        }
        if !events.is_empty() {
            self.positions.prune_closed();
            self.metrics.set_open_positions(self.positions.len());
        }
        events
    }

    fn record_decision(&self, decision: &EntryDecision) {
        if let Some(risk) = &decision.risk {
            self.metrics.risk_weight(decimal_to_f64(risk.total_weight));
            for fired in &risk.fired {
                self.metrics.filter_fired(&fired.name);
            }
            self.metrics.rule_errors(risk.rule_errors as usize);
        }
        let scoring_errors: u32 = decision.scores.iter().map(|s| s.rule_errors()).sum();
        if scoring_errors > 0 {
            self.metrics.rule_errors(scoring_errors as usize);
        }

        match (decision.direction, &decision.scenario) {
            (Some(direction), Some(scenario)) if decision.is_actionable() => {
                self.metrics.decision(direction, scenario);
            }
            _ => {
                for rejection in &decision.rejections {
                    self.metrics.rejection(rejection.label());
                }
            }
        }
    }

    /// Fire-and-forget: a full or closed channel never blocks evaluation.
    fn emit(&self, event: EngineEvent) {
        let Some(sender) = &self.events else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(event = event_kind(&event), "Event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event channel closed, dropping event");
            }
        }
    }
}

fn event_kind(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::Entry(_) => "entry",
        EngineEvent::Rejected(_) => "rejected",
        EngineEvent::Exit(_) => "exit",
    }
}

/// Spawn the periodic evaluation task for one instrument.
///
/// Runs until `token` is cancelled or the input channel closes.
pub fn spawn_instrument_task(
    engine: Arc<Engine>,
    mut inputs: mpsc::Receiver<EngineInput>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(instrument = %engine.instrument(), ?interval, "Instrument task started");

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    info!(instrument = %engine.instrument(), "Instrument task cancelled");
                    break;
                }

                // Ahead of inputs so a price backlog cannot starve evaluation.
                _ = ticker.tick() => {
                    engine.evaluate_tick();
                }

                maybe_input = inputs.recv() => {
                    match maybe_input {
                        Some(input) => {
                            engine.handle_input(input);
                        }
                        None => {
                            engine.evaluate_tick();
                            info!(instrument = %engine.instrument(), "Input channel closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}
