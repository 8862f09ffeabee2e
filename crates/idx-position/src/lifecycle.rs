//! Per-position lifecycle state machine.
//!
//! `OPEN -> CLOSED` (terminal). On every price update while open:
//!
//! 1. verify the milestone ladder (violation: close with `STATE_ERROR`)
//! 2. update min/max observed price
//! 3. mark reached milestones; the stop trails to the highest hit target
//! 4. move the stop to entry once the breakeven trigger is reached
//! 5. target check, then stop check
//! 6. reversal detector, only if the position is still open
//!
//! Stop/target breaches are applied before the reversal detector so a hard
//! breach is never overridden by a softer signal on the same tick.

use std::fmt;

use idx_core::{
    Direction, ExitEvent, ExitReason, PositionId, Price, PriceUpdate, Quantity, RiskProfile,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{PositionError, PositionResult};
use crate::milestone::{Milestone, MilestoneLadder};
use crate::reversal::{PriceReversalDetector, ReversalObservation, ReversalSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Open,
    Closed,
}

/// What last set the stop price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSource {
    /// Configured initial stop.
    Initial,
    /// Moved to the entry price.
    Breakeven,
    /// Trailed to the target of this milestone index.
    Milestone(u32),
}

impl StopSource {
    pub fn is_trailing(&self) -> bool {
        !matches!(self, Self::Initial)
    }
}

impl fmt::Display for StopSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Breakeven => write!(f, "breakeven"),
            Self::Milestone(i) => write!(f, "milestone_{i}"),
        }
    }
}

/// Result of one price update.
#[derive(Debug, Clone, Default)]
pub struct UpdateOutcome {
    pub exit: Option<ExitEvent>,
    pub milestones_hit: Vec<Milestone>,
    pub observation: Option<ReversalObservation>,
}

impl UpdateOutcome {
    pub fn is_exit(&self) -> bool {
        self.exit.is_some()
    }
}

/// Read-only view of a position for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub id: PositionId,
    pub direction: Direction,
    pub entry_price: Price,
    pub entry_timestamp_ms: u64,
    pub quantity: Quantity,
    pub stop_price: Price,
    pub stop_source: StopSource,
    pub target_price: Price,
    pub state: PositionState,
    pub milestones_hit: usize,
    pub min_price: Price,
    pub max_price: Price,
    pub exit: Option<ExitEvent>,
}

/// An open (or closed) position and its exit state.
#[derive(Debug, Clone)]
pub struct ManagedPosition {
    id: PositionId,
    direction: Direction,
    entry_price: Price,
    entry_timestamp_ms: u64,
    quantity: Quantity,
    profile: RiskProfile,
    stop_price: Price,
    stop_source: StopSource,
    target_price: Price,
    state: PositionState,
    ladder: MilestoneLadder,
    detector: PriceReversalDetector,
    min_price: Price,
    max_price: Price,
    last_price: Price,
    exit: Option<ExitEvent>,
}

impl ManagedPosition {
    /// Open a position; stop and target are placed from the profile distances.
    pub fn new(
        id: PositionId,
        direction: Direction,
        entry_price: Price,
        quantity: Quantity,
        timestamp_ms: u64,
        profile: RiskProfile,
    ) -> PositionResult<Self> {
        profile.validate()?;
        if !entry_price.is_positive() {
            return Err(PositionError::InvalidProfile(idx_core::CoreError::InvalidPrice(
                format!("entry price must be positive, got {entry_price}"),
            )));
        }

        let stop_price = entry_price.adverse(direction, profile.stop_distance);
        let target_price = entry_price.favorable(direction, profile.target_distance);
        let ladder = MilestoneLadder::new(entry_price, direction, profile.milestones)
            .with_ceiling(target_price);
        let detector = PriceReversalDetector::new(profile.reversal, direction);

        info!(
            position_id = %id,
            direction = %direction,
            entry = %entry_price,
            stop = %stop_price,
            target = %target_price,
            quantity = %quantity,
            "Position opened"
        );

        Ok(Self {
            id,
            direction,
            entry_price,
            entry_timestamp_ms: timestamp_ms,
            quantity,
            profile,
            stop_price,
            stop_source: StopSource::Initial,
            target_price,
            state: PositionState::Open,
            ladder,
            detector,
            min_price: entry_price,
            max_price: entry_price,
            last_price: entry_price,
            exit: None,
        })
    }

    pub fn id(&self) -> &PositionId {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn entry_price(&self) -> Price {
        self.entry_price
    }

    pub fn stop_price(&self) -> Price {
        self.stop_price
    }

    pub fn stop_source(&self) -> StopSource {
        self.stop_source
    }

    pub fn target_price(&self) -> Price {
        self.target_price
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    pub fn milestones(&self) -> &[Milestone] {
        self.ladder.milestones()
    }

    pub fn min_price(&self) -> Price {
        self.min_price
    }

    pub fn max_price(&self) -> Price {
        self.max_price
    }

    pub fn last_price(&self) -> Price {
        self.last_price
    }

    pub fn exit(&self) -> Option<&ExitEvent> {
        self.exit.as_ref()
    }

    pub fn consecutive_neutral(&self) -> u32 {
        self.detector.consecutive_neutral()
    }

    pub fn summary(&self) -> PositionSummary {
        PositionSummary {
            id: self.id.clone(),
            direction: self.direction,
            entry_price: self.entry_price,
            entry_timestamp_ms: self.entry_timestamp_ms,
            quantity: self.quantity,
            stop_price: self.stop_price,
            stop_source: self.stop_source,
            target_price: self.target_price,
            state: self.state,
            milestones_hit: self.ladder.hit_count(),
            min_price: self.min_price,
            max_price: self.max_price,
            exit: self.exit.clone(),
        }
    }

    /// Advance the state machine with a new price.
    ///
    /// No-op once closed.
    pub fn on_price(&mut self, update: PriceUpdate) -> UpdateOutcome {
        if !self.is_open() {
            return UpdateOutcome::default();
        }
        let price = update.price;
        let ts = update.timestamp_ms;

        if let Err(reason) = self.ladder.verify() {
            let corruption = PositionError::StateCorruption {
                position_id: self.id.clone(),
                reason,
            };
            error!(error = %corruption, "Closing position for safety");
            return UpdateOutcome {
                exit: self.close(ExitReason::StateError, price, ts),
                ..UpdateOutcome::default()
            };
        }

        self.last_price = price;
        self.min_price = self.min_price.min(price);
        self.max_price = self.max_price.max(price);

        let milestones_hit = self.ladder.mark_reached(price, ts);
        if let Some(highest) = milestones_hit.last() {
            self.trail_stop(highest.target_price, StopSource::Milestone(highest.index));
        }
        self.apply_breakeven(price);

        if price.has_reached(self.target_price, self.direction) {
            return UpdateOutcome {
                exit: self.close(ExitReason::TargetHit, price, ts),
                milestones_hit,
                observation: None,
            };
        }

        if self.is_stop_breached(price) {
            let reason = if self.stop_source.is_trailing() {
                ExitReason::TrailingStoplossHit
            } else {
                ExitReason::StoplossHit
            };
            return UpdateOutcome {
                exit: self.close(reason, price, ts),
                milestones_hit,
                observation: None,
            };
        }

        let observation = self.detector.observe(price);
        let exit = if self.profile.reversal_exit_enabled {
            match observation.signal {
                ReversalSignal::Reversal => self.close(ExitReason::Reversal, price, ts),
                ReversalSignal::NeutralTimeout => self.close(ExitReason::NeutralTimeout, price, ts),
                ReversalSignal::Hold => None,
            }
        } else {
            None
        };

        UpdateOutcome {
            exit,
            milestones_hit,
            observation: Some(observation),
        }
    }

    /// Close the position. Returns the exit event only on the first call.
    pub fn close(&mut self, reason: ExitReason, price: Price, timestamp_ms: u64) -> Option<ExitEvent> {
        if !self.is_open() {
            return None;
        }
        self.state = PositionState::Closed;
        let event = ExitEvent::new(self.id.clone(), reason, price, timestamp_ms);
        self.exit = Some(event.clone());

        info!(
            position_id = %self.id,
            direction = %self.direction,
            reason = %reason,
            entry = %self.entry_price,
            exit = %price,
            stop = %self.stop_price,
            stop_source = %self.stop_source,
            milestones_hit = self.ladder.hit_count(),
            "Position closed"
        );
        Some(event)
    }

    /// Move the stop to `level` if that tightens it; never moves backward.
    fn trail_stop(&mut self, level: Price, source: StopSource) {
        if level.is_better_than(self.stop_price, self.direction) {
            debug!(
                position_id = %self.id,
                from = %self.stop_price,
                to = %level,
                source = %source,
                "Stop trailed"
            );
            self.stop_price = level;
            self.stop_source = source;
        }
    }

    fn apply_breakeven(&mut self, price: Price) {
        let Some(trigger) = self.profile.breakeven_trigger else {
            return;
        };
        if price.excursion_from(self.entry_price, self.direction) >= trigger {
            self.trail_stop(self.entry_price, StopSource::Breakeven);
        }
    }

    /// Price strictly beyond the stop on the adverse side.
    fn is_stop_breached(&self, price: Price) -> bool {
        self.stop_price.is_better_than(price, self.direction)
    }

    #[cfg(test)]
    pub(crate) fn ladder_mut(&mut self) -> &mut MilestoneLadder {
        &mut self.ladder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idx_core::{MilestoneSchedule, ReversalConfig};
    use rust_decimal_macros::dec;

    fn profile() -> RiskProfile {
        RiskProfile {
            stop_distance: dec!(20),
            target_distance: dec!(50),
            quantity: Quantity::ONE,
            milestones: MilestoneSchedule::new(dec!(10), dec!(2), 5),
            breakeven_trigger: None,
            reversal: ReversalConfig {
                threshold_pct: 50.0,
                ..ReversalConfig::default()
            },
            reversal_exit_enabled: true,
        }
    }

    fn open(direction: Direction, profile: RiskProfile) -> ManagedPosition {
        ManagedPosition::new(
            PositionId::from("pos_test"),
            direction,
            Price::new(dec!(100)),
            Quantity::ONE,
            0,
            profile,
        )
        .unwrap()
    }

    fn tick(position: &mut ManagedPosition, price: rust_decimal::Decimal, ts: u64) -> UpdateOutcome {
        position.on_price(PriceUpdate::new(Price::new(price), ts))
    }

    // ========================================================================
    // Initial placement
    // ========================================================================

    #[test]
    fn test_initial_stop_and_target() {
        let long = open(Direction::Long, profile());
        assert_eq!(long.stop_price(), Price::new(dec!(80)));
        assert_eq!(long.target_price(), Price::new(dec!(150)));

        let short = open(Direction::Short, profile());
        assert_eq!(short.stop_price(), Price::new(dec!(120)));
        assert_eq!(short.target_price(), Price::new(dec!(50)));
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut bad = profile();
        bad.stop_distance = dec!(0);
        let result = ManagedPosition::new(
            PositionId::new(),
            Direction::Long,
            Price::new(dec!(100)),
            Quantity::ONE,
            0,
            bad,
        );
        assert!(matches!(result, Err(PositionError::InvalidProfile(_))));
    }

    // ========================================================================
    // Milestone trailing
    // ========================================================================

    #[test]
    fn test_stop_trails_to_milestone_and_never_back() {
        let mut position = open(Direction::Long, profile());
        assert!(!tick(&mut position, dec!(112), 1).is_exit());
        assert_eq!(position.stop_price(), Price::new(dec!(110)));

        let outcome = tick(&mut position, dec!(118), 2);
        assert!(!outcome.is_exit());
        assert_eq!(outcome.milestones_hit.len(), 1);
        assert_eq!(position.stop_price(), Price::new(dec!(118)));
        assert_eq!(position.stop_source(), StopSource::Milestone(2));

        // pullback below the trailed stop closes as a trailing stop
        let outcome = tick(&mut position, dec!(117), 3);
        let exit = outcome.exit.unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStoplossHit);
        assert_eq!(exit.exit_price, Price::new(dec!(117)));
        assert_eq!(position.stop_price(), Price::new(dec!(118)));

        tick(&mut position, dec!(112), 4);
        assert_eq!(position.stop_price(), Price::new(dec!(118)));
    }

    #[test]
    fn test_pullback_above_stop_keeps_position_open() {
        let mut position = open(Direction::Long, profile());
        tick(&mut position, dec!(125), 1);
        assert_eq!(position.stop_price(), Price::new(dec!(124)));
        assert!(!tick(&mut position, dec!(124.5), 2).is_exit());
        assert_eq!(position.stop_price(), Price::new(dec!(124)));
        assert!(position.is_open());
    }

    #[test]
    fn test_short_trailing() {
        let mut position = open(Direction::Short, profile());
        tick(&mut position, dec!(85), 1);
        assert_eq!(position.stop_price(), Price::new(dec!(90)));
        let exit = tick(&mut position, dec!(91), 2).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStoplossHit);
    }

    #[test]
    fn test_milestone_hits_are_monotonic() {
        let mut position = open(Direction::Long, profile());
        let prices = [dec!(105), dec!(111), dec!(110.5), dec!(119), dec!(118.5), dec!(125)];
        let mut previous_hits = vec![false; 16];
        for (i, price) in prices.iter().enumerate() {
            tick(&mut position, *price, i as u64);
            let hits: Vec<bool> = position.milestones().iter().map(|m| m.hit).collect();
            for (j, was_hit) in previous_hits.iter().enumerate().take(hits.len()) {
                if *was_hit {
                    assert!(hits[j], "milestone {j} un-hit");
                }
            }
            // prefix-closed
            let first_unhit = hits.iter().position(|h| !h).unwrap_or(hits.len());
            assert!(hits[first_unhit..].iter().all(|h| !h));
            previous_hits[..hits.len()].copy_from_slice(&hits);
        }
    }

    // ========================================================================
    // Stop / target
    // ========================================================================

    #[test]
    fn test_initial_stop_is_plain_stoploss() {
        let mut position = open(Direction::Long, profile());
        assert!(!tick(&mut position, dec!(80), 1).is_exit());
        let exit = tick(&mut position, dec!(79.5), 2).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::StoplossHit);
    }

    #[test]
    fn test_target_hit() {
        let mut position = open(Direction::Long, profile());
        let outcome = tick(&mut position, dec!(150), 1);
        assert_eq!(outcome.exit.unwrap().reason, ExitReason::TargetHit);
        assert!(!outcome.milestones_hit.is_empty());
    }

    #[test]
    fn test_price_gap_past_target_bounds_milestones() {
        let mut position = open(Direction::Long, profile());
        let outcome = tick(&mut position, dec!(50100), 1);
        assert_eq!(outcome.exit.unwrap().reason, ExitReason::TargetHit);
        // 110, 118, 124, 128, 130, then min_step rungs up to the 150 target
        assert_eq!(outcome.milestones_hit.len(), 15);
        assert_eq!(position.milestones().len(), 15);
        assert_eq!(
            position.milestones().last().unwrap().target_price,
            Price::new(dec!(150))
        );
    }

    #[test]
    fn test_breakeven_move_classifies_as_trailing() {
        let mut p = profile();
        p.breakeven_trigger = Some(dec!(5));
        let mut position = open(Direction::Long, p);
        tick(&mut position, dec!(106), 1);
        assert_eq!(position.stop_price(), Price::new(dec!(100)));
        assert_eq!(position.stop_source(), StopSource::Breakeven);

        let exit = tick(&mut position, dec!(99), 2).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStoplossHit);
    }

    #[test]
    fn test_plain_stop_at_coincidental_level_is_not_trailing() {
        // initial stop numerically equal to a milestone-like level stays plain
        let mut p = profile();
        p.stop_distance = dec!(10);
        let mut position = open(Direction::Long, p);
        let exit = tick(&mut position, dec!(89), 1).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::StoplossHit);
    }

    // ========================================================================
    // Closure
    // ========================================================================

    #[test]
    fn test_close_is_idempotent() {
        let mut position = open(Direction::Long, profile());
        let first = position.close(ExitReason::StrategyReversal, Price::new(dec!(101)), 5);
        assert!(first.is_some());
        assert!(position
            .close(ExitReason::StrategyReversal, Price::new(dec!(101)), 6)
            .is_none());

        for ts in 7..20 {
            let outcome = tick(&mut position, dec!(50), ts);
            assert!(outcome.exit.is_none());
        }
        assert_eq!(position.state(), PositionState::Closed);
        assert_eq!(position.min_price(), Price::new(dec!(100)));
        assert_eq!(position.exit().unwrap().timestamp_ms, 5);
    }

    #[test]
    fn test_corrupted_ladder_forces_state_error() {
        let mut position = open(Direction::Long, profile());
        position.ladder_mut().milestones_mut()[3].hit = true;
        let exit = tick(&mut position, dec!(101), 1).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::StateError);
        assert!(!position.is_open());
    }

    // ========================================================================
    // Reversal detector integration
    // ========================================================================

    #[test]
    fn test_neutral_timeout_exit() {
        let mut position = open(Direction::Long, profile());
        for ts in 1..50 {
            assert!(!tick(&mut position, dec!(100), ts).is_exit());
        }
        let exit = tick(&mut position, dec!(100), 50).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::NeutralTimeout);
    }

    #[test]
    fn test_reversal_exit_when_enabled() {
        let mut p = profile();
        p.reversal.threshold_pct = 2.0;
        p.stop_distance = dec!(50);
        let mut position = open(Direction::Long, p);
        for ts in 1..=10 {
            tick(&mut position, dec!(100), ts);
        }
        let exit = tick(&mut position, dec!(95), 11).exit.unwrap();
        assert_eq!(exit.reason, ExitReason::Reversal);
    }

    #[test]
    fn test_reversal_disabled_only_observes() {
        let mut p = profile();
        p.reversal_exit_enabled = false;
        let mut position = open(Direction::Long, p);
        for ts in 1..=60 {
            let outcome = tick(&mut position, dec!(100), ts);
            assert!(outcome.observation.is_some());
            assert!(!outcome.is_exit());
        }
    }

    #[test]
    fn test_stop_breach_wins_over_reversal_on_same_tick() {
        let mut p = profile();
        p.reversal.threshold_pct = 2.0;
        let mut position = open(Direction::Long, p);
        for ts in 1..=10 {
            tick(&mut position, dec!(100), ts);
        }
        let outcome = tick(&mut position, dec!(70), 11);
        assert_eq!(outcome.exit.unwrap().reason, ExitReason::StoplossHit);
        assert!(outcome.observation.is_none());
    }
}
