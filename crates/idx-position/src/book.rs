//! Concurrent book of managed positions.
//!
//! Each position sits behind its own lock so price updates for different
//! positions never contend. Closed positions stay in the book until
//! [`PositionBook::prune_closed`] so their exit events remain inspectable.

use std::sync::Arc;

use dashmap::DashMap;
use idx_core::{
    Direction, ExitEvent, ExitReason, PositionId, Price, PriceUpdate, Quantity, RiskProfile,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{PositionError, PositionResult};
use crate::lifecycle::{ManagedPosition, PositionSummary, UpdateOutcome};

type PositionEntry = Arc<Mutex<ManagedPosition>>;

/// Aggregate result of routing one price to every open position.
#[derive(Debug, Clone, Default)]
pub struct PriceSweep {
    pub exits: Vec<ExitEvent>,
    pub milestones_hit: usize,
    pub updated: usize,
}

/// Thread-safe registry of positions keyed by id.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: DashMap<PositionId, PositionEntry>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
        }
    }

    /// Insert an already constructed position.
    pub fn open(&self, position: ManagedPosition) -> PositionResult<PositionId> {
        let id = position.id().clone();
        match self.positions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(PositionError::Duplicate(id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(position)));
                Ok(id)
            }
        }
    }

    /// Create and insert a position with a fresh id.
    pub fn open_new(
        &self,
        direction: Direction,
        entry_price: Price,
        quantity: Quantity,
        timestamp_ms: u64,
        profile: RiskProfile,
    ) -> PositionResult<PositionId> {
        let position = ManagedPosition::new(
            PositionId::new(),
            direction,
            entry_price,
            quantity,
            timestamp_ms,
            profile,
        )?;
        self.open(position)
    }

    pub fn get(&self, id: &PositionId) -> Option<PositionSummary> {
        self.positions.get(id).map(|entry| entry.lock().summary())
    }

    /// Route one price update to a single position.
    pub fn update(&self, id: &PositionId, update: PriceUpdate) -> PositionResult<UpdateOutcome> {
        let entry = self
            .positions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PositionError::NotFound(id.clone()))?;
        let outcome = entry.lock().on_price(update);
        Ok(outcome)
    }

    /// Apply a price update to every open position.
    pub fn on_price(&self, update: PriceUpdate) -> PriceSweep {
        // Clone entries out so no shard lock is held while positions update.
        let entries: Vec<PositionEntry> = self
            .positions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut sweep = PriceSweep::default();
        for entry in entries {
            let mut position = entry.lock();
            if !position.is_open() {
                continue;
            }
            let outcome = position.on_price(update);
            sweep.updated += 1;
            sweep.milestones_hit += outcome.milestones_hit.len();
            if let Some(exit) = outcome.exit {
                sweep.exits.push(exit);
            }
        }
        if !sweep.exits.is_empty() {
            debug!(count = sweep.exits.len(), price = %update.price, "Positions exited on update");
        }
        sweep
    }

    /// Close a position externally (e.g. on a strategy reversal).
    ///
    /// Returns `Ok(None)` if it was already closed.
    pub fn close(
        &self,
        id: &PositionId,
        reason: ExitReason,
        price: Price,
        timestamp_ms: u64,
    ) -> PositionResult<Option<ExitEvent>> {
        let entry = self
            .positions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PositionError::NotFound(id.clone()))?;
        let event = entry.lock().close(reason, price, timestamp_ms);
        if event.is_none() {
            warn!(position_id = %id, reason = %reason, "Close requested for closed position");
        }
        Ok(event)
    }

    pub fn open_positions(&self) -> Vec<PositionSummary> {
        self.positions
            .iter()
            .filter_map(|entry| {
                let position = entry.value().lock();
                position.is_open().then(|| position.summary())
            })
            .collect()
    }

    pub fn open_directions(&self) -> Vec<(PositionId, Direction)> {
        self.open_positions()
            .into_iter()
            .map(|summary| (summary.id, summary.direction))
            .collect()
    }

    pub fn has_open(&self) -> bool {
        self.positions
            .iter()
            .any(|entry| entry.value().lock().is_open())
    }

    /// Drop closed positions; returns how many were removed.
    pub fn prune_closed(&self) -> usize {
        let before = self.positions.len();
        self.positions.retain(|_, entry| entry.lock().is_open());
        before - self.positions.len()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn price(value: rust_decimal::Decimal, ts: u64) -> PriceUpdate {
        PriceUpdate::new(Price::new(value), ts)
    }

    fn open_one(book: &PositionBook, direction: Direction) -> PositionId {
        book.open_new(
            direction,
            Price::new(dec!(100)),
            Quantity::ONE,
            0,
            RiskProfile::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_and_get() {
        let book = PositionBook::new();
        let id = open_one(&book, Direction::Long);
        let summary = book.get(&id).unwrap();
        assert_eq!(summary.stop_price, Price::new(dec!(80)));
        assert!(book.has_open());
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let book = PositionBook::new();
        let make = || {
            ManagedPosition::new(
                PositionId::from("pos_dup"),
                Direction::Long,
                Price::new(dec!(100)),
                Quantity::ONE,
                0,
                RiskProfile::default(),
            )
            .unwrap()
        };
        book.open(make()).unwrap();
        assert!(matches!(book.open(make()), Err(PositionError::Duplicate(_))));
    }

    #[test]
    fn test_on_price_routes_to_all_positions() {
        let book = PositionBook::new();
        let long = open_one(&book, Direction::Long);
        let short = open_one(&book, Direction::Short);

        // long stop at 80 breached; short untouched until 120
        let sweep = book.on_price(price(dec!(79), 1));
        assert_eq!(sweep.updated, 2);
        // the short reached milestones at 90 and 82
        assert_eq!(sweep.milestones_hit, 2);
        let exits = sweep.exits;
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].position_id, long);
        assert_eq!(exits[0].reason, ExitReason::StoplossHit);

        let open = book.open_directions();
        assert_eq!(open, vec![(short, Direction::Short)]);
    }

    #[test]
    fn test_close_unknown_and_twice() {
        let book = PositionBook::new();
        let unknown = PositionId::from("pos_missing");
        assert!(matches!(
            book.close(&unknown, ExitReason::StrategyReversal, Price::new(dec!(1)), 0),
            Err(PositionError::NotFound(_))
        ));

        let id = open_one(&book, Direction::Long);
        let first = book
            .close(&id, ExitReason::StrategyReversal, Price::new(dec!(101)), 1)
            .unwrap();
        assert_eq!(first.unwrap().reason, ExitReason::StrategyReversal);
        let second = book
            .close(&id, ExitReason::StrategyReversal, Price::new(dec!(101)), 2)
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_prune_closed() {
        let book = PositionBook::new();
        let id = open_one(&book, Direction::Long);
        open_one(&book, Direction::Short);
        book.close(&id, ExitReason::StrategyReversal, Price::new(dec!(100)), 1)
            .unwrap();
        assert_eq!(book.prune_closed(), 1);
        assert_eq!(book.len(), 1);
        assert!(book.get(&id).is_none());
    }

    #[test]
    fn test_update_single_position() {
        let book = PositionBook::new();
        let id = open_one(&book, Direction::Long);
        let outcome = book.update(&id, price(dec!(112), 1)).unwrap();
        assert_eq!(outcome.milestones_hit.len(), 1);
        assert_eq!(book.get(&id).unwrap().stop_price, Price::new(dec!(110)));
    }
}
