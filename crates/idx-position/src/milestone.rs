//! Milestone ladder for profit-taking.
//!
//! The first `K` milestones are generated when the position opens using the
//! decreasing-step schedule. When the last generated milestone is hit the
//! ladder grows with `min_step` milestones. Growth stops at the ceiling (the
//! position target, when set): rungs past it cannot be reached while the
//! position is open. Hit flags are append-only.

use idx_core::{Direction, MilestoneSchedule, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One profit checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// 1-indexed position in the ladder.
    pub index: u32,
    /// Points from the previous milestone (or entry).
    pub step: Decimal,
    pub target_price: Price,
    pub hit: bool,
    pub hit_at_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MilestoneLadder {
    direction: Direction,
    entry: Price,
    schedule: MilestoneSchedule,
    ceiling: Option<Price>,
    milestones: Vec<Milestone>,
}

impl MilestoneLadder {
    pub fn new(entry: Price, direction: Direction, schedule: MilestoneSchedule) -> Self {
        let mut ladder = Self {
            direction,
            entry,
            schedule,
            ceiling: None,
            milestones: Vec::with_capacity(schedule.decreasing_count as usize),
        };
        for _ in 0..schedule.decreasing_count.max(1) {
            ladder.extend();
        }
        ladder
    }

    /// Stop growing the ladder once a milestone reaches `ceiling`.
    pub fn with_ceiling(mut self, ceiling: Price) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Whether the ladder may append another `min_step` milestone.
    fn can_extend(&self) -> bool {
        match (self.ceiling, self.milestones.last()) {
            (Some(ceiling), Some(last)) => !last.target_price.has_reached(ceiling, self.direction),
            _ => true,
        }
    }

    fn extend(&mut self) {
        let index = self.milestones.len() as u32 + 1;
        let step = self.schedule.step(index);
        let base = self.milestones.last().map_or(self.entry, |m| m.target_price);
        self.milestones.push(Milestone {
            index,
            step,
            target_price: base.favorable(self.direction, step),
            hit: false,
            hit_at_ms: None,
        });
    }

    pub fn milestones(&self) -> &[Milestone] {
        &self.milestones
    }

    pub fn hit_count(&self) -> usize {
        self.milestones.iter().take_while(|m| m.hit).count()
    }

    /// Highest milestone reached so far.
    pub fn highest_hit(&self) -> Option<&Milestone> {
        self.milestones.iter().rev().find(|m| m.hit)
    }

    /// Next milestone not yet reached.
    pub fn next_pending(&self) -> Option<&Milestone> {
        self.milestones.iter().find(|m| !m.hit)
    }

    /// Mark every milestone reached by `price`; returns the newly hit ones.
    ///
    /// Targets are monotonic, so scanning stops at the first unreached one.
    pub fn mark_reached(&mut self, price: Price, timestamp_ms: u64) -> Vec<Milestone> {
        let mut newly_hit = Vec::new();
        let mut i = self.hit_count();
        loop {
            if i == self.milestones.len() {
                if !self.can_extend() {
                    break;
                }
                self.extend();
            }
            let milestone = &mut self.milestones[i];
            if !price.has_reached(milestone.target_price, self.direction) {
                break;
            }
            milestone.hit = true;
            milestone.hit_at_ms = Some(timestamp_ms);
            newly_hit.push(milestone.clone());
            i += 1;
        }
        newly_hit
    }

    /// Check ladder invariants: indices `1..=n`, targets strictly moving in
    /// the favorable direction, hit flags forming a prefix.
    pub fn verify(&self) -> Result<(), String> {
        let mut previous = self.entry;
        let mut seen_unhit = false;
        for (i, milestone) in self.milestones.iter().enumerate() {
            let expected = i as u32 + 1;
            if milestone.index != expected {
                return Err(format!(
                    "milestone index {} at position {expected}",
                    milestone.index
                ));
            }
            if !milestone.target_price.is_better_than(previous, self.direction) {
                return Err(format!(
                    "milestone {} target {} not beyond {previous}",
                    milestone.index, milestone.target_price
                ));
            }
            if milestone.hit && seen_unhit {
                return Err(format!(
                    "milestone {} hit while an earlier one is not",
                    milestone.index
                ));
            }
            seen_unhit |= !milestone.hit;
            previous = milestone.target_price;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn milestones_mut(&mut self) -> &mut Vec<Milestone> {
        &mut self.milestones
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ladder(direction: Direction) -> MilestoneLadder {
        MilestoneLadder::new(
            Price::new(dec!(100)),
            direction,
            MilestoneSchedule::new(dec!(10), dec!(2), 5),
        )
    }

    fn targets(ladder: &MilestoneLadder) -> Vec<Decimal> {
        ladder
            .milestones()
            .iter()
            .map(|m| m.target_price.inner())
            .collect()
    }

    #[test]
    fn test_long_targets() {
        let ladder = ladder(Direction::Long);
        assert_eq!(
            targets(&ladder),
            vec![dec!(110), dec!(118), dec!(124), dec!(128), dec!(130)]
        );
        assert!(ladder.verify().is_ok());
    }

    #[test]
    fn test_short_targets_mirror() {
        let ladder = ladder(Direction::Short);
        assert_eq!(
            targets(&ladder),
            vec![dec!(90), dec!(82), dec!(76), dec!(72), dec!(70)]
        );
        assert!(ladder.verify().is_ok());
    }

    #[test]
    fn test_mark_reached_multiple_at_once() {
        let mut ladder = ladder(Direction::Long);
        let hit = ladder.mark_reached(Price::new(dec!(119)), 7);
        assert_eq!(hit.len(), 2);
        assert_eq!(ladder.highest_hit().unwrap().index, 2);
        assert_eq!(ladder.milestones()[1].hit_at_ms, Some(7));
        assert_eq!(ladder.next_pending().unwrap().index, 3);
    }

    #[test]
    fn test_hits_are_never_undone() {
        let mut ladder = ladder(Direction::Long);
        ladder.mark_reached(Price::new(dec!(118)), 1);
        let hit = ladder.mark_reached(Price::new(dec!(101)), 2);
        assert!(hit.is_empty());
        assert_eq!(ladder.hit_count(), 2);
        assert_eq!(ladder.milestones()[0].hit_at_ms, Some(1));
    }

    #[test]
    fn test_ladder_extends_with_min_step() {
        let mut ladder = ladder(Direction::Long);
        let hit = ladder.mark_reached(Price::new(dec!(134)), 1);
        // 110, 118, 124, 128, 130, 132, 134
        assert_eq!(hit.len(), 7);
        assert_eq!(ladder.milestones().last().unwrap().target_price, Price::new(dec!(136)));
        assert_eq!(ladder.milestones()[6].step, dec!(2));
        assert!(ladder.verify().is_ok());
    }

    #[test]
    fn test_price_gap_stops_at_ceiling() {
        let mut ladder = ladder(Direction::Long).with_ceiling(Price::new(dec!(140)));
        let hit = ladder.mark_reached(Price::new(dec!(50100)), 1);
        // 110, 118, 124, 128, 130, then min_step rungs up to 140
        assert_eq!(hit.len(), 10);
        assert_eq!(hit.last().unwrap().target_price, Price::new(dec!(140)));
        assert_eq!(ladder.milestones().len(), 10);
        assert!(ladder.next_pending().is_none());

        assert!(ladder.mark_reached(Price::new(dec!(50200)), 2).is_empty());
        assert!(ladder.verify().is_ok());
    }

    #[test]
    fn test_short_ceiling_mirrors() {
        let mut ladder = ladder(Direction::Short).with_ceiling(Price::new(dec!(66)));
        let hit = ladder.mark_reached(Price::new(dec!(1)), 1);
        // 90, 82, 76, 72, 70, 68, 66
        assert_eq!(hit.len(), 7);
        assert_eq!(ladder.milestones().last().unwrap().target_price, Price::new(dec!(66)));
    }

    #[test]
    fn test_verify_detects_non_monotonic_target() {
        let mut ladder = ladder(Direction::Long);
        ladder.milestones_mut()[2].target_price = Price::new(dec!(115));
        assert!(ladder.verify().is_err());
    }

    #[test]
    fn test_verify_detects_hit_gap() {
        let mut ladder = ladder(Direction::Long);
        ladder.milestones_mut()[1].hit = true;
        assert!(ladder.verify().is_err());
    }
}
