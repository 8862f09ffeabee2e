//! Time-of-day windows used by session filters.

use chrono::{Duration, NaiveTime};
use idx_core::IndicatorSnapshot;
use serde::{Deserialize, Serialize};

/// Time window in `HH:MM` local exchange time.
///
/// End is exclusive. A window whose end is before its start wraps midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

impl TimeWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.start, "%H:%M").ok()
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.end, "%H:%M").ok()
    }

    pub fn is_valid(&self) -> bool {
        self.start_time().is_some() && self.end_time().is_some()
    }

    /// Check if `time` falls inside this window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (self.start_time(), self.end_time()) else {
            return false;
        };

        if start <= end {
            time >= start && time < end
        } else {
            time >= start || time < end
        }
    }
}

/// Local time of the snapshot at `utc_offset_minutes` from UTC.
pub fn snapshot_local_time(snapshot: &IndicatorSnapshot, utc_offset_minutes: i32) -> Option<NaiveTime> {
    let utc = snapshot.datetime()?;
    let local = utc.checked_add_signed(Duration::minutes(i64::from(utc_offset_minutes)))?;
    Some(local.time())
}
