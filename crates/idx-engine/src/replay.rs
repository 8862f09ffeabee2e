//! JSON-lines replay.
//!
//! Each input line is one [`EngineInput`]:
//!
//! ```text
//! {"type":"snapshot","instrument":"NIFTY","price":"22500","timestamp_ms":1,"values":{"ema_cross_up":true}}
//! {"type":"price","price":"22510.5","timestamp_ms":2}
//! ```
//!
//! A snapshot is evaluated immediately after it is published, so replay
//! output does not depend on wall-clock timing. Blank lines and lines
//! starting with `#` are skipped.

use std::io::{BufRead, Write};

use serde::Serialize;
use tracing::{info, warn};

use crate::app::{Engine, EngineEvent, EngineInput};
use crate::error::{AppError, AppResult};

/// Counters for one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub lines: usize,
    pub snapshots: usize,
    pub prices: usize,
    pub malformed: usize,
    pub entries: usize,
    pub rejections: usize,
    pub exits: usize,
}

impl ReplayStats {
    fn count(&mut self, events: &[EngineEvent]) {
        for event in events {
            match event {
                EngineEvent::Entry(_) => self.entries += 1,
                EngineEvent::Rejected(_) => self.rejections += 1,
                EngineEvent::Exit(_) => self.exits += 1,
            }
        }
    }
}

/// Parse one input line; `None` for blank and comment lines.
pub fn parse_line(line: &str, line_no: usize) -> AppResult<Option<EngineInput>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| AppError::Input {
            line: line_no,
            source,
        })
}

/// Feed every line of `reader` through `engine`, writing events to `writer`.
///
/// Malformed lines are logged and skipped; I/O errors abort the replay.
pub fn run_replay<R: BufRead, W: Write>(
    engine: &Engine,
    reader: R,
    mut writer: W,
) -> AppResult<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        stats.lines += 1;

        let input = match parse_line(&line, index + 1) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "Skipping malformed input line");
                continue;
            }
        };

        let events = match input {
            EngineInput::Snapshot(snapshot) => {
                stats.snapshots += 1;
                engine.on_snapshot(snapshot);
                engine.evaluate_tick()
            }
            EngineInput::Price(update) => {
                stats.prices += 1;
                engine.on_price(update)
            }
        };

        stats.count(&events);
        for event in &events {
            serde_json::to_writer(&mut writer, event)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;

    info!(
        lines = stats.lines,
        snapshots = stats.snapshots,
        prices = stats.prices,
        malformed = stats.malformed,
        entries = stats.entries,
        exits = stats.exits,
        "Replay finished"
    );
    Ok(stats)
}
