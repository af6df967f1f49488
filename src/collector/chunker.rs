//! Time-range decomposition and grid reindexing
//!
//! A requested `[start, end]` date range is treated as inclusive through the
//! end of `end`'s calendar day and split into fixed-width windows. Each window
//! covers `width - granularity` so neighbouring windows never share a tick.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::CandleRow;

/// Inclusive time window aligned to the candle grid (T030)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    /// First tick of the window
    pub start: DateTime<Utc>,
    /// Last tick of the window (inclusive)
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, returning `None` when `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of grid ticks in the window
    pub fn tick_count(&self, granularity: TimeDelta) -> usize {
        let step = granularity.num_seconds().max(1);
        ((self.end - self.start).num_seconds() / step + 1) as usize
    }

    /// Whether the window lies entirely before `floor`
    pub fn ends_before(&self, floor: DateTime<Utc>) -> bool {
        self.end < floor
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {}]",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

/// Splits request spans into windows of one chunk width (T031)
#[derive(Debug, Clone, Copy)]
pub struct RangeChunker {
    width: TimeDelta,
    granularity: TimeDelta,
}

impl RangeChunker {
    /// Create a chunker
    ///
    /// # Arguments
    /// * `width` - Nominal chunk width (distance between window starts)
    /// * `granularity` - Candle width; a window ends one granularity short of the next start
    pub fn new(width: TimeDelta, granularity: TimeDelta) -> Self {
        Self { width, granularity }
    }

    /// Nominal chunk width
    pub fn width(&self) -> TimeDelta {
        self.width
    }

    /// Candle width
    pub fn granularity(&self) -> TimeDelta {
        self.granularity
    }

    /// Last tick covered by a request ending on `end`'s calendar day
    pub fn span_end(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        end + TimeDelta::days(1) - self.granularity
    }

    /// Lazy sequence of windows covering `[start, span_end(end)]`
    ///
    /// The sequence is empty when `start` lies after the span end. The last
    /// window is clamped to the span end, so the windows cover the span
    /// exactly even when the width does not divide it.
    pub fn chunks(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Chunks {
        let step = if self.width > self.granularity {
            self.width
        } else {
            self.granularity
        };
        Chunks {
            next_start: start,
            span_end: self.span_end(end),
            step,
            span: step - self.granularity,
        }
    }

    /// Number of windows `chunks(start, end)` yields
    pub fn count(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        self.chunks(start, end).len()
    }
}

/// Iterator over the windows of one request
#[derive(Debug, Clone)]
pub struct Chunks {
    next_start: DateTime<Utc>,
    span_end: DateTime<Utc>,
    step: TimeDelta,
    span: TimeDelta,
}

impl Iterator for Chunks {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start > self.span_end {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.span).min(self.span_end);
        self.next_start = start + self.step;
        Some(TimeWindow { start, end })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.next_start > self.span_end {
            return (0, Some(0));
        }
        let remaining = (self.span_end - self.next_start).num_seconds();
        let n = (remaining / self.step.num_seconds() + 1) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}

/// Place raw rows onto the window's grid (T032)
///
/// Produces exactly one row per `granularity` tick in `[window.start,
/// window.end]`. Ticks absent from `rows` become null rows; rows outside the
/// window or off the grid are dropped. When the source repeats an epoch the
/// first occurrence wins.
pub fn reindex(window: &TimeWindow, granularity: TimeDelta, rows: Vec<CandleRow>) -> Vec<CandleRow> {
    let step = granularity.num_seconds().max(1);
    let first = window.start.timestamp();
    let last = window.end.timestamp();

    let mut by_epoch: HashMap<i64, CandleRow> = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.epoch < first || row.epoch > last || (row.epoch - first) % step != 0 {
            continue;
        }
        by_epoch.entry(row.epoch).or_insert(row);
    }

    (first..=last)
        .step_by(step as usize)
        .map(|epoch| by_epoch.remove(&epoch).unwrap_or_else(|| CandleRow::empty(epoch)))
        .collect()
}
