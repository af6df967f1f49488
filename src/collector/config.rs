//! Collection configuration constants and per-source profiles

use crate::Source;
use chrono::TimeDelta;
use std::time::Duration;

/// Maximum number of retries for a window after hard failures.
/// A window gets the first attempt plus 5 retries before it is skipped.
pub const MAX_RETRIES: u32 = 5;

/// Backoff after a network or HTTP error, in milliseconds.
pub const ERROR_BACKOFF_MS: u64 = 500;

/// Backoff after a throttled or malformed response, in milliseconds.
/// Longer than the error backoff so a saturated quota has time to recover.
pub const THROTTLE_BACKOFF_MS: u64 = 1_000;

/// Sampling interval of one candle, in seconds.
pub const GRANULARITY_SECS: i64 = 60;

/// Calls allowed per rate-limit window for both sources.
pub const DEFAULT_RATE_LIMIT: usize = 10;

/// Length of the rate-limit window.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(1);

/// Per-source tuning of the collection loop (T010)
///
/// Chunk widths stay below each source's per-call row cap at 1-minute
/// granularity: 240 rows per Coinbase call (cap 300), 480 per Binance
/// call (cap 1000).
#[derive(Debug, Clone)]
pub struct SourceProfile {
    /// Source these settings apply to
    pub source: Source,
    /// Nominal width of one chunk window
    pub chunk_width: TimeDelta,
    /// Width of one candle
    pub granularity: TimeDelta,
    /// Calls allowed per rate-limit window
    pub rate_limit: usize,
    /// Length of the rate-limit window
    pub rate_window: Duration,
    /// Flush the buffer after this many successfully fetched chunks
    pub flush_every: usize,
    /// Maximum rows the source returns per call
    pub row_cap: usize,
    /// Whether windows before the listing date are skipped
    pub uses_listing_floor: bool,
}

impl SourceProfile {
    /// Default profile for a source
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::Coinbase => Self {
                source,
                chunk_width: TimeDelta::hours(4),
                granularity: TimeDelta::seconds(GRANULARITY_SECS),
                rate_limit: DEFAULT_RATE_LIMIT,
                rate_window: RATE_LIMIT_WINDOW,
                flush_every: 6,
                row_cap: 300,
                uses_listing_floor: false,
            },
            Source::Binance => Self {
                source,
                chunk_width: TimeDelta::hours(8),
                granularity: TimeDelta::seconds(GRANULARITY_SECS),
                rate_limit: DEFAULT_RATE_LIMIT,
                rate_window: RATE_LIMIT_WINDOW,
                flush_every: 4,
                row_cap: 1_000,
                uses_listing_floor: true,
            },
        }
    }

    /// Override the number of calls allowed per window
    pub fn with_rate_limit(mut self, rate_limit: usize) -> Self {
        self.rate_limit = rate_limit.max(1);
        self
    }

    /// Override the flush cadence
    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    /// Override the chunk width
    pub fn with_chunk_width(mut self, chunk_width: TimeDelta) -> Self {
        self.chunk_width = chunk_width;
        self
    }

    /// Chunk width minus one granularity step: the inclusive end offset of a window
    pub fn chunk_span(&self) -> TimeDelta {
        self.chunk_width - self.granularity
    }

    /// Rows one full window reindexes to
    pub fn rows_per_window(&self) -> usize {
        (self.chunk_width.num_seconds() / self.granularity.num_seconds()) as usize
    }
}

impl Source {
    /// Default collection profile for this source
    pub fn profile(&self) -> SourceProfile {
        SourceProfile::for_source(*self)
    }
}
