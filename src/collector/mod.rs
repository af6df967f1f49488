//! Collection engine: rate limiting, retry, chunking and the run loop

use chrono::{DateTime, Utc};

use crate::storage::StorageError;

pub mod chunker;
pub mod config;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod runner;

pub use chunker::{RangeChunker, TimeWindow};
pub use config::SourceProfile;
pub use rate_limit::RateLimiter;
pub use retry::{Attempt, FetchOutcome, RetryPolicy, RetryingFetcher};
pub use runner::{CollectionProgress, CollectionRunner, FailedWindow, RunState, Summary};

/// Collection errors (T064)
///
/// Per-window failures never appear here; they are reported in [`Summary`].
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Source identifier other than `CB` or `BN`
    #[error("unknown source: {0:?} (expected CB or BN)")]
    UnknownSource(String),

    /// Start date after end date
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Start or end not on the candle grid
    #[error("{instant} is not aligned to the {granularity_secs}s candle grid")]
    Misaligned {
        /// Offending bound
        instant: DateTime<Utc>,
        /// Grid step in seconds
        granularity_secs: i64,
    },

    /// Flushing to storage failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
