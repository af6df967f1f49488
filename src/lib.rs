//! # Candle Collector Library
//!
//! Collects 1-minute OHLCV candles for crypto tickers from exchange REST APIs
//! and persists them incrementally, one append-only table per ticker.
//!
//! ## Features
//!
//! - **Two Sources**: Coinbase historic rates (`CB`) and Binance spot klines (`BN`)
//! - **Sliding-Window Rate Limiting**: at most N calls in any trailing window
//! - **Bounded Retry**: transient failures are retried with fixed backoff, and a
//!   window that exhausts its budget is reported and skipped, never fatal
//! - **Chunked Time Ranges**: requested spans are split into source-sized windows
//!   and every window is reindexed onto a complete 1-minute grid
//! - **Incremental Persistence**: buffered rows are flushed every few chunks
//! - **Listing Floor**: windows before a ticker's first available candle are skipped
//!
//! ## Quick Start
//!
//! ```no_run
//! use candle_collector::collector::CollectionRunner;
//! use candle_collector::source::create_adapter;
//! use candle_collector::storage::csv::CsvSink;
//! use candle_collector::Source;
//! use chrono::{TimeZone, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source: Source = "BN".parse()?;
//! let adapter = create_adapter(source)?;
//! let mut sink = CsvSink::new("./data/price", source);
//!
//! let mut runner = CollectionRunner::new(adapter.as_ref(), &mut sink, source.profile());
//! let summary = runner
//!     .run(
//!         "BTCUSDT",
//!         Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2022, 1, 31, 0, 0, 0).unwrap(),
//!     )
//!     .await?;
//! println!("{} rows ({} incomplete)", summary.total_rows, summary.total_na_rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`collector`] - rate limiter, retry engine, range chunker and the per-ticker runner
//! - [`source`] - source adapters translating windows into wire calls
//! - [`storage`] - append-only sink and per-ticker meta records
//! - [`universe`] - ticker universe loading and filtering
//! - [`metrics`] - counters and histograms for the collection loop

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Collection engine: rate limiting, retry, chunking and the run loop
pub mod collector;

/// Observability metrics
pub mod metrics;

/// Source adapters for the supported exchanges
pub mod source;

/// Append-only persistence and meta records
pub mod storage;

/// Ticker universe handling
pub mod universe;

pub use collector::{CollectError, CollectionRunner, Summary};

/// Price data provider (T001)
///
/// Selected once at configuration time; every per-chunk decision dispatches
/// through the adapter built for it rather than re-checking the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Coinbase historic rates
    #[serde(rename = "CB")]
    Coinbase,
    /// Binance spot klines
    #[serde(rename = "BN")]
    Binance,
}

impl Source {
    /// Short identifier used on the command line and in storage paths
    pub fn code(&self) -> &'static str {
        match self {
            Source::Coinbase => "CB",
            Source::Binance => "BN",
        }
    }

    /// Column layout of the rows this source produces
    pub fn schema(&self) -> RowSchema {
        match self {
            Source::Coinbase => RowSchema::Ohlcv,
            Source::Binance => RowSchema::OhlcvExtended,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Source {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CB" => Ok(Source::Coinbase),
            "BN" => Ok(Source::Binance),
            _ => Err(CollectError::UnknownSource(s.to_string())),
        }
    }
}

/// Column layout of a source's rows (T002)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSchema {
    /// `epoch, high, low, open, close, volume`
    Ohlcv,
    /// `epoch, open, high, low, close, volume, amount, count`
    OhlcvExtended,
}

impl RowSchema {
    /// Column names in storage order, key first
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RowSchema::Ohlcv => &["epoch", "high", "low", "open", "close", "volume"],
            RowSchema::OhlcvExtended => &[
                "epoch", "open", "high", "low", "close", "volume", "amount", "count",
            ],
        }
    }

    /// Whether any non-key column of this schema is null in `row`
    pub fn is_na(&self, row: &CandleRow) -> bool {
        let base = row.open.is_none()
            || row.high.is_none()
            || row.low.is_none()
            || row.close.is_none()
            || row.volume.is_none();
        match self {
            RowSchema::Ohlcv => base,
            RowSchema::OhlcvExtended => base || row.amount.is_none() || row.count.is_none(),
        }
    }
}

/// One minute of price data keyed by its epoch (T003)
///
/// Missing minutes are represented by rows whose value fields are all `None`;
/// the reindex step guarantees one row per minute of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleRow {
    /// Minute start (Unix timestamp in seconds)
    pub epoch: i64,
    /// Open price
    pub open: Option<f64>,
    /// High price
    pub high: Option<f64>,
    /// Low price
    pub low: Option<f64>,
    /// Close price
    pub close: Option<f64>,
    /// Volume (base asset)
    pub volume: Option<f64>,
    /// Quote asset volume, Binance only
    pub amount: Option<f64>,
    /// Number of trades, Binance only
    pub count: Option<u64>,
}

impl CandleRow {
    /// Null-valued row for a minute the source returned nothing for
    pub fn empty(epoch: i64) -> Self {
        Self {
            epoch,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            amount: None,
            count: None,
        }
    }

    /// Whether every value field is null
    pub fn is_empty(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
            && self.amount.is_none()
            && self.count.is_none()
    }
}
