//! Source adapters for the supported exchanges

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::collector::chunker::TimeWindow;
use crate::collector::retry::Attempt;
use crate::{CandleRow, Source};

pub mod binance;
pub mod coinbase;
pub mod http;
pub mod parser;

/// Hard failures of a single wire call (T040)
///
/// Every variant counts against the retry budget.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Connection, timeout or transport failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code returned
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// HTTP client construction failed
    #[error("client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// One price data provider (T041)
///
/// Every method performs at most one wire call; rate limiting and retry are
/// applied by the caller.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source this adapter talks to
    fn source(&self) -> Source;

    /// Fetch one window of 1-minute candles
    ///
    /// # Arguments
    /// * `ticker` - Source-specific ticker (e.g. "BTC-USD", "BTCUSDT")
    /// * `window` - Inclusive window to fetch
    ///
    /// # Returns
    /// `Attempt::Data` rows already reindexed onto the window's minute grid,
    /// `Attempt::Empty` when the source has no history for the window, or
    /// `Attempt::Throttled` when the reply looks like a throttling response
    async fn fetch_window(&self, ticker: &str, window: &TimeWindow) -> SourceResult<Attempt<Vec<CandleRow>>>;

    /// First instant with data for `ticker`, probing from `from`
    ///
    /// `Ok(None)` means the source has no listing floor and nothing is skipped.
    async fn earliest_available(
        &self,
        _ticker: &str,
        _from: DateTime<Utc>,
    ) -> SourceResult<Option<DateTime<Utc>>> {
        Ok(None)
    }

    /// Tickers the source currently lists
    async fn list_products(&self) -> SourceResult<Vec<String>>;

    /// Base URL of the API
    fn base_url(&self) -> &str;
}

/// Create the adapter for a source (T042)
///
/// Dispatch happens once here; the run loop only sees the trait object.
pub fn create_adapter(source: Source) -> SourceResult<Box<dyn SourceAdapter>> {
    match source {
        Source::Coinbase => Ok(Box::new(coinbase::CoinbaseAdapter::new()?)),
        Source::Binance => Ok(Box::new(binance::BinanceAdapter::new()?)),
    }
}
