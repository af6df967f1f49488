//! Binance spot klines adapter

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::http::{self, build_client};
use super::parser::{CandleParser, PayloadShape};
use super::{SourceAdapter, SourceError, SourceResult};
use crate::collector::chunker::{reindex, TimeWindow};
use crate::collector::config::GRANULARITY_SECS;
use crate::collector::retry::Attempt;
use crate::{CandleRow, Source};

/// Binance spot public REST API
const BINANCE_BASE_URL: &str = "https://api.binance.com";
/// Row cap per klines request
const KLINES_LIMIT: u32 = 1_000;
/// Rows requested when probing the listing date
const EARLIEST_PROBE_LIMIT: u32 = 2;

/// Binance adapter (T047)
///
/// Any status other than 200 is a hard failure.
pub struct BinanceAdapter {
    client: Client,
    base_url: String,
    granularity: TimeDelta,
}

impl BinanceAdapter {
    /// Create an adapter for the production API
    pub fn new() -> SourceResult<Self> {
        Self::with_base_url(BINANCE_BASE_URL)
    }

    /// Create an adapter against a custom base URL (used by tests)
    pub fn with_base_url(base_url: impl Into<String>) -> SourceResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            granularity: TimeDelta::seconds(GRANULARITY_SECS),
        })
    }

    fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.base_url)
    }
}

#[async_trait]
impl SourceAdapter for BinanceAdapter {
    fn source(&self) -> Source {
        Source::Binance
    }

    async fn fetch_window(&self, ticker: &str, window: &TimeWindow) -> SourceResult<Attempt<Vec<CandleRow>>> {
        let query = [
            ("symbol", ticker.to_string()),
            ("interval", "1m".to_string()),
            ("startTime", (window.start.timestamp() * 1_000).to_string()),
            ("endTime", (window.end.timestamp() * 1_000).to_string()),
            ("limit", KLINES_LIMIT.to_string()),
        ];

        let body = http::get(&self.client, &self.klines_url(), &query)
            .await?
            .require_ok()?
            .json()?;

        match PayloadShape::classify(body) {
            PayloadShape::Scalar(reply) => Ok(Attempt::Throttled(reply.to_string())),
            PayloadShape::Irregular => Ok(Attempt::Empty),
            PayloadShape::Matrix(rows) => {
                let raw = CandleParser::parse_binance(rows)?;
                Ok(Attempt::Data(reindex(window, self.granularity, raw)))
            }
        }
    }

    /// Open time of the first kline at or after `from`
    ///
    /// Falls back to `from` itself when the reply is not a matrix, so an
    /// unknown listing date never skips anything.
    async fn earliest_available(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
    ) -> SourceResult<Option<DateTime<Utc>>> {
        let query = [
            ("symbol", ticker.to_string()),
            ("interval", "1m".to_string()),
            ("startTime", (from.timestamp() * 1_000).to_string()),
            ("limit", EARLIEST_PROBE_LIMIT.to_string()),
        ];

        let body = http::get(&self.client, &self.klines_url(), &query)
            .await?
            .require_ok()?
            .json()?;

        let rows = match PayloadShape::classify(body) {
            PayloadShape::Matrix(rows) => rows,
            _ => {
                debug!(ticker = %ticker, "Listing probe returned no matrix, assuming available");
                return Ok(Some(from));
            }
        };

        let epoch = CandleParser::parse_epoch(&rows[0][0], 1_000)?;
        let earliest = DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or_else(|| SourceError::Decode(format!("open time out of range: {epoch}")))?;
        Ok(Some(earliest))
    }

    async fn list_products(&self) -> SourceResult<Vec<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = http::get(&self.client, &url, &[]).await?.require_ok()?.json()?;

        let symbols = body
            .get("symbols")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::Decode("exchangeInfo has no symbols array".to_string()))?;

        Ok(symbols
            .iter()
            .filter_map(|s| s.get("symbol").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
