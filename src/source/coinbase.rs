//! Coinbase Exchange historic rates adapter

use async_trait::async_trait;
use chrono::{SecondsFormat, TimeDelta};
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

/// Coinbase Exchange public REST API
const COINBASE_BASE_URL: &str = "https://api.exchange.coinbase.com";

/// Coinbase adapter (T046)
///
/// Any JSON reply is classified by shape whatever its HTTP status: Coinbase
/// reports throttling as a JSON object, which is retried as a throttled
/// response rather than a hard failure.
pub struct CoinbaseAdapter {
    client: Client,
    base_url: String,
    granularity: TimeDelta,
}

impl CoinbaseAdapter {
    /// Create an adapter for the production API
    pub fn new() -> SourceResult<Self> {
        Self::with_base_url(COINBASE_BASE_URL)
    }

    /// Create an adapter against a custom base URL (used by tests)
    pub fn with_base_url(base_url: impl Into<String>) -> SourceResult<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            granularity: TimeDelta::seconds(GRANULARITY_SECS),
        })
    }
}

#[async_trait]
impl SourceAdapter for CoinbaseAdapter {
    fn source(&self) -> Source {
        Source::Coinbase
    }

    async fn fetch_window(&self, ticker: &str, window: &TimeWindow) -> SourceResult<Attempt<Vec<CandleRow>>> {
        let url = format!("{}/products/{}/candles", self.base_url, ticker);
        let query = [
            ("start", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("granularity", self.granularity.num_seconds().to_string()),
        ];

        let response = http::get(&self.client, &url, &query).await?;
        let status = response.status;
        let body = response.json()?;

        match PayloadShape::classify(body) {
            PayloadShape::Scalar(reply) => {
                debug!(ticker = %ticker, status = %status, reply = %reply, "Non-matrix reply");
                Ok(Attempt::Throttled(reply.to_string()))
            }
            PayloadShape::Irregular => Ok(Attempt::Empty),
            PayloadShape::Matrix(rows) => {
                let raw = CandleParser::parse_coinbase(rows)?;
                Ok(Attempt::Data(reindex(window, self.granularity, raw)))
            }
        }
    }

    async fn list_products(&self) -> SourceResult<Vec<String>> {
        let url = format!("{}/products", self.base_url);
        let body = http::get(&self.client, &url, &[]).await?.require_ok()?.json()?;

        let products = body
            .as_array()
            .ok_or_else(|| SourceError::Decode("products response is not an array".to_string()))?;

        Ok(products
            .iter()
            .filter_map(|p| p.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
