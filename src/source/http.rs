//! Shared HTTP plumbing for the source adapters

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{SourceError, SourceResult};

/// HTTP connect timeout (seconds)
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds)
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Coinbase rejects requests without a User-Agent
const USER_AGENT: &str = concat!("candle-collector/", env!("CARGO_PKG_VERSION"));
/// Longest body excerpt kept in error messages
const MAX_ERROR_BODY: usize = 256;

/// Build the client shared by one adapter
pub fn build_client() -> SourceResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SourceError::Client(e.to_string()))
}

/// Status and body of one completed request
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response body
    pub body: String,
}

impl RawResponse {
    /// Decode the body as JSON regardless of status
    pub fn json(&self) -> SourceResult<Value> {
        serde_json::from_str(&self.body)
            .map_err(|e| SourceError::Decode(format!("{e}: {}", excerpt(&self.body))))
    }

    /// Fail with [`SourceError::Http`] unless the status is 200
    pub fn require_ok(self) -> SourceResult<Self> {
        if self.status == StatusCode::OK {
            Ok(self)
        } else {
            Err(SourceError::Http {
                status: self.status.as_u16(),
                body: excerpt(&self.body),
            })
        }
    }
}

/// Issue a GET and collect status and body
pub async fn get(client: &Client, url: &str, query: &[(&str, String)]) -> SourceResult<RawResponse> {
    debug!(url = %url, ?query, "GET");
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(RawResponse { status, body })
}

fn excerpt(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
