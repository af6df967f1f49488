//! Bounded retry around a single remote call
//!
//! Every attempt first passes through the run's [`RateLimiter`]. Outcomes are
//! classified into data, empty, throttled/malformed and hard failures:
//!
//! - hard failures (network, non-success HTTP status, undecodable rows) count
//!   against the retry budget and back off for [`ERROR_BACKOFF_MS`]
//! - throttled or malformed payloads back off for [`THROTTLE_BACKOFF_MS`]
//!   and are retried without counting against the budget
//! - empty payloads and data payloads return immediately
//!
//! Every retry path sleeps, so the loop can never spin.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::config::{ERROR_BACKOFF_MS, MAX_RETRIES, THROTTLE_BACKOFF_MS};
use super::rate_limit::RateLimiter;
use crate::metrics;
use crate::source::SourceError;
use crate::Source;

/// Classified result of one successful wire call (T020)
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// Well-formed payload carrying data
    Data(T),
    /// Well-formed payload with nothing in it
    Empty,
    /// Payload shaped like a throttling or error reply
    Throttled(String),
}

/// Final result of a retried fetch (T021)
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// Data was returned
    Success(T),
    /// The call succeeded but the source had nothing for the request
    Empty,
    /// Hard failures exceeded the retry budget
    Exhausted(FetchFailure),
}

impl<T> FetchOutcome<T> {
    /// Whether the fetch produced data
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// Whether the retry budget was exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchOutcome::Exhausted(_))
    }
}

/// Details surfaced when a fetch gives up
#[derive(Debug)]
pub struct FetchFailure {
    /// Total wire attempts made, throttled ones included
    pub attempts: u32,
    /// Hard failures counted against the budget
    pub retries: u32,
    /// The last hard failure
    pub last_error: SourceError,
}

/// Retry budget and backoff delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard failures tolerated before giving up
    pub max_retries: u32,
    /// Sleep after a hard failure
    pub error_backoff: Duration,
    /// Sleep after a throttled or malformed reply
    pub throttle_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            error_backoff: Duration::from_millis(ERROR_BACKOFF_MS),
            throttle_backoff: Duration::from_millis(THROTTLE_BACKOFF_MS),
        }
    }
}

/// Logging and metrics labels for one fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    /// Source being called
    pub source: Source,
    /// Ticker being fetched
    pub ticker: &'a str,
    /// Start of the requested window
    pub window_start: DateTime<Utc>,
}

/// Rate-limited retry engine owned by one collection run (T022)
#[derive(Debug)]
pub struct RetryingFetcher {
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    /// Create a fetcher over a fresh limiter
    pub fn new(limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    /// Retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Rate limiter in effect
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run `call` until it yields data or an empty payload, or the budget runs out
    ///
    /// # Arguments
    /// * `context` - Labels for logs and metrics
    /// * `call` - Zero-argument thunk performing one wire call
    ///
    /// # Returns
    /// [`FetchOutcome::Exhausted`] once more than `max_retries` hard failures
    /// occurred; this never returns an error and never panics.
    pub async fn fetch<T, F, Fut>(&mut self, context: FetchContext<'_>, mut call: F) -> FetchOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Attempt<T>, SourceError>>,
    {
        let mut attempts: u32 = 0;
        let mut retries: u32 = 0;

        loop {
            self.limiter.acquire().await;
            attempts += 1;

            match call().await {
                Ok(Attempt::Data(payload)) => {
                    debug!(
                        ticker = context.ticker,
                        window_start = %context.window_start,
                        attempt = attempts,
                        "Fetch succeeded"
                    );
                    metrics::record_request(context.source, "data");
                    return FetchOutcome::Success(payload);
                }
                Ok(Attempt::Empty) => {
                    metrics::record_request(context.source, "empty");
                    return FetchOutcome::Empty;
                }
                Ok(Attempt::Throttled(detail)) => {
                    // Not counted against the budget: a throttled reply says the
                    // quota is saturated, not that the window is unfetchable.
                    warn!(
                        ticker = context.ticker,
                        window_start = %context.window_start,
                        attempt = attempts,
                        backoff_ms = self.policy.throttle_backoff.as_millis(),
                        detail = %detail,
                        "Throttled or malformed response, retrying"
                    );
                    metrics::record_request(context.source, "throttled");
                    metrics::record_retry(context.source, "throttled", self.policy.throttle_backoff);
                    sleep(self.policy.throttle_backoff).await;
                }
                Err(error) => {
                    retries += 1;
                    metrics::record_request(context.source, "error");
                    if retries > self.policy.max_retries {
                        warn!(
                            ticker = context.ticker,
                            window_start = %context.window_start,
                            attempts = attempts,
                            error = %error,
                            "Retry budget exhausted"
                        );
                        return FetchOutcome::Exhausted(FetchFailure {
                            attempts,
                            retries,
                            last_error: error,
                        });
                    }
                    warn!(
                        ticker = context.ticker,
                        window_start = %context.window_start,
                        attempt = attempts,
                        retry = retries,
                        max_retries = self.policy.max_retries,
                        backoff_ms = self.policy.error_backoff.as_millis(),
                        error = %error,
                        "Fetch failed, retrying"
                    );
                    metrics::record_retry(context.source, "error", self.policy.error_backoff);
                    sleep(self.policy.error_backoff).await;
                }
            }
        }
    }
}
