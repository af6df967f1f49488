//! Observability metrics for the collection loop
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs the Prometheus exporter.
//!
//! ## Metrics
//!
//! - `source_requests_total{source,outcome}` - wire calls by classified outcome
//! - `fetch_retries_total{source,kind}` and `retry_backoff_duration_seconds`
//! - `rate_limit_wait_seconds` - time spent in the sliding-window limiter
//! - `windows_total{source,outcome}` - windows fetched, empty, failed or skipped
//! - `rows_collected_total{source}` and `na_rows_total{source}`
//! - `run_duration_seconds{source}` - wall time of one ticker run

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::Source;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metrics system with Prometheus exporter
///
/// Must be called from within a Tokio runtime. Calling it again after a
/// successful install does nothing.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.load(Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "source_requests_total",
        Unit::Count,
        "Wire calls made to a price source, by classified outcome"
    );
    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Retries after hard failures or throttled responses"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for the sliding-window rate limiter"
    );
    describe_counter!(
        "windows_total",
        Unit::Count,
        "Chunk windows processed, by outcome"
    );
    describe_counter!(
        "rows_collected_total",
        Unit::Count,
        "Reindexed rows collected"
    );
    describe_counter!(
        "na_rows_total",
        Unit::Count,
        "Collected rows with at least one null field"
    );
    describe_histogram!(
        "run_duration_seconds",
        Unit::Seconds,
        "Wall time of one ticker's collection run"
    );

    METRICS_INITIALIZED.store(true, Ordering::SeqCst);
    info!("Metrics system initialized on {}", addr);
    Ok(())
}

/// Check if the exporter is installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Record one wire call and its classified outcome
pub fn record_request(source: Source, outcome: &'static str) {
    counter!(
        "source_requests_total",
        "source" => source.code(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record a retry and the backoff slept before it
pub fn record_retry(source: Source, kind: &'static str, backoff: Duration) {
    counter!(
        "fetch_retries_total",
        "source" => source.code(),
        "kind" => kind,
    )
    .increment(1);

    histogram!(
        "retry_backoff_duration_seconds",
        "kind" => kind,
    )
    .record(backoff.as_secs_f64());
}

/// Record time spent in the rate limiter
pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("rate_limit_wait_seconds").record(waited.as_secs_f64());
}

/// Record how a window ended
pub fn record_window(source: Source, outcome: &'static str) {
    counter!(
        "windows_total",
        "source" => source.code(),
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record rows collected from one window
pub fn record_rows(source: Source, rows: u64, na_rows: u64) {
    counter!("rows_collected_total", "source" => source.code()).increment(rows);
    counter!("na_rows_total", "source" => source.code()).increment(na_rows);
}

/// Per-ticker run metrics
pub struct RunMetrics {
    source: Source,
    ticker: String,
    start_time: Instant,
}

impl RunMetrics {
    /// Start tracking a run
    pub fn start(source: Source, ticker: impl Into<String>) -> Self {
        let ticker = ticker.into();
        debug!(source = %source, ticker = %ticker, "Run metrics started");
        Self {
            source,
            ticker,
            start_time: Instant::now(),
        }
    }

    /// Record a completed run
    pub fn record_success(&self, rows: u64, failed_windows: usize) {
        let duration = self.start_time.elapsed();
        histogram!("run_duration_seconds", "source" => self.source.code())
            .record(duration.as_secs_f64());

        debug!(
            source = %self.source,
            ticker = %self.ticker,
            rows = rows,
            failed_windows = failed_windows,
            duration_secs = duration.as_secs(),
            "Run metrics recorded"
        );
    }

    /// Record a run aborted by a storage failure
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();
        histogram!("run_duration_seconds", "source" => self.source.code())
            .record(duration.as_secs_f64());

        error!(
            source = %self.source,
            ticker = %self.ticker,
            error = %error,
            duration_secs = duration.as_secs(),
            "Run aborted"
        );
    }
}
