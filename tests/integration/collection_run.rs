//! End-to-end collection runs against mock exchanges
//!
//! Real time is used, so retry backoffs are shortened and the rate limit
//! raised wherever a test is not about pacing.

use candle_collector::collector::{CollectionRunner, RetryPolicy, SourceProfile};
use candle_collector::source::binance::BinanceAdapter;
use candle_collector::source::coinbase::CoinbaseAdapter;
use candle_collector::storage::csv::CsvSink;
use candle_collector::storage::meta::{MetaRecord, MetaStore};
use candle_collector::Source;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 5,
        error_backoff: Duration::from_millis(10),
        throttle_backoff: Duration::from_millis(10),
    }
}

fn query(request: &Request, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Serves one kline per minute of the requested range, none before `listed_ms`
struct KlinesResponder {
    listed_ms: i64,
}

impl Respond for KlinesResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let start = query(request, "startTime")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            .max(self.listed_ms);
        let limit = query(request, "limit").and_then(|v| v.parse::<i64>().ok()).unwrap_or(500);
        let end = query(request, "endTime")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(start + (limit - 1) * 60_000);

        let rows: Vec<Value> = (start..=end)
            .step_by(60_000)
            .take(limit as usize)
            .map(|open| {
                json!([open, "1.0", "1.5", "0.5", "1.2", "10.0", open + 59_999, "12.0", 7, "5.0", "6.0", "0"])
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(rows)
    }
}

/// Serves Coinbase candles newest first, nothing after `delisted`
struct CandlesResponder {
    delisted: i64,
}

impl Respond for CandlesResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let bound = |name: &str| {
            query(request, name)
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|t| t.timestamp())
                .unwrap_or(0)
        };
        let start = bound("start");
        let end = bound("end").min(self.delisted);

        let rows: Vec<Value> = (start..=end)
            .rev()
            .step_by(60)
            .map(|t| json!([t, 0.5, 1.5, 1.0, 1.2, 10.0]))
            .collect();
        ResponseTemplate::new(200).set_body_json(rows)
    }
}

async fn mount_klines(server: &MockServer, listed_ms: i64) {
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(KlinesResponder { listed_ms })
        .mount(server)
        .await;
}

// Retry exhaustion

#[tokio::test]
async fn test_exhausted_window_is_excluded_and_run_continues() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // First 4-hour window answers 429 on every attempt
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("startTime", "1640995200000"))
        .and(query_param("limit", "1000"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"code": -1003, "msg": "Too many requests"})),
        )
        .expect(6)
        .mount(&server)
        .await;
    mount_klines(&server, 0).await;

    let adapter = BinanceAdapter::with_base_url(server.uri()).unwrap();
    let mut sink = CsvSink::new(dir.path(), Source::Binance);
    let profile = SourceProfile::for_source(Source::Binance)
        .with_chunk_width(TimeDelta::hours(4))
        .with_rate_limit(100);

    let summary = CollectionRunner::new(&adapter, &mut sink, profile)
        .with_retry_policy(fast_policy())
        .run("BTCUSDT", day(2022, 1, 1), day(2022, 1, 1))
        .await
        .unwrap();

    assert_eq!(summary.windows_total, 6);
    assert_eq!(summary.fetched_windows, 5);
    assert_eq!(summary.failed_windows.len(), 1);

    let failed = &summary.failed_windows[0];
    assert_eq!(failed.start, day(2022, 1, 1));
    assert_eq!(failed.end, Utc.with_ymd_and_hms(2022, 1, 1, 3, 59, 0).unwrap());
    assert_eq!(failed.attempts, 6);
    assert!(failed.error.contains("429"));

    assert_eq!(
        summary.first_data_instant,
        Some(Utc.with_ymd_and_hms(2022, 1, 1, 4, 0, 0).unwrap())
    );
    assert_eq!(summary.total_rows, 5 * 240);

    let epochs = sink.read_epochs("BTCUSDT").unwrap();
    assert_eq!(epochs.len(), 5 * 240);
    assert_eq!(epochs[0], 1_641_009_600);
    assert_eq!(*epochs.last().unwrap(), 1_641_081_540);
}

// Listing floor

#[tokio::test]
async fn test_windows_before_listing_are_skipped() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let listed = Utc.with_ymd_and_hms(2017, 8, 17, 4, 0, 0).unwrap();

    mount_klines(&server, listed.timestamp() * 1_000).await;

    let adapter = BinanceAdapter::with_base_url(server.uri()).unwrap();
    let mut sink = CsvSink::new(dir.path(), Source::Binance);
    let profile = SourceProfile::for_source(Source::Binance).with_rate_limit(100);

    let summary = CollectionRunner::new(&adapter, &mut sink, profile)
        .with_retry_policy(fast_policy())
        .run("BTCUSDT", day(2017, 8, 14), day(2017, 8, 17))
        .await
        .unwrap();

    assert_eq!(summary.windows_total, 12);
    assert_eq!(summary.skipped_windows, 9);
    assert_eq!(summary.fetched_windows, 3);
    assert_eq!(summary.first_data_instant, Some(listed));
    assert_eq!(summary.total_rows, 3 * 480);
    assert_eq!(summary.total_na_rows, 240);

    let window_calls: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| query(r, "limit").as_deref() == Some("1000"))
        .filter_map(|r| query(r, "startTime"))
        .collect();
    assert_eq!(window_calls.len(), 3);
    assert_eq!(window_calls[0], (day(2017, 8, 17).timestamp() * 1_000).to_string());
}

// Coinbase throttling

#[tokio::test]
async fn test_throttled_replies_are_retried_until_data() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/products/BTC-USD/candles"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "Slow down"})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/products/BTC-USD/candles"))
        .respond_with(CandlesResponder { delisted: i64::MAX })
        .expect(6)
        .mount(&server)
        .await;

    let adapter = CoinbaseAdapter::with_base_url(server.uri()).unwrap();
    let mut sink = CsvSink::new(dir.path(), Source::Coinbase);
    let profile = SourceProfile::for_source(Source::Coinbase).with_rate_limit(100);

    let summary = CollectionRunner::new(&adapter, &mut sink, profile)
        .with_retry_policy(fast_policy())
        .run("BTC-USD", day(2022, 1, 1), day(2022, 1, 1))
        .await
        .unwrap();

    assert!(summary.failed_windows.is_empty());
    assert_eq!(summary.fetched_windows, 6);
    assert_eq!(summary.total_rows, 1_440);
    assert_eq!(summary.total_na_rows, 0);
    assert_eq!(summary.first_data_instant, Some(day(2022, 1, 1)));

    let epochs = sink.read_epochs("BTC-USD").unwrap();
    assert_eq!(epochs.len(), 1_440);
    assert!(epochs.windows(2).all(|w| w[1] - w[0] == 60));
}

#[tokio::test]
async fn test_windows_after_delisting_are_empty() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let delisted = Utc.with_ymd_and_hms(2022, 1, 1, 12, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/products/OLD-USD/candles"))
        .respond_with(CandlesResponder { delisted: delisted.timestamp() - 60 })
        .mount(&server)
        .await;

    let adapter = CoinbaseAdapter::with_base_url(server.uri()).unwrap();
    let mut sink = CsvSink::new(dir.path(), Source::Coinbase);
    let profile = SourceProfile::for_source(Source::Coinbase).with_rate_limit(100);

    let summary = CollectionRunner::new(&adapter, &mut sink, profile)
        .with_retry_policy(fast_policy())
        .run("OLD-USD", day(2022, 1, 1), day(2022, 1, 1))
        .await
        .unwrap();

    assert_eq!(summary.fetched_windows, 3);
    assert_eq!(summary.empty_windows, 3);
    assert_eq!(summary.total_rows, 720);
    assert_eq!(sink.read_epoch_range("OLD-USD").unwrap(), Some((1_640_995_200, 1_641_038_340)));
}

// Repeated runs

#[tokio::test]
async fn test_rerun_appends_duplicate_epochs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_klines(&server, 0).await;

    let adapter = BinanceAdapter::with_base_url(server.uri()).unwrap();
    let mut sink = CsvSink::new(dir.path(), Source::Binance);
    let meta = MetaStore::new(dir.path(), Source::Binance);

    for _ in 0..2 {
        let profile = SourceProfile::for_source(Source::Binance).with_rate_limit(100);
        let summary = CollectionRunner::new(&adapter, &mut sink, profile)
            .with_retry_policy(fast_policy())
            .run("ETHUSDT", day(2022, 1, 1), day(2022, 1, 1))
            .await
            .unwrap();
        meta.upsert("ETHUSDT", MetaRecord::from_summary(&summary)).unwrap();
    }

    let epochs = sink.read_epochs("ETHUSDT").unwrap();
    assert_eq!(epochs.len(), 2 * 1_440);
    assert_eq!(epochs[0], epochs[1_440]);
    assert_eq!(epochs.iter().filter(|&&e| e == 1_640_995_200).count(), 2);

    // Header written once
    let contents = std::fs::read_to_string(sink.path_for("ETHUSDT")).unwrap();
    assert_eq!(contents.lines().filter(|l| l.starts_with("epoch")).count(), 1);

    let records = meta.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records["ETHUSDT"].count, 1_440);
}

// Pacing

#[tokio::test]
async fn test_rate_limit_paces_wire_calls() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/products/BTC-USD/candles"))
        .respond_with(CandlesResponder { delisted: i64::MAX })
        .expect(6)
        .mount(&server)
        .await;

    let adapter = CoinbaseAdapter::with_base_url(server.uri()).unwrap();
    let mut sink = CsvSink::new(dir.path(), Source::Coinbase);
    let profile = SourceProfile::for_source(Source::Coinbase).with_rate_limit(3);

    let started = Instant::now();
    let summary = CollectionRunner::new(&adapter, &mut sink, profile)
        .with_retry_policy(fast_policy())
        .run("BTC-USD", day(2022, 1, 1), day(2022, 1, 1))
        .await
        .unwrap();

    assert_eq!(summary.fetched_windows, 6);
    // Calls 4 to 6 wait for the first second to pass
    assert!(started.elapsed() >= Duration::from_millis(950));
}
