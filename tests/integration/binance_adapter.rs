//! Integration tests for the Binance adapter against a mock server

use candle_collector::collector::chunker::TimeWindow;
use candle_collector::collector::retry::Attempt;
use candle_collector::source::binance::BinanceAdapter;
use candle_collector::source::{SourceAdapter, SourceError};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper: start a mock server and point an adapter at it
async fn setup() -> (MockServer, BinanceAdapter) {
    let server = MockServer::start().await;
    let adapter = BinanceAdapter::with_base_url(server.uri()).unwrap();
    (server, adapter)
}

fn at(h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 1, 1, h, min, 0).unwrap()
}

/// Fixture: one spot kline opening at `epoch` seconds
fn kline(epoch: i64) -> Value {
    json!([
        epoch * 1_000,
        "46216.93",
        "46271.08",
        "46208.37",
        "46250.00",
        "40.57574",
        epoch * 1_000 + 59_999,
        "1876429.15",
        1_137,
        "19.11",
        "883859.35",
        "0"
    ])
}

// Klines decoding

#[tokio::test]
async fn test_fetch_window_sends_millisecond_bounds() {
    let (server, adapter) = setup().await;
    let window = TimeWindow::new(at(0, 0), at(7, 59)).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .and(query_param("startTime", "1640995200000"))
        .and(query_param("endTime", "1641023940000"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            kline(1_640_995_200),
            kline(1_640_995_320)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = match adapter.fetch_window("BTCUSDT", &window).await.unwrap() {
        Attempt::Data(rows) => rows,
        other => panic!("expected data, got {other:?}"),
    };

    assert_eq!(rows.len(), 480);

    let first = rows[0];
    assert_eq!(first.epoch, 1_640_995_200);
    assert_eq!(first.open, Some(46216.93));
    assert_eq!(first.high, Some(46271.08));
    assert_eq!(first.low, Some(46208.37));
    assert_eq!(first.close, Some(46250.00));
    assert_eq!(first.volume, Some(40.57574));
    assert_eq!(first.amount, Some(1876429.15));
    assert_eq!(first.count, Some(1_137));

    // Missing minute between the two klines
    assert!(rows[1].is_empty());
    assert_eq!(rows[1].epoch, 1_640_995_260);
    assert_eq!(rows[2].epoch, 1_640_995_320);
    assert!(!rows[2].is_empty());
    assert!(rows[3..].iter().all(|r| r.is_empty()));
}

#[tokio::test]
async fn test_empty_array_is_empty_attempt() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let window = TimeWindow::new(at(0, 0), at(7, 59)).unwrap();
    let attempt = adapter.fetch_window("BTCUSDT", &window).await.unwrap();
    assert!(matches!(attempt, Attempt::Empty));
}

// Status handling

#[tokio::test]
async fn test_rate_limit_status_is_hard_failure() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"code": -1003, "msg": "Too many requests"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let window = TimeWindow::new(at(0, 0), at(7, 59)).unwrap();
    let err = adapter.fetch_window("BTCUSDT", &window).await.unwrap_err();
    match err {
        SourceError::Http { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("-1003"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_kline_is_decode_error() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([[1_640_995_200_000_i64, "abc", "1", "1", "1", "1", 0, "1", 1, "0", "0", "0"]])),
        )
        .mount(&server)
        .await;

    let window = TimeWindow::new(at(0, 0), at(7, 59)).unwrap();
    let err = adapter.fetch_window("BTCUSDT", &window).await.unwrap_err();
    assert!(matches!(err, SourceError::Decode(_)));
}

// Listing probe

#[tokio::test]
async fn test_earliest_available_reads_first_open_time() {
    let (server, adapter) = setup().await;
    let listed = Utc.with_ymd_and_hms(2017, 8, 17, 4, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("startTime", "1483228800000"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            kline(listed.timestamp()),
            kline(listed.timestamp() + 60)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let from = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
    let earliest = adapter.earliest_available("BTCUSDT", from).await.unwrap();
    assert_eq!(earliest, Some(listed));
}

#[tokio::test]
async fn test_earliest_available_without_matrix_returns_from() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let from = at(0, 0);
    assert_eq!(adapter.earliest_available("NEWUSDT", from).await.unwrap(), Some(from));
}

// Product listing

#[tokio::test]
async fn test_list_products_reads_exchange_info() {
    let (server, adapter) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timezone": "UTC",
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING"},
                {"symbol": "ETHUSDT", "status": "TRADING"}
            ]
        })))
        .mount(&server)
        .await;

    let products = adapter.list_products().await.unwrap();
    assert_eq!(products, vec!["BTCUSDT", "ETHUSDT"]);
}
