//! Contract tests for the Binance spot endpoints the collector relies on
//!
//! These hit the live API and are ignored by default; run them with
//! `cargo test -- --ignored` to confirm the wire format still matches.

use serde_json::Value;

/// Contract test for /api/v3/klines at 1-minute granularity
#[tokio::test]
#[ignore] // Requires network access
async fn test_binance_spot_klines_contract() {
    let client = reqwest::Client::new();

    let url = "https://api.binance.com/api/v3/klines";
    let params = [
        ("symbol", "BTCUSDT"),
        ("interval", "1m"),
        ("startTime", "1640995200000"),
        ("endTime", "1641023940000"),
        ("limit", "1000"),
    ];

    let response = client
        .get(url)
        .query(&params)
        .send()
        .await
        .expect("Failed to send request to Binance API");

    assert!(
        response.status().is_success(),
        "Expected successful response, got: {}",
        response.status()
    );

    let body: Value = response.json().await.expect("Failed to parse JSON response");
    let klines = body.as_array().expect("Response should be an array");

    // 8 hours of minutes
    assert_eq!(klines.len(), 480);

    let first = klines[0].as_array().expect("Each kline should be an array");
    assert_eq!(first.len(), 12, "Each kline should have exactly 12 elements");
    assert_eq!(first[0].as_i64(), Some(1_640_995_200_000));
    assert!(first[1].is_string(), "Open should be a string");
    assert!(first[8].is_i64(), "Trade count should be an integer");
}

/// Contract test for the listing probe: BTCUSDT starts trading 2017-08-17
#[tokio::test]
#[ignore] // Requires network access
async fn test_binance_spot_listing_probe_contract() {
    let client = reqwest::Client::new();

    let params = [
        ("symbol", "BTCUSDT"),
        ("interval", "1m"),
        ("startTime", "1483228800000"),
        ("limit", "2"),
    ];

    let body: Value = client
        .get("https://api.binance.com/api/v3/klines")
        .query(&params)
        .send()
        .await
        .expect("Failed to send request to Binance API")
        .json()
        .await
        .expect("Failed to parse JSON response");

    let open_time = body[0][0].as_i64().expect("Open time should be an integer");
    assert_eq!(open_time, 1_502_942_400_000);
}

/// Contract test for /api/v3/exchangeInfo
#[tokio::test]
#[ignore] // Requires network access
async fn test_binance_exchange_info_contract() {
    let body: Value = reqwest::get("https://api.binance.com/api/v3/exchangeInfo")
        .await
        .expect("Failed to send request to Binance API")
        .json()
        .await
        .expect("Failed to parse JSON response");

    let symbols = body["symbols"].as_array().expect("symbols should be an array");
    assert!(symbols.iter().any(|s| s["symbol"] == "BTCUSDT"));
}
