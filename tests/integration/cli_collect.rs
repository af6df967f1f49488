//! Single-ticker collection through the CLI layer

use candle_collector::cli::collect::collect_listed;
use candle_collector::cli::{Cli, CliError};
use candle_collector::source::coinbase::CoinbaseAdapter;
use candle_collector::storage::meta::MetaStore;
use candle_collector::Source;
use chrono::{TimeZone, Utc};
use clap::Parser;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cli_for(dir: &TempDir) -> Cli {
    let data_dir = dir.path().to_str().unwrap();
    Cli::try_parse_from([
        "candle-collector",
        "--data-dir",
        data_dir,
        "--rate-limit",
        "100",
        "products",
        "--source",
        "CB",
    ])
    .unwrap()
}

async fn mount_products(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "BTC-USD"},
            {"id": "ETH-USD"}
        ])))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_unlisted_ticker_fails_before_any_candle_call() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_products(&server).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/products/[^/]+/candles$"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "NotFound"})))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = CoinbaseAdapter::with_base_url(server.uri()).unwrap();
    let day = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();

    let err = collect_listed(&cli_for(&dir), &adapter, "BOGUS-USD", day, day)
        .await
        .unwrap_err();
    match err {
        CliError::InvalidArgument(message) => {
            assert_eq!(message, "BOGUS-USD is not supported in CB");
        }
        other => panic!("expected invalid argument, got {other:?}"),
    }
    assert!(!dir.path().join("price").exists());
}

#[tokio::test]
async fn test_listed_ticker_is_collected_and_recorded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_products(&server).await;

    let start = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    let candles: Vec<Value> = (0..240)
        .rev()
        .map(|i| json!([start.timestamp() + i * 60, 0.5, 1.5, 1.0, 1.2, 10.0]))
        .collect();
    Mock::given(method("GET"))
        .and(path("/products/BTC-USD/candles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candles))
        .mount(&server)
        .await;

    let cli = cli_for(&dir);
    let adapter = CoinbaseAdapter::with_base_url(server.uri()).unwrap();

    let summary = collect_listed(&cli, &adapter, "BTC-USD", start, start).await.unwrap();
    assert_eq!(summary.fetched_windows, 6);
    assert_eq!(summary.first_data_instant, Some(start));

    let record = MetaStore::new(cli.price_dir(), Source::Coinbase)
        .get("BTC-USD")
        .unwrap()
        .unwrap();
    assert_eq!(record.count, summary.total_rows);
}
