//! Universe files on disk

use candle_collector::universe::{load_universe, resolve_tickers, UniverseError};
use candle_collector::Source;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_universe(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_symbols_and_names_file() {
    let file = write_universe(r#"[["BTC", "ETH", "USDT", "DOGE"], ["Bitcoin", "Ethereum", "Tether", "Dogecoin"]]"#);
    let bases = load_universe(file.path()).unwrap();
    assert_eq!(bases, vec!["BTC", "ETH", "DOGE"]);

    let products = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
    let resolution = resolve_tickers(Source::Binance, &bases, "USDT", &products);
    assert_eq!(resolution.supported, vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(resolution.unsupported, vec!["DOGEUSDT"]);
}

#[test]
fn test_load_rejects_invalid_json() {
    let file = write_universe("BTC,ETH");
    assert!(matches!(load_universe(file.path()), Err(UniverseError::ParseError(_))));
}
