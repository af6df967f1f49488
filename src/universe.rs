//! Ticker universe handling
//!
//! A universe file lists base-asset symbols, either as a flat JSON array
//! (`["BTC", "ETH"]`) or as `[[symbols], [names]]`. Stablecoins are dropped
//! and the remaining symbols become source tickers (`BTC-USD` on Coinbase,
//! `BTCUSDT` on Binance) checked against the source's product listing.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::Source;

/// Symbols never collected
pub const STABLECOINS: &[&str] = &[
    "UST", "DAI", "GUSD", "USDT", "USDC", "MUSD", "WBTC", "GYEN", "CBETH", "BUSD", "PAX",
];

/// Universe errors
#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    /// IO error
    #[error("IO error reading {path}: {message}")]
    IoError {
        /// File that failed
        path: String,
        /// Underlying error
        message: String,
    },

    /// Parse error
    #[error("invalid universe file: {0}")]
    ParseError(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UniverseFile {
    Symbols(Vec<String>),
    SymbolsAndNames(Vec<Vec<String>>),
}

/// Tickers split by whether the source lists them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Tickers the source lists, in universe order
    pub supported: Vec<String>,
    /// Tickers the source does not list
    pub unsupported: Vec<String>,
}

/// Parse universe JSON into base symbols, stablecoins removed
pub fn parse_universe(json: &str) -> Result<Vec<String>, UniverseError> {
    let file: UniverseFile =
        serde_json::from_str(json).map_err(|e| UniverseError::ParseError(e.to_string()))?;

    let symbols = match file {
        UniverseFile::Symbols(symbols) => symbols,
        UniverseFile::SymbolsAndNames(mut lists) => {
            if lists.is_empty() {
                return Err(UniverseError::ParseError("empty symbol list".to_string()));
            }
            lists.swap_remove(0)
        }
    };

    let mut seen = HashSet::new();
    let bases: Vec<String> = symbols
        .into_iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| !is_stablecoin(s))
        .filter(|s| seen.insert(s.clone()))
        .collect();

    debug!(count = bases.len(), "Universe parsed");
    Ok(bases)
}

/// Load a universe file
pub fn load_universe<P: AsRef<Path>>(path: P) -> Result<Vec<String>, UniverseError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| UniverseError::IoError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let bases = parse_universe(&contents)?;
    info!(path = %path.display(), symbols = bases.len(), "Universe loaded");
    Ok(bases)
}

/// Whether a base symbol is a stablecoin
pub fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(symbol))
}

/// Default quote currency of a source
pub fn default_quote(source: Source) -> &'static str {
    match source {
        Source::Coinbase => "USD",
        Source::Binance => "USDT",
    }
}

/// Source ticker for a base/quote pair
pub fn ticker_for(source: Source, base: &str, quote: &str) -> String {
    match source {
        Source::Coinbase => format!("{}-{}", base.to_uppercase(), quote.to_uppercase()),
        Source::Binance => format!("{}{}", base.to_uppercase(), quote.to_uppercase()),
    }
}

/// Form tickers and split them by the source's product listing
pub fn resolve_tickers(source: Source, bases: &[String], quote: &str, products: &[String]) -> Resolution {
    let listed: HashSet<&str> = products.iter().map(String::as_str).collect();
    let mut resolution = Resolution::default();

    for base in bases {
        let ticker = ticker_for(source, base, quote);
        if listed.contains(ticker.as_str()) {
            resolution.supported.push(ticker);
        } else {
            resolution.unsupported.push(ticker);
        }
    }
    resolution
}
