//! CLI command implementations

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::collector::{RetryPolicy, SourceProfile};
use crate::Source;

pub mod collect;
pub mod error;
pub mod products;
pub mod status;

pub use collect::{CollectArgs, CollectUniverseArgs};
pub use error::CliError;
pub use products::ProductsArgs;
pub use status::StatusArgs;

/// Candle collector CLI
#[derive(Parser, Debug)]
#[command(name = "candle-collector")]
#[command(about = "Collect 1-minute OHLCV candles from Coinbase and Binance", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Data root directory; candles go to <data-dir>/price/<SOURCE>/
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Calls allowed per second (default: 10)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub rate_limit: Option<u32>,

    /// Flush to disk after this many fetched windows (default: CB 6, BN 4)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub flush_every: Option<u32>,

    /// Retries after hard failures before a window is skipped (default: 5, range: 0-20)
    #[arg(long, global = true, default_value = "5", value_parser = clap::value_parser!(u32).range(0..=20))]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Collection profile for a source with CLI overrides applied
    pub fn profile(&self, source: Source) -> SourceProfile {
        let mut profile = source.profile();
        if let Some(rate_limit) = self.rate_limit {
            profile = profile.with_rate_limit(rate_limit as usize);
        }
        if let Some(flush_every) = self.flush_every {
            profile = profile.with_flush_every(flush_every as usize);
        }
        profile
    }

    /// Retry policy with the CLI budget
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    /// Root of the price tables
    pub fn price_dir(&self) -> PathBuf {
        self.data_dir.join("price")
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect candles for one ticker
    Collect(CollectArgs),

    /// Collect candles for every supported ticker of a universe file
    CollectUniverse(CollectUniverseArgs),

    /// List the tickers a source offers
    Products(ProductsArgs),

    /// Show the stored range and last run of a ticker
    Status(StatusArgs),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Parse a date as YYYY-MM-DD (midnight UTC) or an RFC3339 datetime
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, CliError> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{input}Z")) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| CliError::InvalidArgument(format!("Invalid date {input:?}: {e}")))?;
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CliError::InvalidArgument(format!("Invalid date {input:?}")))?;
    Ok(datetime.and_utc())
}

/// Window progress bar for human output
pub(crate) fn create_progress_bar(message: String) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}
