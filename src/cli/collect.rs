//! Collect commands

use chrono::{DateTime, Utc};
use clap::Args;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{create_progress_bar, parse_date, Cli, CliError, OutputFormat};
use crate::collector::{CollectionRunner, Summary};
use crate::source::{create_adapter, SourceAdapter};
use crate::storage::csv::CsvSink;
use crate::storage::meta::{MetaRecord, MetaStore};
use crate::universe::{self, default_quote, resolve_tickers};
use crate::Source;

/// Arguments for collecting one ticker
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Source ticker (e.g. BTC-USD on CB, BTCUSDT on BN)
    #[arg(long)]
    pub ticker: String,

    /// Source identifier: CB or BN
    #[arg(long)]
    pub source: Source,

    /// First day to collect (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// Last day to collect, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,
}

impl CollectArgs {
    /// Execute the collect command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let start = parse_date(&self.start)?;
        let end = parse_date(&self.end)?;
        let adapter = create_adapter(self.source)?;

        let summary = collect_listed(cli, adapter.as_ref(), &self.ticker, start, end).await?;

        match cli.output_format {
            OutputFormat::Json => output_json(self.source, &[summary], &[])?,
            OutputFormat::Human => output_human(self.source, &summary),
        }
        Ok(())
    }
}

/// Arguments for collecting a universe
#[derive(Args, Debug)]
pub struct CollectUniverseArgs {
    /// Universe file (default: <data-dir>/universe.json)
    #[arg(long)]
    pub universe: Option<PathBuf>,

    /// Source identifier: CB or BN
    #[arg(long)]
    pub source: Source,

    /// First day to collect (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// Last day to collect, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,

    /// Quote currency (default: USD on CB, USDT on BN)
    #[arg(long)]
    pub quote: Option<String>,
}

impl CollectUniverseArgs {
    /// Execute the collect-universe command
    ///
    /// Tickers are collected one after another; a ticker the source does
    /// not list is reported and skipped.
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let start = parse_date(&self.start)?;
        let end = parse_date(&self.end)?;
        let path = self
            .universe
            .clone()
            .unwrap_or_else(|| cli.data_dir.join("universe.json"));
        let quote = self
            .quote
            .clone()
            .unwrap_or_else(|| default_quote(self.source).to_string());

        let bases = universe::load_universe(&path)?;
        let adapter = create_adapter(self.source)?;
        let products = adapter.list_products().await?;
        let resolution = resolve_tickers(self.source, &bases, &quote, &products);

        for ticker in &resolution.unsupported {
            warn!(ticker = %ticker, source = %self.source, "Ticker not listed, skipping");
            if cli.output_format == OutputFormat::Human {
                println!("{ticker} is not supported in {}", self.source);
            }
        }

        info!(
            tickers = resolution.supported.len(),
            unsupported = resolution.unsupported.len(),
            "Collecting universe"
        );

        let mut summaries = Vec::with_capacity(resolution.supported.len());
        for ticker in &resolution.supported {
            if cli.output_format == OutputFormat::Human {
                println!("\nmaking {ticker}");
            }
            let summary = collect_ticker(cli, adapter.as_ref(), ticker, start, end).await?;
            if cli.output_format == OutputFormat::Human {
                output_human(self.source, &summary);
            }
            summaries.push(summary);
        }

        if cli.output_format == OutputFormat::Json {
            output_json(self.source, &summaries, &resolution.unsupported)?;
        }
        Ok(())
    }
}

/// Collect one ticker after checking the source lists it
///
/// Fails with [`CliError::InvalidArgument`] before any candle call when the
/// ticker is not listed.
pub async fn collect_listed(
    cli: &Cli,
    adapter: &dyn SourceAdapter,
    ticker: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Summary, CliError> {
    let products = adapter.list_products().await?;
    if !products.iter().any(|p| p == ticker) {
        return Err(CliError::InvalidArgument(format!(
            "{ticker} is not supported in {}",
            adapter.source()
        )));
    }
    collect_ticker(cli, adapter, ticker, start, end).await
}

/// Run one ticker to completion and record its meta entry
pub async fn collect_ticker(
    cli: &Cli,
    adapter: &dyn SourceAdapter,
    ticker: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Summary, CliError> {
    let source = adapter.source();
    let price_dir = cli.price_dir();
    let mut sink = CsvSink::new(&price_dir, source);

    let mut runner = CollectionRunner::new(adapter, &mut sink, cli.profile(source))
        .with_retry_policy(cli.retry_policy());
    if cli.output_format == OutputFormat::Human {
        runner = runner.with_progress_bar(create_progress_bar(ticker.to_string()));
    }

    let summary = runner.run(ticker, start, end).await?;

    MetaStore::new(&price_dir, source).upsert(ticker, MetaRecord::from_summary(&summary))?;
    Ok(summary)
}

fn output_json(source: Source, summaries: &[Summary], unsupported: &[String]) -> Result<(), CliError> {
    let output = serde_json::json!({
        "success": true,
        "source": source.code(),
        "summaries": summaries,
        "unsupported": unsupported,
    });
    let text = serde_json::to_string(&output).map_err(|e| CliError::OutputError(e.to_string()))?;
    println!("{text}");
    Ok(())
}

fn output_human(source: Source, summary: &Summary) {
    println!("\nCollection of {} ({}) completed", summary.ticker, source);
    match summary.first_data_instant {
        Some(first) => println!("First data: {first}"),
        None => println!("First data: none found"),
    }
    println!("Requested end: {}", summary.requested_end);
    println!(
        "Rows: {} ({} with missing fields)",
        summary.total_rows, summary.total_na_rows
    );
    println!(
        "Windows: {} fetched, {} empty, {} skipped, {} failed of {}",
        summary.fetched_windows,
        summary.empty_windows,
        summary.skipped_windows,
        summary.failed_windows.len(),
        summary.windows_total
    );
    for failed in &summary.failed_windows {
        println!(
            "  failed {} - {} after {} attempts: {}",
            failed.start, failed.end, failed.attempts, failed.error
        );
    }
}
