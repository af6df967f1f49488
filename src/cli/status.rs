//! Status command: stored range and last run of a ticker

use chrono::{DateTime, Utc};
use clap::Args;

use super::{Cli, CliError, OutputFormat};
use crate::storage::csv::CsvSink;
use crate::storage::meta::MetaStore;
use crate::Source;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Source ticker
    #[arg(long)]
    pub ticker: String,

    /// Source identifier: CB or BN
    #[arg(long)]
    pub source: Source,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let price_dir = cli.price_dir();
        let sink = CsvSink::new(&price_dir, self.source);
        let range = sink.read_epoch_range(&self.ticker)?;
        let meta = MetaStore::new(&price_dir, self.source).get(&self.ticker)?;

        let to_instant = |epoch: i64| DateTime::<Utc>::from_timestamp(epoch, 0);

        match cli.output_format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "ticker": self.ticker,
                    "source": self.source.code(),
                    "path": sink.path_for(&self.ticker).display().to_string(),
                    "stored_from": range.and_then(|(min, _)| to_instant(min)),
                    "stored_to": range.and_then(|(_, max)| to_instant(max)),
                    "meta": meta,
                });
                let text = serde_json::to_string(&output)
                    .map_err(|e| CliError::OutputError(e.to_string()))?;
                println!("{text}");
            }
            OutputFormat::Human => {
                println!("{} ({})", self.ticker, self.source);
                println!("Table: {}", sink.path_for(&self.ticker).display());
                match range.and_then(|(min, max)| to_instant(min).zip(to_instant(max))) {
                    Some((from, to)) => println!("Stored: {from} to {to}"),
                    None => println!("Stored: nothing yet"),
                }
                match meta {
                    Some(record) => println!(
                        "Last run: {} rows ({} incomplete), end {}, updated {}",
                        record.count, record.na, record.end, record.updated_at
                    ),
                    None => println!("Last run: none recorded"),
                }
            }
        }
        Ok(())
    }
}
