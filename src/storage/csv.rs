//! Per-ticker CSV tables
//!
//! Each ticker gets `<root>/<SOURCE>/<ticker>.csv` with the source's column
//! layout. Null fields are written as empty cells.

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{StorageError, StorageResult, StorageSink};
use crate::{CandleRow, RowSchema, Source};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Coinbase layout: `epoch, high, low, open, close, volume`
#[derive(Debug, Serialize)]
struct OhlcvRecord {
    epoch: i64,
    high: Option<f64>,
    low: Option<f64>,
    open: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl From<&CandleRow> for OhlcvRecord {
    fn from(row: &CandleRow) -> Self {
        Self {
            epoch: row.epoch,
            high: row.high,
            low: row.low,
            open: row.open,
            close: row.close,
            volume: row.volume,
        }
    }
}

/// Binance layout: `epoch, open, high, low, close, volume, amount, count`
#[derive(Debug, Serialize)]
struct OhlcvExtendedRecord {
    epoch: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    amount: Option<f64>,
    count: Option<u64>,
}

impl From<&CandleRow> for OhlcvExtendedRecord {
    fn from(row: &CandleRow) -> Self {
        Self {
            epoch: row.epoch,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            amount: row.amount,
            count: row.count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EpochOnly {
    epoch: i64,
}

/// CSV sink for one source (T052)
#[derive(Debug, Clone)]
pub struct CsvSink {
    root: PathBuf,
    source: Source,
}

impl CsvSink {
    /// Create a sink writing under `root/<SOURCE>/`
    pub fn new<P: AsRef<Path>>(root: P, source: Source) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            source,
        }
    }

    /// Directory holding this source's tables
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(self.source.code())
    }

    /// Table path for a ticker
    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.source_dir().join(format!("{ticker}.csv"))
    }

    /// Every stored epoch of a ticker in file order, duplicates included
    pub fn read_epochs(&self, ticker: &str) -> StorageResult<Vec<i64>> {
        read_epochs(&self.path_for(ticker))
    }

    /// Smallest and largest stored epoch of a ticker
    pub fn read_epoch_range(&self, ticker: &str) -> StorageResult<Option<(i64, i64)>> {
        read_epoch_range(&self.path_for(ticker))
    }
}

impl StorageSink for CsvSink {
    fn append(&mut self, ticker: &str, rows: &[CandleRow]) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let path = self.path_for(ticker);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::IoError(format!("Failed to open {}: {e}", path.display())))?;
        let is_new = file
            .metadata()
            .map_err(|e| StorageError::IoError(format!("Failed to stat {}: {e}", path.display())))?
            .len()
            == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));

        for row in rows {
            let written = match self.source.schema() {
                RowSchema::Ohlcv => writer.serialize(OhlcvRecord::from(row)),
                RowSchema::OhlcvExtended => writer.serialize(OhlcvExtendedRecord::from(row)),
            };
            written.map_err(|e| StorageError::CsvError(format!("Failed to write row: {e}")))?;
        }

        writer
            .flush()
            .map_err(|e| StorageError::IoError(format!("Failed to flush: {e}")))?;

        if is_new {
            info!(path = %path.display(), rows = rows.len(), "Created table");
        } else {
            debug!(path = %path.display(), rows = rows.len(), "Appended rows");
        }
        Ok(())
    }
}

/// Every epoch stored in a table, in file order
pub fn read_epochs(path: &Path) -> StorageResult<Vec<i64>> {
    let file = File::open(path)
        .map_err(|e| StorageError::IoError(format!("Failed to open {}: {e}", path.display())))?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

    reader
        .deserialize::<EpochOnly>()
        .map(|record| {
            record
                .map(|r| r.epoch)
                .map_err(|e| StorageError::CsvError(format!("Failed to read row: {e}")))
        })
        .collect()
}

/// Smallest and largest epoch stored in a table, `None` when it is missing or empty
pub fn read_epoch_range(path: &Path) -> StorageResult<Option<(i64, i64)>> {
    if !path.exists() {
        return Ok(None);
    }
    let epochs = read_epochs(path)?;
    Ok(epochs
        .iter()
        .min()
        .zip(epochs.iter().max())
        .map(|(min, max)| (*min, *max)))
}
