//! Append-only persistence and meta records

use crate::CandleRow;

pub mod csv;
pub mod meta;

/// Storage errors (T050)
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write or read error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// File lock error
    #[error("lock error: {0}")]
    LockError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Append-only sink keyed by ticker (T051)
///
/// The first append for a ticker creates its table; later appends add rows.
/// Rows are never deduplicated, so re-collecting an overlapping range
/// stores the overlapping epochs twice.
pub trait StorageSink {
    /// Append rows to the ticker's table
    fn append(&mut self, ticker: &str, rows: &[CandleRow]) -> StorageResult<()>;
}
