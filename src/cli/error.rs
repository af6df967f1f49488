//! CLI error types and conversions

use crate::collector::CollectError;
use crate::source::SourceError;
use crate::storage::StorageError;
use crate::universe::UniverseError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Collection error
    #[error("collection error: {0}")]
    CollectError(#[from] CollectError),

    /// Source error
    #[error("source error: {0}")]
    SourceError(#[from] SourceError),

    /// Storage error
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    /// Universe error
    #[error("universe error: {0}")]
    UniverseError(#[from] UniverseError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output serialization error
    #[error("output error: {0}")]
    OutputError(String),
}
