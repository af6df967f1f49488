//! Per-ticker meta records
//!
//! `<root>/<SOURCE>/meta.json` maps each ticker to the summary of its latest
//! run. The read-modify-write cycle is guarded by a `meta.lock` file and the
//! new contents replace the old file atomically.

use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{StorageError, StorageResult};
use crate::collector::Summary;
use crate::Source;

/// Summary of a ticker's latest run (T053)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    /// First instant with data, if any was seen
    pub start: Option<DateTime<Utc>>,
    /// Last requested instant
    pub end: DateTime<Utc>,
    /// Rows collected
    pub count: u64,
    /// Rows with a null field
    pub na: u64,
    /// When the record was written
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl MetaRecord {
    /// Build a record from a run summary, stamped now
    pub fn from_summary(summary: &Summary) -> Self {
        Self {
            start: summary.first_data_instant,
            end: summary.requested_end,
            count: summary.total_rows,
            na: summary.total_na_rows,
            updated_at: Utc::now(),
        }
    }
}

/// Meta file of one source
#[derive(Debug, Clone)]
pub struct MetaStore {
    path: PathBuf,
}

impl MetaStore {
    /// Store for `root/<SOURCE>/meta.json`
    pub fn new<P: AsRef<Path>>(root: P, source: Source) -> Self {
        Self {
            path: root.as_ref().join(source.code()).join("meta.json"),
        }
    }

    /// Path of the meta file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record; an absent file reads as empty
    pub fn load(&self) -> StorageResult<BTreeMap<String, MetaRecord>> {
        let lock_file = self.open_lock()?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| StorageError::LockError(format!("Failed to acquire read lock: {e}")))?;

        self.read_unlocked()
    }

    /// Record of one ticker
    pub fn get(&self, ticker: &str) -> StorageResult<Option<MetaRecord>> {
        Ok(self.load()?.remove(ticker))
    }

    /// Insert or replace one ticker's record
    pub fn upsert(&self, ticker: &str, record: MetaRecord) -> StorageResult<()> {
        let lock_file = self.open_lock()?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| StorageError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut records = self.read_unlocked()?;
        records.insert(ticker.to_string(), record);

        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| StorageError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| StorageError::IoError(format!("Failed to write temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| StorageError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StorageError::IoError(format!("Failed to persist meta file: {e}")))?;

        info!(path = %self.path.display(), ticker = %ticker, "Meta record saved");
        Ok(())
    }

    fn open_lock(&self) -> StorageResult<std::fs::File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::IoError(e.to_string()))?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("lock"))
            .map_err(|e| StorageError::LockError(format!("Failed to create lock file: {e}")))
    }

    fn read_unlocked(&self) -> StorageResult<BTreeMap<String, MetaRecord>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No meta file yet");
            return Ok(BTreeMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| StorageError::IoError(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| StorageError::SerializationError(e.to_string()))
    }
}
