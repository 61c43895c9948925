//! Durable ledger for history entries
//!
//! The registry hands every staged history entry to a [`HistoryLedger`]
//! before committing it. If the ledger fails, the transition is dropped and
//! the in-memory state never changes.
//!
//! A ledger record carries the directory change along with the history
//! entry, so the ledger alone is enough to rebuild the whole registry. The
//! append is the single commit point.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use credo_core::{ContentRef, HistoryEntry};

use crate::error::PersistError;

/// One committed state transition as stored by a ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// The accumulator history entry
    pub entry: HistoryEntry,

    /// Content reference of an added identity (`None` for revocations)
    pub content_ref: Option<ContentRef>,

    /// Unix timestamp of the transition
    pub recorded_at: u64,
}

/// Append-only sink for ledger records
pub trait HistoryLedger: Send + Sync {
    /// Durably record one transition
    ///
    /// On error nothing of the record may remain visible to a later load.
    fn persist(&self, record: &LedgerRecord) -> Result<(), PersistError>;
}

impl<L: HistoryLedger + ?Sized> HistoryLedger for Arc<L> {
    fn persist(&self, record: &LedgerRecord) -> Result<(), PersistError> {
        (**self).persist(record)
    }
}

/// In-memory ledger, for tests and ephemeral registries
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<LedgerRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all persisted records
    pub fn records(&self) -> Vec<LedgerRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// History entries of all persisted records
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.records().into_iter().map(|record| record.entry).collect()
    }
}

impl HistoryLedger for MemoryLedger {
    fn persist(&self, record: &LedgerRecord) -> Result<(), PersistError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PersistError::Rejected("memory ledger poisoned".to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}

/// Storage a ledger line is appended to
trait AppendTarget {
    fn len(&self) -> io::Result<u64>;
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_data()
    }
}

/// Append and sync `bytes`, cutting the target back to its previous length
/// if either step fails
fn append_durably<T: AppendTarget>(target: &mut T, bytes: &[u8]) -> io::Result<()> {
    let prev_len = target.len()?;
    let result = target.append(bytes).and_then(|_| target.sync());
    if let Err(e) = result {
        if let Err(undo) = target.truncate(prev_len) {
            tracing::warn!("Failed to truncate ledger after write error: {}", undo);
        }
        return Err(e);
    }
    Ok(())
}

/// Byte length of the complete lines in `content`
fn complete_len(content: &[u8]) -> usize {
    content
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0)
}

/// File-backed ledger storing one JSON record per line
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLedger {
    /// Open (or create) the ledger file for appending
    ///
    /// A torn trailing line left by an interrupted append is cut off.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let content = std::fs::read(&path)?;
        let complete = complete_len(&content);
        if complete != content.len() {
            tracing::warn!(
                "Discarding {} bytes of torn ledger tail in {:?}",
                content.len() - complete,
                path
            );
            file.set_len(complete as u64)?;
            file.sync_data()?;
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in file order
    pub fn load(&self) -> Result<Vec<LedgerRecord>, PersistError> {
        Self::read_records(&self.path)
    }

    /// Read records from a ledger file; a missing file is an empty ledger
    ///
    /// A trailing fragment without a newline was never acknowledged and is
    /// ignored. Any complete line that fails to parse is an error.
    pub fn read_records(path: &Path) -> Result<Vec<LedgerRecord>, PersistError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read(path)?;
        let complete = &content[..complete_len(&content)];

        let mut records = Vec::new();
        for line in complete.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            records.push(serde_json::from_slice(line)?);
        }
        Ok(records)
    }
}

impl HistoryLedger for FileLedger {
    fn persist(&self, record: &LedgerRecord) -> Result<(), PersistError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| PersistError::Rejected("file ledger poisoned".to_string()))?;
        append_durably(&mut *file, &line)?;
        Ok(())
    }
}
