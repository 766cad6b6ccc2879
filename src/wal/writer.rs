//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! A frame is either fully appended or not there at all. If a write or an
//! fsync fails, the writer cuts the file back to the end of the last good
//! frame. If even that fails, the writer is marked failed and refuses every
//! later append, since anything appended after a torn frame would be
//! dropped by recovery.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::config::WalSyncStrategy;
use crate::error::{AccountError, Result};

use super::entry::{encode_frame, now_millis};
use super::Operation;

/// Writes entries to the WAL file
pub struct WalWriter {
    file: File,
    /// LSN of the last appended entry (0 = nothing written yet)
    current_lsn: u64,
    /// File length up to the end of the last appended frame
    valid_len: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last fsync
    unsynced: usize,
    /// Set when a failed append could not be rolled back
    failed: Option<String>,
}

impl WalWriter {
    /// Open or create a WAL file, appending after `last_lsn`
    ///
    /// `last_lsn` is the highest LSN already present in the file, as reported
    /// by recovery; use 0 for a fresh log. The file is expected to hold only
    /// intact frames.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let valid_len = file.metadata()?.len();

        Ok(Self {
            file,
            current_lsn: last_lsn,
            valid_len,
            sync_strategy,
            unsynced: 0,
            failed: None,
        })
    }

    /// Append a single operation
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        self.append_batch(std::slice::from_ref(&operation))
    }

    /// Append an atomic batch as one frame, returning its LSN
    ///
    /// On error the frame is not in the log and the LSN is not consumed.
    pub fn append_batch(&mut self, operations: &[Operation]) -> Result<u64> {
        if let Some(reason) = &self.failed {
            return Err(AccountError::WalFailed(reason.clone()));
        }

        let lsn = self.current_lsn + 1;
        let frame = encode_frame(lsn, operations, now_millis())?;

        if let Err(e) = self.write_frame(&frame) {
            self.roll_back(&e);
            return Err(e);
        }

        self.current_lsn = lsn;
        self.valid_len += frame.len() as u64;
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Cut the file back to the end of the last appended frame
    ///
    /// Drops whatever a failed append (or anything else) left past it.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(self.valid_len)?;
        self.file.sync_all()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the current LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Whether an earlier failure left the writer unusable
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.file.write_all(frame)?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    fn roll_back(&mut self, cause: &AccountError) {
        match self.truncate() {
            Ok(()) => {
                tracing::warn!(error = %cause, valid_len = self.valid_len, "WAL append rolled back");
            }
            Err(e) => {
                tracing::error!(error = %cause, rollback_error = %e, "WAL append could not be rolled back");
                self.failed = Some(format!("{} (rollback failed: {})", cause, e));
            }
        }
    }
}
