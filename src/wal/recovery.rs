//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;

use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted or torn frames dropped (0 or 1: scanning stops there)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was (or, for `verify`, would be) truncated
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all intact entries in order
    /// 2. Stop at the first torn or corrupted frame
    /// 3. Truncate the file to the intact prefix
    /// 4. Return the intact entries
    ///
    /// Nothing after a bad frame is trusted: its length field may be the
    /// damaged part, so later frame boundaries cannot be located.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, result, valid_len) = Self::scan(path)?;

        if result.was_truncated {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                last_lsn = result.last_lsn,
                "truncating damaged WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (_, result, _) = Self::scan(path)?;
        Ok(result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult, u64)> {
        let file_len = std::fs::metadata(path)?.len();
        let mut reader = WalReader::open(path)?;
        let mut entries = Vec::new();
        let mut entries_corrupted = 0;

        loop {
            match reader.next_entry() {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => break,
                Err(e) if e.is_corruption() => {
                    tracing::debug!(error = %e, "WAL scan stopped");
                    entries_corrupted = 1;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let valid_len = reader.valid_len();
        let result = RecoveryResult {
            entries_recovered: entries.len() as u64,
            entries_corrupted,
            last_lsn: entries.last().map(|e| e.lsn).unwrap_or(0),
            was_truncated: valid_len < file_len,
        };
        Ok((entries, result, valid_len))
    }
}
