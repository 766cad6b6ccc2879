//! Durable engine
//!
//! A sorted in-memory map whose every change is first appended to the WAL.
//! The log is the only on-disk state: opening the engine replays it.
//!
//! ## Write Path
//! 1. Acquire WAL lock (serializes writers)
//! 2. Append the whole batch as one frame (durable per sync strategy)
//! 3. Apply the batch to the map under its write lock
//!
//! Lock order is always WAL → map, in `write_batch` and `compact` alike.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::config::{Config, WalSyncStrategy};
use crate::error::{AccountError, Result};
use crate::wal::{Operation, WalRecovery, WalWriter, MAX_PAYLOAD_SIZE};

use super::{apply_batch, first_after, KvEngine, KvPair};

/// Payload budget for one frame when rewriting the log
///
/// Leaves headroom under `MAX_PAYLOAD_SIZE` for the batch length prefix and
/// timestamp that bincode adds around the operations.
const COMPACTION_FRAME_BYTES: u64 = MAX_PAYLOAD_SIZE as u64 - 64;

/// WAL-backed sorted key-value engine
pub struct LogEngine {
    /// Path of the live log file
    wal_path: PathBuf,

    sync_strategy: WalSyncStrategy,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Current contents, rebuilt from the log on open
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl LogEngine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "accounts.wal";
    const COMPACT_FILENAME: &'static str = "accounts.wal.compact";

    /// Open or create an engine under `config.data_dir`
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Discard any half-written compaction output
    /// 3. Recover the WAL (truncating a torn tail) and replay it
    /// 4. Compact if the log is mostly dead frames
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);
        remove_if_exists(&config.data_dir.join(Self::COMPACT_FILENAME))?;

        let mut data = BTreeMap::new();
        let mut frames = 0usize;
        let mut last_lsn = 0;

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            tracing::info!(
                recovered = recovery.entries_recovered,
                corrupted = recovery.entries_corrupted,
                last_lsn = recovery.last_lsn,
                "WAL recovery finished"
            );

            frames = entries.len();
            last_lsn = recovery.last_lsn;
            for entry in entries {
                apply_batch(&mut data, entry.operations);
            }
        }

        let wal = WalWriter::open(&wal_path, config.wal_sync_strategy, last_lsn)?;
        let live_keys = data.len();

        let engine = Self {
            wal_path,
            sync_strategy: config.wal_sync_strategy,
            wal: Mutex::new(wal),
            data: RwLock::new(data),
        };

        if frames >= config.compaction_min_entries && frames > live_keys.saturating_mul(2) {
            // The uncompacted log is still complete, so this is not fatal
            if let Err(e) = engine.compact() {
                tracing::warn!(error = %e, frames, "compaction on open failed");
            }
        }

        tracing::info!(path = %engine.wal_path.display(), keys = live_keys, "engine opened");
        Ok(engine)
    }

    /// Rewrite the log so it holds only the live contents
    ///
    /// The new log is written beside the old one and renamed into place, so a
    /// crash at any point leaves one complete log behind.
    pub fn compact(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        let data = self.data.read();

        let tmp_path = self.wal_path.with_file_name(Self::COMPACT_FILENAME);
        remove_if_exists(&tmp_path)?;

        let last_lsn = {
            let mut writer =
                WalWriter::open(&tmp_path, WalSyncStrategy::EveryWrite, wal.current_lsn())?;
            let mut frame = Vec::new();
            let mut frame_bytes = 0u64;

            for (key, value) in data.iter() {
                let operation = Operation::Put {
                    key: key.clone(),
                    value: value.clone(),
                };
                let size = encoded_size(&operation)?;
                if !frame.is_empty() && frame_bytes + size > COMPACTION_FRAME_BYTES {
                    writer.append_batch(&frame)?;
                    frame.clear();
                    frame_bytes = 0;
                }
                frame.push(operation);
                frame_bytes += size;
            }
            if !frame.is_empty() {
                writer.append_batch(&frame)?;
            }
            writer.sync()?;
            writer.current_lsn()
        };

        // The handle follows the file through the rename
        let live = WalWriter::open(&tmp_path, self.sync_strategy, last_lsn)?;
        fs::rename(&tmp_path, &self.wal_path)?;
        *wal = live;
        sync_dir(&self.wal_path)?;

        tracing::info!(keys = data.len(), last_lsn, "WAL compacted");
        Ok(())
    }

    /// Close the engine gracefully, syncing the WAL
    pub fn close(self) -> Result<()> {
        self.wal.lock().sync()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the engine holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Path of the live WAL file
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// LSN of the last logged batch
    pub fn last_lsn(&self) -> u64 {
        self.wal.lock().current_lsn()
    }
}

impl KvEngine for LogEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write_batch(&self, batch: Vec<Operation>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut wal = self.wal.lock();
        wal.append_batch(&batch)?;
        apply_batch(&mut self.data.write(), batch);
        Ok(())
    }

    fn next_after(&self, after: Option<&[u8]>) -> Result<Option<KvPair>> {
        Ok(first_after(&self.data.read(), after))
    }

    fn sync(&self) -> Result<()> {
        self.wal.lock().sync()
    }
}

fn encoded_size(operation: &Operation) -> Result<u64> {
    bincode::serialized_size(operation).map_err(|e| AccountError::Serialization(e.to_string()))
}

/// Make a rename inside the log's directory durable
#[cfg(unix)]
fn sync_dir(file_path: &Path) -> Result<()> {
    if let Some(dir) = file_path.parent() {
        fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_file_path: &Path) -> Result<()> {
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
