//! In-memory engine
//!
//! BTreeMap-based engine with RwLock for concurrency. Nothing survives the
//! process; used for tests and for embedding without a data directory.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::wal::Operation;

use super::{apply_batch, first_after, KvEngine, KvPair};

/// Volatile sorted key-value engine
#[derive(Default)]
pub struct MemoryEngine {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryEngine {
    /// Create a new empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the engine holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn write_batch(&self, batch: Vec<Operation>) -> Result<()> {
        apply_batch(&mut self.data.write(), batch);
        Ok(())
    }

    fn next_after(&self, after: Option<&[u8]>) -> Result<Option<KvPair>> {
        Ok(first_after(&self.data.read(), after))
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
