//! Engine Module
//!
//! The sorted key-value engine the account store is built on.
//!
//! ## Responsibilities
//! - Point reads and atomic write batches over byte-ordered keys
//! - Ordered, cursor-style iteration over the full key range
//! - Durability of a completed batch (`LogEngine`)
//!
//! ## Concurrency Model
//!
//! - **Writes** (`write_batch`): serialized inside the engine; a batch is
//!   applied under one exclusive lock, so readers see all of it or none
//! - **Reads** (`get` / `next_after`): concurrent, shared lock only
//!
//! The engine knows nothing about accounts. Read-modify-write atomicity
//! across several calls is the job of [`crate::serializer`].

mod durable;
mod memory;

pub use durable::LogEngine;
pub use memory::MemoryEngine;

use crate::error::Result;
use crate::wal::Operation;

/// A key-value pair as stored by the engine
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Durable sorted map from byte string to byte string
pub trait KvEngine: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply every operation in `batch` as one atomic step
    fn write_batch(&self, batch: Vec<Operation>) -> Result<()>;

    /// First entry with a key strictly greater than `after`
    /// (or the first entry overall when `after` is `None`)
    fn next_after(&self, after: Option<&[u8]>) -> Result<Option<KvPair>>;

    /// Flush anything the sync strategy has left buffered
    fn sync(&self) -> Result<()>;

    /// Put a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_batch(vec![Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
    }

    /// Delete a key (deleting a missing key is not an error)
    fn delete(&self, key: &[u8]) -> Result<()> {
        self.write_batch(vec![Operation::Delete { key: key.to_vec() }])
    }

    /// Lazy ordered iteration over the full key range
    fn scan(&self) -> Scan<'_, Self>
    where
        Self: Sized,
    {
        Scan::new(self)
    }
}

/// Cursor over an engine's key range
///
/// Each step re-enters the engine after the last key it returned, so no lock
/// is held between steps. Writes landing mid-scan may or may not be seen
/// (read-committed, not a snapshot).
pub struct Scan<'a, E: KvEngine> {
    engine: &'a E,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl<'a, E: KvEngine> Scan<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self {
            engine,
            last_key: None,
            done: false,
        }
    }
}

impl<E: KvEngine> Iterator for Scan<'_, E> {
    type Item = Result<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.engine.next_after(self.last_key.as_deref()) {
            Ok(Some((key, value))) => {
                self.last_key = Some(key.clone());
                Some(Ok((key, value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Apply a batch to an in-memory sorted map
pub(crate) fn apply_batch(
    map: &mut std::collections::BTreeMap<Vec<u8>, Vec<u8>>,
    batch: Vec<Operation>,
) {
    for operation in batch {
        match operation {
            Operation::Put { key, value } => {
                map.insert(key, value);
            }
            Operation::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

/// Range lookup shared by both engines
pub(crate) fn first_after(
    map: &std::collections::BTreeMap<Vec<u8>, Vec<u8>>,
    after: Option<&[u8]>,
) -> Option<KvPair> {
    use std::ops::Bound;

    let lower = match after {
        Some(key) => Bound::Excluded(key),
        None => Bound::Unbounded,
    };
    map.range::<[u8], _>((lower, Bound::Unbounded))
        .next()
        .map(|(k, v)| (k.clone(), v.clone()))
}
