//! Configuration for accountkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for an account store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── accounts.wal     (write-ahead log, the only durable state)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Minimum number of recovered frames before the log is compacted on open
    pub compaction_min_entries: usize,

    // -------------------------------------------------------------------------
    // Credential Configuration
    // -------------------------------------------------------------------------
    /// Argon2id cost, fixed for the lifetime of a store
    pub hash_cost: HashCost,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory size in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl HashCost {
    /// Minimal cost accepted by Argon2. Only for tests and benches.
    pub const fn testing() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for HashCost {
    /// OWASP-recommended Argon2id baseline (19 MiB, 2 passes, 1 lane)
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./accountkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            compaction_min_entries: 1024,
            hash_cost: HashCost::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set how many recovered frames trigger compaction on open
    pub fn compaction_min_entries(mut self, count: usize) -> Self {
        self.config.compaction_min_entries = count;
        self
    }

    /// Set the password hashing cost
    pub fn hash_cost(mut self, cost: HashCost) -> Self {
        self.config.hash_cost = cost;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
