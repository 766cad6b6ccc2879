//! # accountkv
//!
//! An embedded user-account store with:
//! - Account lifecycle operations (add, find, verify, rename, change
//!   password, modify, delete, stream)
//! - Per-key FIFO serialization of every read-modify-write, including
//!   renames that hold both the old and the new key
//! - Argon2id password hashing
//! - A write-ahead-logged sorted key-value engine with crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     AccountStore                             │
//! │        (find / add / check / rename / passwd / ...)          │
//! └──────────┬───────────────────────────────┬──────────────────┘
//!            │ mutations                     │ reads
//! ┌──────────▼──────────┐                    │
//! │  KeyedSerializer    │                    │
//! │ (per-key FIFO, 1..2 │                    │
//! │   keys per unit)    │                    │
//! └──────────┬──────────┘                    │
//!            │                               │
//!   ┌────────▼────────┐   ┌─────────────┐    │
//!   │  Record Codec   │   │ Credentials │    │
//!   │     (JSON)      │   │  (Argon2id) │    │
//!   └────────┬────────┘   └─────────────┘    │
//!            │                               │
//! ┌──────────▼───────────────────────────────▼──────────────────┐
//! │                    KvEngine (LogEngine)                      │
//! │          BTreeMap (RwLock)  ◄──  WAL (one frame/batch)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use accountkv::{AccountStore, Config};
//! use serde_json::json;
//!
//! let store = AccountStore::open(Config::builder().data_dir("./accounts").build())?;
//! store.add_user("ada@example.com", "correct horse", json!({"name": "Ada"}))?;
//! store.change_email("ada@example.com", "ada@lovelace.org")?;
//! let record = store.check_password("ada@lovelace.org", "correct horse")?;
//! assert_eq!(record.data["name"], "Ada");
//! store.close()?;
//! # Ok::<(), accountkv::AccountError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod engine;
pub mod record;
pub mod credential;
pub mod serializer;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AccountError, Result};
pub use config::{Config, HashCost, WalSyncStrategy};
pub use engine::{KvEngine, LogEngine, MemoryEngine};
pub use record::UserRecord;
pub use serializer::KeyedSerializer;
pub use store::{AccountStore, UserStream};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of accountkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
