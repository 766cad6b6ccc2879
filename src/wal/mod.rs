//! Write-Ahead Log (WAL) Module
//!
//! The engine's only durable state. Each frame holds one atomic batch of
//! puts and deletes; a batch is either wholly in the log or wholly absent.
//!
//! ## Frame Layout
//! ```text
//!   0        8        12       16                16+len
//!   ├────────┼────────┼────────┼──────────────────┤
//!   │ lsn    │ crc32  │ len    │ payload          │
//!   │ u64 LE │ u32 LE │ u32 LE │ bincode          │
//!   └────────┴────────┴────────┴──────────────────┘
//! ```
//!
//! `payload` is `(Vec<Operation>, timestamp_ms)`; the CRC covers the LSN
//! bytes and the payload. LSNs start at 1 and increase by one per frame.
//!
//! Recovery keeps the longest prefix of intact frames and truncates the
//! rest (see [`WalRecovery`]).

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use writer::WalWriter;
pub use reader::WalReader;
pub use recovery::{WalRecovery, RecoveryResult};
