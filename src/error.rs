//! Error types for accountkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using AccountError
pub type Result<T> = std::result::Result<T, AccountError>;

/// Unified error type for accountkv operations
#[derive(Debug, Error)]
pub enum AccountError {
    // -------------------------------------------------------------------------
    // Account Errors (expected outcomes, reported to the caller)
    // -------------------------------------------------------------------------
    #[error("no account for {email}")]
    NotFound { email: String },

    #[error("an account for {email} already exists")]
    AlreadyExists { email: String },

    #[error("password does not match")]
    PasswordMismatch,

    // -------------------------------------------------------------------------
    // Corruption
    // -------------------------------------------------------------------------
    #[error("stored record {key:?} is corrupt: {reason}")]
    Decode { key: String, reason: String },

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL writer is unusable after a failed append: {0}")]
    WalFailed(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Credential Errors
    // -------------------------------------------------------------------------
    #[error("Credential error: {0}")]
    Credential(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AccountError {
    pub(crate) fn not_found(email: &str) -> Self {
        Self::NotFound {
            email: email.to_string(),
        }
    }

    pub(crate) fn already_exists(email: &str) -> Self {
        Self::AlreadyExists {
            email: email.to_string(),
        }
    }

    pub(crate) fn decode(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Outcomes a caller is expected to handle (missing account, taken
    /// email, wrong password), as opposed to defects in storage or setup.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::AlreadyExists { .. } | Self::PasswordMismatch
        )
    }

    /// True when the stored bytes themselves are damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::WalCorruption(_))
    }
}
