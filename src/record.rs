//! User records and their stored form
//!
//! The engine key is the email; the engine value is a JSON object:
//!
//! ```text
//! {"password":"$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>",
//!  "data":<caller JSON, untouched>,
//!  "createdDate":"2026-10-16T09:30:12.123456789Z",
//!  "modifiedDate":"2026-10-16T09:30:12.123456789Z"}
//! ```
//!
//! Timestamps are always UTC with exactly nine fractional digits, so they
//! parse back to the same instant and sort as plain strings.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AccountError, Result};

/// Fixed on-disk timestamp format
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// One user account
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub email: String,
    /// Argon2id PHC string, never the plaintext
    #[serde(rename = "password")]
    pub password_hash: String,
    pub data: Value,
    #[serde(with = "timestamp")]
    pub created_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub modified_date: DateTime<Utc>,
}

impl UserRecord {
    /// A fresh record; both timestamps are the same instant
    pub fn new(email: impl Into<String>, password_hash: String, data: Value) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            password_hash,
            data,
            created_date: now,
            modified_date: now,
        }
    }

    /// Advance `modified_date`, strictly past its previous value even if
    /// the clock has not moved (or moved backwards)
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.modified_date = if now > self.modified_date {
            now
        } else {
            self.modified_date + Duration::nanoseconds(1)
        };
    }
}

/// Stored value layout; the email lives in the key
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    password: String,
    data: Value,
    #[serde(with = "timestamp")]
    created_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    modified_date: DateTime<Utc>,
}

/// Encode a record into engine value bytes
pub fn encode(record: &UserRecord) -> Result<Vec<u8>> {
    let stored = StoredRecord {
        password: record.password_hash.clone(),
        data: record.data.clone(),
        created_date: record.created_date,
        modified_date: record.modified_date,
    };
    serde_json::to_vec(&stored).map_err(|e| AccountError::Serialization(e.to_string()))
}

/// Decode engine key and value bytes into a record
///
/// Anything unparseable is corruption (`Decode`), never "absent".
pub fn decode(key: &[u8], value: &[u8]) -> Result<UserRecord> {
    let email = std::str::from_utf8(key).map_err(|e| {
        AccountError::decode(String::from_utf8_lossy(key), format!("key is not UTF-8: {}", e))
    })?;

    let stored: StoredRecord =
        serde_json::from_slice(value).map_err(|e| AccountError::decode(email, e))?;

    if stored.modified_date < stored.created_date {
        return Err(AccountError::decode(
            email,
            "modifiedDate is earlier than createdDate",
        ));
    }

    Ok(UserRecord {
        email: email.to_string(),
        password_hash: stored.password,
        data: stored.data,
        created_date: stored.created_date,
        modified_date: stored.modified_date,
    })
}

/// Render a timestamp in the fixed on-disk format
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`]
pub fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(instant))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_timestamp(&text)
            .map_err(|e| de::Error::custom(format!("bad timestamp {:?}: {}", text, e)))
    }
}
