//! Account Store
//!
//! The public account API. Every mutation runs as one unit on the
//! [`KeyedSerializer`]: read the current record, decide, write back. Plain
//! reads go straight to the engine.
//!
//! ## Operations
//!
//! | Operation         | Serialized on      | Fails with                    |
//! |-------------------|--------------------|-------------------------------|
//! | `find_user`       | –                  | NotFound                      |
//! | `add_user`        | email              | AlreadyExists                 |
//! | `check_password`  | –                  | NotFound, PasswordMismatch    |
//! | `change_email`    | old + new email    | NotFound, AlreadyExists       |
//! | `change_password` | email              | NotFound                      |
//! | `modify_user`     | email              | NotFound                      |
//! | `delete_user`     | email              | NotFound                      |
//! | `user_stream`     | –                  | (per item) Decode             |
//!
//! Reads are read-committed: they see a record either before or after a
//! concurrent write, never in between, because every write replaces the
//! whole value in one engine batch.

use serde_json::Value;

use crate::config::{Config, HashCost};
use crate::credential::Credentials;
use crate::engine::{KvEngine, LogEngine, Scan};
use crate::error::{AccountError, Result};
use crate::record::{self, UserRecord};
use crate::serializer::KeyedSerializer;
use crate::wal::Operation;

/// Embedded user-account store over a sorted key-value engine
pub struct AccountStore<E: KvEngine = LogEngine> {
    engine: E,
    serializer: KeyedSerializer,
    credentials: Credentials,
}

impl AccountStore<LogEngine> {
    /// Open (or create) a durable store under `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let engine = LogEngine::open(&config)?;
        Self::with_engine(engine, config.hash_cost)
    }

    /// Sync and close the underlying engine
    pub fn close(self) -> Result<()> {
        self.engine.close()
    }
}

impl<E: KvEngine> AccountStore<E> {
    /// Wrap an already-open engine
    pub fn with_engine(engine: E, hash_cost: HashCost) -> Result<Self> {
        Ok(Self {
            engine,
            serializer: KeyedSerializer::new(),
            credentials: Credentials::new(hash_cost)?,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up a record by email
    pub fn find_user(&self, email: &str) -> Result<UserRecord> {
        self.load(email)?
            .ok_or_else(|| AccountError::not_found(email))
    }

    /// Verify a password, returning the full record (hash included) on success
    pub fn check_password(&self, email: &str, password: &str) -> Result<UserRecord> {
        let record = self.find_user(email)?;
        let matches = self
            .credentials
            .verify(password, &record.password_hash)
            .map_err(|e| match e {
                AccountError::Decode { reason, .. } => AccountError::decode(email, reason),
                other => other,
            })?;
        if matches {
            Ok(record)
        } else {
            tracing::debug!(email, "password mismatch");
            Err(AccountError::PasswordMismatch)
        }
    }

    /// Lazily iterate every record in key order
    ///
    /// Each call starts a fresh pass. Not isolated from concurrent writers:
    /// records changed mid-iteration may or may not show up.
    pub fn user_stream(&self) -> UserStream<'_, E> {
        UserStream {
            scan: self.engine.scan(),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a new account
    pub fn add_user(&self, email: &str, password: &str, data: Value) -> Result<UserRecord> {
        let password_hash = self.credentials.hash(password)?;

        self.serializer.enqueue(email, || {
            if self.engine.get(email.as_bytes())?.is_some() {
                return Err(AccountError::already_exists(email));
            }

            let record = UserRecord::new(email, password_hash, data);
            self.engine.put(email.as_bytes(), &record::encode(&record)?)?;
            tracing::debug!(email, "account created");
            Ok(record)
        })
    }

    /// Move an account to a new email
    ///
    /// The new key is written and the old one deleted in a single engine
    /// batch while both keys are held, so no reader or unit ever sees both
    /// or neither.
    pub fn change_email(&self, old_email: &str, new_email: &str) -> Result<()> {
        self.serializer.enqueue_rename(old_email, new_email, || {
            let mut record = self.find_user(old_email)?;
            if old_email == new_email || self.engine.get(new_email.as_bytes())?.is_some() {
                return Err(AccountError::already_exists(new_email));
            }

            record.email = new_email.to_string();
            record.touch();
            self.engine.write_batch(vec![
                Operation::Put {
                    key: new_email.as_bytes().to_vec(),
                    value: record::encode(&record)?,
                },
                Operation::Delete {
                    key: old_email.as_bytes().to_vec(),
                },
            ])?;
            tracing::debug!(old_email, new_email, "account renamed");
            Ok(())
        })
    }

    /// Replace the password
    pub fn change_password(&self, email: &str, password: &str) -> Result<()> {
        let password_hash = self.credentials.hash(password)?;

        self.update(email, move |record| {
            record.password_hash = password_hash;
        })?;
        tracing::debug!(email, "password changed");
        Ok(())
    }

    /// Replace the metadata blob wholesale
    pub fn modify_user(&self, email: &str, data: Value) -> Result<()> {
        self.update(email, move |record| {
            record.data = data;
        })?;
        tracing::debug!(email, "account data replaced");
        Ok(())
    }

    /// Remove an account
    pub fn delete_user(&self, email: &str) -> Result<()> {
        self.serializer.enqueue(email, || {
            if self.engine.get(email.as_bytes())?.is_none() {
                return Err(AccountError::not_found(email));
            }
            self.engine.delete(email.as_bytes())?;
            tracing::debug!(email, "account deleted");
            Ok(())
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The per-key serializer all mutations go through
    pub fn serializer(&self) -> &KeyedSerializer {
        &self.serializer
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn load(&self, email: &str) -> Result<Option<UserRecord>> {
        self.engine
            .get(email.as_bytes())?
            .map(|value| record::decode(email.as_bytes(), &value))
            .transpose()
    }

    /// Serialized read-modify-write of an existing record under its own key
    fn update(&self, email: &str, change: impl FnOnce(&mut UserRecord)) -> Result<()> {
        self.serializer.enqueue(email, || {
            let mut record = self.find_user(email)?;
            change(&mut record);
            record.touch();
            self.engine.put(email.as_bytes(), &record::encode(&record)?)
        })
    }
}

/// Lazy, ordered stream of every stored record
pub struct UserStream<'a, E: KvEngine> {
    scan: Scan<'a, E>,
}

impl<E: KvEngine> Iterator for UserStream<'_, E> {
    type Item = Result<UserRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan
            .next()
            .map(|entry| entry.and_then(|(key, value)| record::decode(&key, &value)))
    }
}
