//! Password hashing
//!
//! Argon2id with a random per-password salt. Hashes are PHC strings, so the
//! parameters and salt travel with the hash and `verify` needs nothing else.

use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::HashCost;
use crate::error::{AccountError, Result};

/// Hashes and verifies passwords with a fixed cost
#[derive(Clone)]
pub struct Credentials {
    argon2: Argon2<'static>,
}

impl Credentials {
    /// Build a hasher; rejects costs Argon2 cannot run with
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AccountError::Config(format!("invalid hash cost {:?}: {}", cost, e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a plaintext password with a fresh salt
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AccountError::Credential(e.to_string()))
    }

    /// Check a plaintext password against a stored hash
    ///
    /// Returns `Ok(false)` on mismatch. A hash that does not parse means the
    /// stored record is damaged and is reported as `Decode`.
    pub fn verify(&self, plaintext: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AccountError::decode("<password hash>", e))?;

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(e) => Err(AccountError::Credential(e.to_string())),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("algorithm", &"argon2id")
            .finish()
    }
}
