//! Argon2id password hashing.

use argon2::{Config, Variant, Version};
use rand::{RngCore, rngs::OsRng};

use crate::domain::{PasswordHashError, PasswordHasher};

const SALT_LEN: usize = 16;

/// Stores PHC-encoded Argon2id hashes with a fresh random salt per password
pub struct Argon2PasswordHasher {
    mem_cost: u32,
    time_cost: u32,
}

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self {
            mem_cost: 19_456,
            time_cost: 2,
        }
    }

    /// Cheap parameters for tests
    pub fn fast() -> Self {
        Self {
            mem_cost: 256,
            time_cost: 1,
        }
    }

    fn config(&self) -> Config {
        Config {
            variant: Variant::Argon2id,
            version: Version::Version13,
            mem_cost: self.mem_cost,
            time_cost: self.time_cost,
            lanes: 1,
            ..Default::default()
        }
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        argon2::hash_encoded(password.as_bytes(), &salt, &self.config())
            .map_err(|e| PasswordHashError(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match argon2::verify_encoded(hash, password.as_bytes()) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("Stored password hash could not be verified: {}", e);
                false
            }
        }
    }
}
