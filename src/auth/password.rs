use argon2::{password_hash::Output, Algorithm, Argon2, Params, Version};
use base64ct::{Base64, Encoding};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, error};

use crate::config::{ConfigError, HashConfig};

pub const SALT_LEN: usize = 32;
pub const KEY_LEN: usize = 32;

lazy_static! {
    // Well-formed but unmatchable; lets unknown-email logins pay the same KDF cost.
    static ref DUMMY_HASH: String = Base64::encode_string(&[0u8; SALT_LEN + KEY_LEN]);
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("malformed password hash")]
    Malformed,
    #[error("argon2 failure: {0}")]
    Kdf(argon2::Error),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Argon2id hasher producing `base64(salt ‖ key)`.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(cfg: HashConfig) -> Result<Self, ConfigError> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, Some(KEY_LEN))
            .map_err(|e| ConfigError::InvalidHashParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn derive(&self, password: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], HashError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(HashError::Kdf)?;
        Ok(key)
    }

    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let mut combined = [0u8; SALT_LEN + KEY_LEN];
        OsRng.fill_bytes(&mut combined[..SALT_LEN]);
        let key = self.derive(password, &combined[..SALT_LEN])?;
        combined[SALT_LEN..].copy_from_slice(&key);
        Ok(Base64::encode_string(&combined))
    }

    /// Never errors: a corrupt stored hash reads as a wrong password.
    pub fn verify(&self, password: &str, encoded: &str) -> bool {
        match self.try_verify(password, encoded) {
            Ok(matched) => matched,
            Err(HashError::Malformed) => {
                debug!("stored password hash is malformed");
                false
            }
            Err(e) => {
                error!(error = %e, "password verification failed");
                false
            }
        }
    }

    fn try_verify(&self, password: &str, encoded: &str) -> Result<bool, HashError> {
        let combined = Base64::decode_vec(encoded).map_err(|_| HashError::Malformed)?;
        if combined.len() != SALT_LEN + KEY_LEN {
            return Err(HashError::Malformed);
        }
        let (salt, stored) = combined.split_at(SALT_LEN);
        let derived = self.derive(password, salt)?;

        // Output's PartialEq is constant-time.
        let stored = Output::new(stored).map_err(|_| HashError::Malformed)?;
        let derived = Output::new(&derived).map_err(|_| HashError::Malformed)?;
        Ok(stored == derived)
    }

    pub async fn hash_async(&self, password: String) -> Result<String, HashError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    pub async fn verify_async(&self, password: String, encoded: String) -> bool {
        let hasher = self.clone();
        match tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded)).await {
            Ok(matched) => matched,
            Err(e) => {
                error!(error = %e, "verify task failed");
                false
            }
        }
    }

    /// Runs a full verification that always fails.
    pub async fn verify_against_dummy(&self, password: String) -> bool {
        self.verify_async(password, DUMMY_HASH.clone()).await
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(HashConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("light params are valid")
}
