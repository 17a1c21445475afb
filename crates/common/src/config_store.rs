//! Persistent key-value store abstraction.
//!
//! The dispatcher uses a store to remember provider ordering state across
//! process restarts. The store is optional and never required for
//! correctness: read and write failures are logged and ignored by callers.
//!
//! # Store Keys
//!
//! - `mediation-round-robin-cursor` - decimal round-robin cursor
//! - `mediation-last-order` - JSON array of the last computed provider order

use error_stack::Report;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::MediationError;

/// Platform-agnostic configuration store trait.
///
/// Implementations wrap whatever the host application persists with
/// (shared preferences, keychain, a local database).
pub trait ConfigStore: Send + Sync {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(Some(value))` if the key exists,
    /// `Ok(None)` if the key doesn't exist,
    /// or `Err` if there was an error accessing the store.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Collaborator`] when the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Report<MediationError>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`MediationError::Collaborator`] when the store cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<(), Report<MediationError>>;
}

/// Process-local store, used by the CLI and in tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, Report<MediationError>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), Report<MediationError>> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Compute the SHA-256 hash of configuration bytes.
///
/// Returns the hash in the format `sha256:<hex>`.
pub fn compute_settings_hash(content: &str) -> String {
    // Normalize line endings for consistent hashing across platforms
    let normalized = content.replace("\r\n", "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{}", hex::encode(hash))
}
