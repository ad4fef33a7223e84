// ── Secure key-value storage ──
//
// The session token and API key never live in plain manager state;
// they go through a `SecretStore`. `callbell-config` provides the
// keyring-backed implementation, `MemorySecretStore` serves tests and
// hosts without a platform keychain.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use secrecy::SecretString;
use thiserror::Error;

pub const SESSION_TOKEN_KEY: &str = "session-token";
pub const API_KEY_KEY: &str = "api-key";

#[derive(Debug, Error)]
#[error("secret store error: {0}")]
pub struct SecretError(pub String);

/// Get / set / remove secrets by key.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<SecretString>;
    fn set(&self, key: &str, value: SecretString) -> Result<(), SecretError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), SecretError>;
}

/// Process-local secret store.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, SecretString>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Option<SecretString> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: SecretString) -> Result<(), SecretError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SecretError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
