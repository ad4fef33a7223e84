// System-keyring backed `SecretStore`.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use callbell_core::{SecretError, SecretStore};

pub const KEYRING_SERVICE: &str = "callbell";

/// Stores each secret as a keyring entry under service `callbell`,
/// with the secret key as the entry's user name.
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, SecretError> {
        keyring::Entry::new(&self.service, key).map_err(|e| SecretError(e.to_string()))
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> Option<SecretString> {
        let entry = self.entry(key).ok()?;
        match entry.get_password() {
            Ok(secret) => Some(SecretString::from(secret)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(key, error = %e, "keyring lookup failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: SecretString) -> Result<(), SecretError> {
        self.entry(key)?
            .set_password(value.expose_secret())
            .map_err(|e| SecretError(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), SecretError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SecretError(e.to_string())),
        }
    }
}
