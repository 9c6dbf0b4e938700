use std::sync::{Mutex, PoisonError};

use keyring::Entry;
use tracing::{debug, warn};

use crate::models::Credential;

use super::SessionError;

/// Default keychain service name
pub const DEFAULT_SERVICE_NAME: &str = "tokenward";

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Key-value home of the current credential pair.
///
/// `get` never fails: an unreadable or half-written backend is the same as
/// no session. Writes report backend failures.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credential>;

    fn set(&self, credential: &Credential) -> Result<(), SessionError>;

    /// Remove both tokens. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Process-scoped store. Lives as long as the session manager that owns it.
#[derive(Default)]
pub struct MemoryStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<Credential> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, credential: &Credential) -> Result<(), SessionError> {
        *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Tokens kept in the OS keychain, one entry per token.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, SessionError> {
        Entry::new(&self.service, key)
            .map_err(|e| SessionError::Storage(format!("Failed to create keyring entry: {}", e)))
    }

    fn read(&self, key: &str) -> Option<String> {
        let entry = match self.entry(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Keyring unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read token from keychain");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| SessionError::Storage(format!("Failed to store {} in keychain: {}", key, e)))
    }

    fn delete(&self, key: &str) -> Result<(), SessionError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to delete {} from keychain: {}",
                key, e
            ))),
        }
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self) -> Option<Credential> {
        Credential::from_parts(self.read(ACCESS_TOKEN_KEY), self.read(REFRESH_TOKEN_KEY))
    }

    fn set(&self, credential: &Credential) -> Result<(), SessionError> {
        self.write(ACCESS_TOKEN_KEY, &credential.access_token)?;
        self.write(REFRESH_TOKEN_KEY, &credential.refresh_token)?;
        // A backend that accepts writes but cannot read them back is no store
        if self.get().as_ref() != Some(credential) {
            return Err(SessionError::Storage(format!(
                "Keychain service {} did not retain the credential",
                self.service
            )));
        }
        debug!(service = %self.service, "Credential stored in keychain");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        // Attempt both deletes even if the first fails
        let access = self.delete(ACCESS_TOKEN_KEY);
        let refresh = self.delete(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }
}
