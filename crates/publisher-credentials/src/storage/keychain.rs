//! OS Keychain storage backend
//!
//! Uses the system keychain for secure storage:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use keyring::Entry;
use tracing::debug;

use super::SecretStore;
use crate::error::{CredentialsError, Result};

/// Service name used for keychain entries
pub const SERVICE_NAME: &str = "Posit Publisher Safe Storage";

const AVAILABILITY_PROBE_KEY: &str = "__availability_probe__";

/// OS Keychain storage backend
pub struct KeychainStorage {
    service: String,
}

impl KeychainStorage {
    /// Keychain entries under the standard service name
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Keychain entries under a custom service name
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Test if the keychain is usable by writing and removing a probe entry
    pub fn is_available(&self) -> bool {
        let entry = match Entry::new(&self.service, AVAILABILITY_PROBE_KEY) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("System keyring service is not available: {}", e);
                return false;
            }
        };

        match entry.set_password("probe") {
            Ok(()) => {
                let _ = entry.delete_password();
                true
            }
            Err(e) => {
                debug!("System keyring service is not available: {}", e);
                false
            }
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Get a keyring entry for a key
    fn get_entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).map_err(keyring_error)
    }
}

impl Default for KeychainStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeychainStorage {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.get_entry(key)?
            .set_password(value)
            .map_err(keyring_error)?;

        debug!("Stored key in keychain: {}", key);
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>> {
        match self.get_entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => {
                debug!("Key not found in keychain: {}", key);
                Ok(None)
            }
            Err(e) => Err(keyring_error(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match self.get_entry(key)?.delete_password() {
            Ok(()) => {
                debug!("Deleted key from keychain: {}", key);
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(keyring_error(e)),
        }
    }

    fn supports_listing(&self) -> bool {
        // The keyring crate addresses entries by (service, user) only
        false
    }

    fn list_keys(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(CredentialsError::Keyring(
            "Listing keys is not supported by keychain storage".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "macos")]
        return "macOS Keychain";

        #[cfg(target_os = "windows")]
        return "Windows Credential Manager";

        #[cfg(target_os = "linux")]
        return "Linux Secret Service";

        #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
        return "System Keychain";
    }
}

fn keyring_error(e: keyring::Error) -> CredentialsError {
    CredentialsError::Keyring(e.to_string())
}
