//! In-memory secret storage for tests and embedders without an OS keyring.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::SecretStore;
use crate::error::{CredentialsError, Result};

/// Secret storage kept in a process-local map.
pub struct MemorySecretStore {
    entries: Mutex<BTreeMap<String, String>>,
    listing: bool,
    fail_writes_for: Mutex<Option<String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            listing: true,
            fail_writes_for: Mutex::new(None),
        }
    }

    /// Behave like an OS keychain that cannot enumerate its entries
    pub fn without_listing() -> Self {
        Self {
            listing: false,
            ..Self::new()
        }
    }

    /// Make writes to keys starting with `prefix` fail, to simulate a broken keyring
    pub fn fail_writes_for(&self, prefix: Option<&str>) {
        *lock(&self.fail_writes_for) = prefix.map(str::to_string);
    }

    /// Raw value of an entry, bypassing any backend
    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        match lock(&self.fail_writes_for).as_deref() {
            Some(prefix) if key.starts_with(prefix) => Err(CredentialsError::Keyring(format!(
                "write to {} rejected",
                key
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SecretStore for MemorySecretStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.check_writable(key)?;
        Ok(lock(&self.entries).remove(key).is_some())
    }

    fn supports_listing(&self) -> bool {
        self.listing
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.listing {
            return Err(CredentialsError::Keyring(
                "Listing keys is not supported by this store".to_string(),
            ));
        }

        Ok(lock(&self.entries)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "In-Memory Secret Store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve() {
        let store = MemorySecretStore::new();

        store.store("test-key", "test-value").unwrap();
        assert_eq!(store.retrieve("test-key").unwrap(), Some("test-value".to_string()));
        assert!(store.exists("test-key").unwrap());
        assert_eq!(store.retrieve("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_delete() {
        let store = MemorySecretStore::new();

        store.store("test-key", "test-value").unwrap();
        assert!(store.delete("test-key").unwrap());
        assert!(!store.delete("test-key").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_keys() {
        let store = MemorySecretStore::new();

        store.store("credential:one", "1").unwrap();
        store.store("credential:two", "2").unwrap();
        store.store("other:foo", "bar").unwrap();

        let keys = store.list_keys("credential:").unwrap();
        assert_eq!(keys, vec!["credential:one".to_string(), "credential:two".to_string()]);

        let unlisted = MemorySecretStore::without_listing();
        assert!(!unlisted.supports_listing());
        assert!(unlisted.list_keys("").is_err());
    }

    #[test]
    fn test_failing_writes() {
        let store = MemorySecretStore::new();
        store.fail_writes_for(Some("credential-guids"));

        assert!(store.store("credential-guids", "{}").is_err());
        assert!(store.store("credential:one", "1").is_ok());

        store.fail_writes_for(None);
        assert!(store.store("credential-guids", "{}").is_ok());
    }
}
