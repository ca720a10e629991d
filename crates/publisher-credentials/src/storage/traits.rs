//! Storage trait definitions

use crate::error::Result;

/// Key-value secret storage used by the keyring backends.
///
/// Implementations report their own failures as `CredentialsError::Keyring`.
pub trait SecretStore: Send + Sync {
    /// Store a value under the given key, replacing any previous value
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a value by key
    fn retrieve(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value by key, returning whether it existed
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a key exists
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.retrieve(key)?.is_some())
    }

    /// Whether `list_keys` can enumerate stored entries
    fn supports_listing(&self) -> bool;

    /// List all keys with a given prefix
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get a human-readable name for this storage backend
    fn backend_name(&self) -> &'static str;
}
