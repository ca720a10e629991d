//! The credential store contract shared by every backend

use std::path::PathBuf;

use crate::credential::{Credential, CreateCredentialDetails};
use crate::error::{CredentialsError, Result};

/// Operations callers (HTTP handlers, account discovery) rely on.
///
/// Every call re-reads the backing store; nothing is cached between calls.
pub trait CredentialsService: Send + Sync {
    /// All stored credentials, in no particular order
    fn list(&self) -> Result<Vec<Credential>>;

    /// The credential with the given guid
    fn get(&self, guid: &str) -> Result<Credential>;

    /// Validate, check for collisions, assign a guid, and store a new credential
    fn set(&self, details: CreateCredentialDetails) -> Result<Credential>;

    /// Store a credential without collision checks, replacing the one with the
    /// same name and keeping its guid
    fn force_set(&self, details: CreateCredentialDetails) -> Result<Credential>;

    /// Remove the credential with the given guid
    fn delete(&self, guid: &str) -> Result<()>;

    /// Remove every stored credential, even when the stored data is unreadable
    fn reset(&self) -> Result<ResetOutcome>;

    /// The preferred credential, if one is set and still exists
    fn default_server(&self) -> Result<Option<Credential>>;

    /// Mark an existing credential as preferred
    fn set_default_server(&self, guid: &str) -> Result<()>;

    fn clear_default_server(&self) -> Result<()>;

    /// Get a human-readable name for this backend
    fn backend_name(&self) -> &'static str;
}

/// Result of a reset: where the previous data was copied, if anywhere.
///
/// A failed backup does not fail the reset; it is reported here instead.
#[derive(Debug, Default)]
pub struct ResetOutcome {
    pub backup_file: Option<PathBuf>,
    pub backup_error: Option<CredentialsError>,
}

impl ResetOutcome {
    pub fn without_backup() -> Self {
        Self::default()
    }

    /// Backup path as reported to API clients; empty when there is none
    pub fn backup_file_display(&self) -> String {
        self.backup_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}
