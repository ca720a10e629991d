//! Reader for the single-entry keyring format used by older releases.
//!
//! Every credential lived in one `credentials` entry holding a JSON map.
//! This store only serves as a migration source: it can list and reset.

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::credential::{Credential, CredentialData, CredentialRecord, CreateCredentialDetails};
use crate::error::{CredentialsError, Result};
use crate::service::{CredentialsService, ResetOutcome};
use crate::storage::SecretStore;

/// Storage key of the legacy credential map
pub const LEGACY_KEY: &str = "credentials";

/// Read-only view of the legacy keyring entry
pub struct LegacyKeyringCredentials {
    store: Arc<dyn SecretStore>,
}

impl LegacyKeyringCredentials {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Whether a legacy entry is present
    pub fn is_supported(&self) -> bool {
        matches!(self.store.retrieve(LEGACY_KEY), Ok(Some(_)))
    }

    fn load(&self) -> Result<IndexMap<String, serde_json::Value>> {
        let raw = match self.store.retrieve(LEGACY_KEY) {
            Ok(Some(raw)) => Zeroizing::new(raw),
            Ok(None) => return Ok(IndexMap::new()),
            Err(e) => {
                return Err(CredentialsError::Load(format!(
                    "failed to load legacy credentials: {}",
                    e
                )))
            }
        };

        serde_json::from_str(&raw).map_err(|e| {
            debug!("Could not parse legacy credentials: {}", e);
            CredentialsError::corrupted(LEGACY_KEY)
        })
    }
}

/// Decode one legacy entry, either a versioned record or a flat credential
fn decode_entry(key: &str, value: serde_json::Value) -> Result<Credential> {
    let mut credential = if value.get("data").is_some_and(|d| d.is_object()) {
        let record: CredentialRecord =
            serde_json::from_value(value).map_err(|_| CredentialsError::corrupted(key))?;
        record.to_credential()?
    } else {
        let data: CredentialData =
            serde_json::from_value(value).map_err(|_| CredentialsError::corrupted(key))?;
        data.into_credential()
    };

    if credential.name.is_empty() {
        credential.name = key.to_string();
    }
    if credential.guid.is_empty() {
        // Stable across reads so an interrupted migration can be rerun
        credential.guid = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string();
    }
    Ok(credential)
}

fn unsupported(operation: &str) -> CredentialsError {
    CredentialsError::Unsupported(operation.to_string())
}

impl CredentialsService for LegacyKeyringCredentials {
    fn list(&self) -> Result<Vec<Credential>> {
        self.load()?
            .into_iter()
            .map(|(key, value)| decode_entry(&key, value))
            .collect()
    }

    fn get(&self, _guid: &str) -> Result<Credential> {
        Err(unsupported("individual credential get"))
    }

    fn set(&self, _details: CreateCredentialDetails) -> Result<Credential> {
        Err(unsupported("setting credentials"))
    }

    fn force_set(&self, _details: CreateCredentialDetails) -> Result<Credential> {
        Err(unsupported("force setting credentials"))
    }

    fn delete(&self, _guid: &str) -> Result<()> {
        Err(unsupported("individual credential deletion"))
    }

    fn reset(&self) -> Result<ResetOutcome> {
        if self.store.delete(LEGACY_KEY)? {
            info!("Removed legacy keyring credentials");
        }
        Ok(ResetOutcome::without_backup())
    }

    fn default_server(&self) -> Result<Option<Credential>> {
        Err(unsupported("default server"))
    }

    fn set_default_server(&self, _guid: &str) -> Result<()> {
        Err(unsupported("default server"))
    }

    fn clear_default_server(&self) -> Result<()> {
        Err(unsupported("default server"))
    }

    fn backend_name(&self) -> &'static str {
        "legacy-keyring"
    }
}
