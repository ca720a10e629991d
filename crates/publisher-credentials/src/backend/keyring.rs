//! Keyring storage backend
//!
//! Each credential is its own secret-store entry, keyed `credential:<guid>`,
//! holding a versioned JSON record. Secret stores that cannot enumerate their
//! entries (the OS keychains) get an extra `credential-guids` entry mapping
//! every guid to its name.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::credential::{
    audit_override, check_for_conflicts, Credential, CredentialRecord, CreateCredentialDetails,
};
use crate::error::{CredentialsError, Result};
use crate::service::{CredentialsService, ResetOutcome};
use crate::storage::SecretStore;

/// Storage key prefix for credentials
const CREDENTIAL_PREFIX: &str = "credential:";

/// Storage key of the guid index
const INDEX_KEY: &str = "credential-guids";

/// Storage key of the default server pointer
const DEFAULT_SERVER_KEY: &str = "default-server";

/// guid -> name
type CredentialIndex = BTreeMap<String, String>;

fn entry_key(guid: &str) -> String {
    format!("{}{}", CREDENTIAL_PREFIX, guid)
}

/// Keyring-backed credential store
pub struct KeyringCredentialsService {
    store: Arc<dyn SecretStore>,
    lock: Mutex<()>,
}

impl KeyringCredentialsService {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        debug!("Keyring credentials backed by {}", store.backend_name());
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read an entry; secret store failures on reads mean the store cannot be loaded
    fn read(&self, key: &str) -> Result<Option<Zeroizing<String>>> {
        self.store
            .retrieve(key)
            .map(|value| value.map(Zeroizing::new))
            .map_err(as_load_error)
    }

    fn load_index(&self) -> Result<CredentialIndex> {
        match self.read(INDEX_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                debug!("Could not parse credential index: {}", e);
                CredentialsError::corrupted("credential index")
            }),
            None => Ok(CredentialIndex::new()),
        }
    }

    fn save_index(&self, index: &CredentialIndex) -> Result<()> {
        let raw = serde_json::to_string(index)?;
        self.store.store(INDEX_KEY, &raw)
    }

    /// Guids of every stored credential
    fn guids(&self) -> Result<Vec<String>> {
        if self.store.supports_listing() {
            let keys = self.store.list_keys(CREDENTIAL_PREFIX).map_err(as_load_error)?;
            Ok(keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(CREDENTIAL_PREFIX).map(str::to_string))
                .collect())
        } else {
            Ok(self.load_index()?.into_keys().collect())
        }
    }

    fn load_credential(&self, guid: &str) -> Result<Option<Credential>> {
        let raw = match self.read(&entry_key(guid))? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let record: CredentialRecord =
            serde_json::from_str(&raw).map_err(|_| CredentialsError::corrupted(guid))?;
        if record.guid != guid {
            return Err(CredentialsError::corrupted(guid));
        }

        record.to_credential().map(Some)
    }

    fn load_all(&self) -> Result<Vec<Credential>> {
        let mut credentials = Vec::new();
        for guid in self.guids()? {
            match self.load_credential(&guid)? {
                Some(credential) => credentials.push(credential),
                None => warn!(credential = %guid, "Credential index refers to a missing entry"),
            }
        }
        Ok(credentials)
    }

    fn save_credential(&self, credential: &Credential) -> Result<()> {
        let record = CredentialRecord::new(credential)?;
        let raw = Zeroizing::new(serde_json::to_string(&record)?);
        self.store.store(&entry_key(&credential.guid), &raw)
    }

    /// Write a credential and its index entry as one unit.
    ///
    /// When the index cannot be updated the entry is restored to `previous`
    /// (or removed if there was none).
    fn persist(&self, credential: &Credential, previous: Option<&Credential>) -> Result<()> {
        self.save_credential(credential)?;

        if let Err(e) = self.index_insert(credential) {
            let rollback = match previous {
                Some(previous) => self.save_credential(previous),
                None => self.store.delete(&entry_key(&credential.guid)).map(|_| ()),
            };
            if let Err(rollback_err) = rollback {
                warn!(credential = %credential.guid, "Could not roll back credential entry: {}", rollback_err);
            }
            return Err(e);
        }

        Ok(())
    }

    fn index_insert(&self, credential: &Credential) -> Result<()> {
        if self.store.supports_listing() {
            return Ok(());
        }

        let mut index = self.load_index()?;
        if index.get(&credential.guid) == Some(&credential.name) {
            return Ok(());
        }
        index.insert(credential.guid.clone(), credential.name.clone());
        self.save_index(&index)
    }

    fn default_guid(&self) -> Result<Option<String>> {
        Ok(self.read(DEFAULT_SERVER_KEY)?.map(|guid| guid.trim().to_string()))
    }
}

fn as_load_error(e: CredentialsError) -> CredentialsError {
    match e {
        CredentialsError::Keyring(message) => CredentialsError::Load(message),
        other => other,
    }
}

impl CredentialsService for KeyringCredentialsService {
    fn list(&self) -> Result<Vec<Credential>> {
        let _guard = self.lock();
        self.load_all()
    }

    fn get(&self, guid: &str) -> Result<Credential> {
        let _guard = self.lock();

        self.load_credential(guid)?.ok_or_else(|| {
            debug!(credential = %guid, "Credential does not exist");
            CredentialsError::not_found(guid)
        })
    }

    fn set(&self, details: CreateCredentialDetails) -> Result<Credential> {
        let _guard = self.lock();
        let existing = self.load_all()?;
        let credential = details.to_credential()?;

        check_for_conflicts(&existing, &credential)?;
        if existing.iter().any(|c| c.guid == credential.guid) {
            return Err(CredentialsError::Storage(format!(
                "credential guid {} is already in use",
                credential.guid
            )));
        }

        self.persist(&credential, None)?;

        info!(guid = %credential.guid, name = %credential.name, "Stored credential in keyring");
        Ok(credential)
    }

    fn force_set(&self, details: CreateCredentialDetails) -> Result<Credential> {
        let _guard = self.lock();
        let existing = self.load_all()?;
        let mut credential = details.to_credential()?;

        audit_override(&existing, &credential, self.backend_name());

        let previous = existing.iter().find(|c| c.name == credential.name);
        if let Some(previous) = previous {
            credential.guid = previous.guid.clone();
        }

        self.persist(&credential, previous)?;

        info!(guid = %credential.guid, name = %credential.name, "Force-stored credential in keyring");
        Ok(credential)
    }

    fn delete(&self, guid: &str) -> Result<()> {
        let _guard = self.lock();
        let key = entry_key(guid);

        let previous = self.read(&key)?.ok_or_else(|| {
            debug!(credential = %guid, "Credential does not exist");
            CredentialsError::not_found(guid)
        })?;

        let index = if self.store.supports_listing() {
            None
        } else {
            Some(self.load_index()?)
        };

        self.store.delete(&key)?;

        if let Some(mut index) = index {
            index.remove(guid);
            if let Err(e) = self.save_index(&index) {
                if let Err(restore_err) = self.store.store(&key, &previous) {
                    warn!(credential = %guid, "Could not restore credential entry: {}", restore_err);
                }
                return Err(e);
            }
        }

        if self.default_guid()?.as_deref() == Some(guid) {
            self.store.delete(DEFAULT_SERVER_KEY)?;
        }

        info!(guid = %guid, "Deleted credential from keyring");
        Ok(())
    }

    fn reset(&self) -> Result<ResetOutcome> {
        let _guard = self.lock();

        // The index may be unreadable; that is what a reset recovers from
        let guids = match self.guids() {
            Ok(guids) => guids,
            Err(e) => {
                warn!("Could not enumerate stored credentials during reset: {}", e);
                Vec::new()
            }
        };

        for guid in &guids {
            self.store.delete(&entry_key(guid))?;
        }
        self.store.delete(INDEX_KEY)?;
        self.store.delete(DEFAULT_SERVER_KEY)?;

        warn!(
            credentials_service = "keyring",
            removed = guids.len(),
            "Stored credentials were reset"
        );
        Ok(ResetOutcome::without_backup())
    }

    fn default_server(&self) -> Result<Option<Credential>> {
        let _guard = self.lock();

        match self.default_guid()? {
            Some(guid) => self.load_credential(&guid),
            None => Ok(None),
        }
    }

    fn set_default_server(&self, guid: &str) -> Result<()> {
        let _guard = self.lock();

        if self.load_credential(guid)?.is_none() {
            return Err(CredentialsError::not_found(guid));
        }
        self.store.store(DEFAULT_SERVER_KEY, guid)
    }

    fn clear_default_server(&self) -> Result<()> {
        let _guard = self.lock();
        self.store.delete(DEFAULT_SERVER_KEY)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "keyring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::ServerType;
    use crate::storage::MemorySecretStore;

    fn services() -> Vec<(Arc<MemorySecretStore>, KeyringCredentialsService)> {
        [MemorySecretStore::new(), MemorySecretStore::without_listing()]
            .into_iter()
            .map(|store| {
                let store = Arc::new(store);
                let service = KeyringCredentialsService::new(store.clone());
                (store, service)
            })
            .collect()
    }

    #[test]
    fn test_set_and_get() {
        for (_, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();
            assert_eq!(cred.name, "example");
            assert_eq!(cred.server_type, ServerType::Connect);

            assert_eq!(cs.get(&cred.guid).unwrap(), cred);
            assert_eq!(cs.list().unwrap(), vec![cred]);
        }
    }

    #[test]
    fn test_large_credentials() {
        let large_key: String = (0..3500).map(|i| (b'A' + (i % 26) as u8) as char).collect();

        for (_, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("large-cred", "https://example.com/large", &large_key))
                .unwrap();
            assert_eq!(cs.get(&cred.guid).unwrap().api_key, large_key);
            assert!(cs.list().unwrap().contains(&cred));
        }
    }

    #[test]
    fn test_set_collisions() {
        for (_, cs) in services() {
            cs.set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();

            assert!(matches!(
                cs.set(CreateCredentialDetails::connect("example", "https://more_examples.com", "12345")),
                Err(CredentialsError::NameCollision { .. })
            ));
            assert!(matches!(
                cs.set(CreateCredentialDetails::connect("another", "https://EXAMPLE.com/", "12345")),
                Err(CredentialsError::IdentityCollision { .. })
            ));
            assert_eq!(cs.list().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_list_distinct_guids() {
        for (_, cs) in services() {
            for i in 0..5 {
                cs.set(CreateCredentialDetails::connect(
                    &format!("cred-{}", i),
                    &format!("https://{}.example.com", i),
                    "key",
                ))
                .unwrap();
            }

            let mut guids: Vec<String> = cs.list().unwrap().into_iter().map(|c| c.guid).collect();
            guids.sort();
            guids.dedup();
            assert_eq!(guids.len(), 5);
        }
    }

    #[test]
    fn test_delete() {
        for (store, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();
            cs.set_default_server(&cred.guid).unwrap();

            cs.delete(&cred.guid).unwrap();
            assert!(matches!(cs.get(&cred.guid), Err(CredentialsError::NotFound { .. })));
            assert!(cs.list().unwrap().is_empty());
            assert!(cs.default_server().unwrap().is_none());
            assert!(store.raw(DEFAULT_SERVER_KEY).is_none());

            assert!(matches!(cs.delete(&cred.guid), Err(CredentialsError::NotFound { .. })));
        }
    }

    #[test]
    fn test_force_set() {
        for (_, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();

            let newcred = cs
                .force_set(CreateCredentialDetails::connect(
                    "example",
                    "https://modified.example.com",
                    "modified-key",
                ))
                .unwrap();
            assert_eq!(newcred.guid, cred.guid);
            assert_eq!(newcred.url, "https://modified.example.com");

            let retrieved = cs.get(&cred.guid).unwrap();
            assert_eq!(retrieved.api_key, "modified-key");
            assert_eq!(cs.list().unwrap().len(), 1);

            let fresh = cs
                .force_set(CreateCredentialDetails::connect("new", "https://modified.example.com", "k"))
                .unwrap();
            assert_ne!(fresh.guid, cred.guid);
            assert_eq!(cs.list().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_reset() {
        for (store, cs) in services() {
            cs.set(CreateCredentialDetails::connect("example", "https://a.example.com", "12345"))
                .unwrap();
            let second = cs
                .set(CreateCredentialDetails::connect("example2", "https://b.example.com", "12345"))
                .unwrap();
            cs.set_default_server(&second.guid).unwrap();
            assert_eq!(cs.list().unwrap().len(), 2);

            let outcome = cs.reset().unwrap();
            assert!(outcome.backup_file.is_none());
            assert_eq!(outcome.backup_file_display(), "");

            assert!(cs.list().unwrap().is_empty());
            assert!(cs.default_server().unwrap().is_none());
            assert!(store.is_empty());
        }
    }

    #[test]
    fn test_corrupted_entry_then_reset() {
        for (store, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();
            store.store(&entry_key(&cred.guid), "{\"guid\": truncat").unwrap();

            assert!(matches!(cs.list(), Err(CredentialsError::Corrupted { .. })));
            assert!(matches!(cs.get(&cred.guid), Err(CredentialsError::Corrupted { .. })));

            cs.reset().unwrap();
            assert!(cs.list().unwrap().is_empty());
        }
    }

    #[test]
    fn test_mismatched_guid_is_corrupted() {
        for (store, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();
            let raw = store.raw(&entry_key(&cred.guid)).unwrap();
            store
                .store(&entry_key(&cred.guid), &raw.replace(&cred.guid, "someone-else"))
                .unwrap();

            assert!(matches!(cs.get(&cred.guid), Err(CredentialsError::Corrupted { .. })));

            // only the payload names another guid
            let mut record: serde_json::Value = serde_json::from_str(&raw).unwrap();
            record["data"]["guid"] = serde_json::json!("someone-else");
            store.store(&entry_key(&cred.guid), &record.to_string()).unwrap();

            assert!(matches!(cs.get(&cred.guid), Err(CredentialsError::Corrupted { .. })));
            assert!(matches!(cs.list(), Err(CredentialsError::Corrupted { .. })));
        }
    }

    #[test]
    fn test_corrupted_index_then_reset() {
        let store = Arc::new(MemorySecretStore::without_listing());
        let cs = KeyringCredentialsService::new(store.clone());
        cs.set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
            .unwrap();

        store.store(INDEX_KEY, "not json").unwrap();
        assert_eq!(
            cs.list().unwrap_err().to_string(),
            "credential 'credential index' is corrupted"
        );

        cs.reset().unwrap();
        assert!(cs.list().unwrap().is_empty());
    }

    #[test]
    fn test_stale_index_entry_is_skipped() {
        let store = Arc::new(MemorySecretStore::without_listing());
        let cs = KeyringCredentialsService::new(store.clone());
        let cred = cs
            .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
            .unwrap();

        store.delete(&entry_key(&cred.guid)).unwrap();
        assert!(cs.list().unwrap().is_empty());
    }

    #[test]
    fn test_failed_index_write_rolls_back() {
        let store = Arc::new(MemorySecretStore::without_listing());
        let cs = KeyringCredentialsService::new(store.clone());
        let kept = cs
            .set(CreateCredentialDetails::connect("kept", "https://kept.example.com", "1"))
            .unwrap();

        store.fail_writes_for(Some(INDEX_KEY));
        assert!(cs
            .set(CreateCredentialDetails::connect("lost", "https://lost.example.com", "2"))
            .is_err());
        assert!(cs
            .force_set(CreateCredentialDetails::connect("kept", "https://renamed.example.com", "3"))
            .is_ok());
        assert!(matches!(cs.delete(&kept.guid), Err(CredentialsError::Keyring(_))));
        store.fail_writes_for(None);

        let all = cs.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].guid, kept.guid);
        assert_eq!(all[0].url, "https://renamed.example.com");
        // the rejected credential left no entry behind
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_future_version_rejected() {
        for (store, cs) in services() {
            let cred = cs
                .set(CreateCredentialDetails::connect("example", "https://example.com", "12345"))
                .unwrap();
            let raw = store.raw(&entry_key(&cred.guid)).unwrap();
            let mut record: serde_json::Value = serde_json::from_str(&raw).unwrap();
            record["version"] = serde_json::json!(7);
            store.store(&entry_key(&cred.guid), &record.to_string()).unwrap();

            assert!(matches!(cs.get(&cred.guid), Err(CredentialsError::Version { version: 7 })));
        }
    }

    #[test]
    fn test_unreadable_store_is_load_error() {
        struct BrokenStore;

        impl SecretStore for BrokenStore {
            fn store(&self, _key: &str, _value: &str) -> Result<()> {
                Err(CredentialsError::Keyring("locked".to_string()))
            }
            fn retrieve(&self, _key: &str) -> Result<Option<String>> {
                Err(CredentialsError::Keyring("locked".to_string()))
            }
            fn delete(&self, _key: &str) -> Result<bool> {
                Err(CredentialsError::Keyring("locked".to_string()))
            }
            fn supports_listing(&self) -> bool {
                false
            }
            fn list_keys(&self, _prefix: &str) -> Result<Vec<String>> {
                Err(CredentialsError::Keyring("locked".to_string()))
            }
            fn backend_name(&self) -> &'static str {
                "broken"
            }
        }

        let cs = KeyringCredentialsService::new(Arc::new(BrokenStore));
        let err = cs.list().unwrap_err();
        assert!(matches!(err, CredentialsError::Load(_)));
        assert_eq!(err.status_code(), 503);
    }
}
