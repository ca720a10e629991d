//! Backend selection and one-time legacy migration

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::backend::{FileCredentialsService, KeyringCredentialsService, LegacyKeyringCredentials};
use crate::config::{BackendKind, CredentialsConfig};
use crate::error::{CredentialsError, Result};
use crate::migration::{migrate, MigrationState};
use crate::service::{CredentialsService, ResetOutcome};
use crate::storage::{KeychainStorage, SecretStore};

/// A ready-to-use credential store
pub struct OpenedStore {
    pub service: Arc<dyn CredentialsService>,
    /// Legacy migration state at the time the store was opened
    pub migration: MigrationState,
}

/// Opens the credential store selected by configuration.
///
/// The legacy migration check runs at most once per factory.
pub struct CredentialsFactory {
    config: CredentialsConfig,
    secret_store: Option<Arc<dyn SecretStore>>,
    migration: Mutex<MigrationState>,
}

impl CredentialsFactory {
    pub fn new(config: CredentialsConfig) -> Self {
        Self {
            config,
            secret_store: None,
            migration: Mutex::new(MigrationState::Unchecked),
        }
    }

    /// Use the given secret store instead of probing the OS keyring
    pub fn with_secret_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.secret_store = Some(store);
        self
    }

    pub fn config(&self) -> &CredentialsConfig {
        &self.config
    }

    pub fn migration_state(&self) -> MigrationState {
        self.migration_lock().clone()
    }

    fn migration_lock(&self) -> MutexGuard<'_, MigrationState> {
        self.migration.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The secret store to use, or `None` when the file backend applies
    fn secret_store(&self) -> Result<Option<Arc<dyn SecretStore>>> {
        if self.config.backend == BackendKind::File {
            return Ok(None);
        }
        if let Some(store) = &self.secret_store {
            return Ok(Some(store.clone()));
        }

        let keychain = KeychainStorage::with_service(&self.config.service_name);
        if keychain.is_available() {
            return Ok(Some(Arc::new(keychain)));
        }

        match self.config.backend {
            BackendKind::Keyring => Err(CredentialsError::Load(
                "system keyring is not available".to_string(),
            )),
            _ => {
                info!("System keyring unavailable, using file credentials");
                Ok(None)
            }
        }
    }

    /// Open the configured store, migrating legacy keyring data first
    pub fn open(&self) -> Result<OpenedStore> {
        match self.secret_store()? {
            Some(store) => {
                let target = KeyringCredentialsService::new(store.clone());
                let migration = self.ensure_migrated(store, &target);
                debug!("Using keyring credentials");
                Ok(OpenedStore {
                    service: Arc::new(target),
                    migration,
                })
            }
            None => {
                let path = self.config.credentials_file()?;
                debug!(path = %path.display(), "Using file credentials");
                Ok(OpenedStore {
                    service: Arc::new(FileCredentialsService::new(path)?),
                    migration: self.not_needed(),
                })
            }
        }
    }

    /// Open the configured store without validating its contents.
    ///
    /// Used to recover from corrupted data, so no migration runs either.
    pub fn open_for_reset(&self) -> Result<Arc<dyn CredentialsService>> {
        self.unchecked_service(self.secret_store()?)
    }

    fn unchecked_service(
        &self,
        store: Option<Arc<dyn SecretStore>>,
    ) -> Result<Arc<dyn CredentialsService>> {
        Ok(match store {
            Some(store) => Arc::new(KeyringCredentialsService::new(store)),
            None => Arc::new(FileCredentialsService::unchecked(self.config.credentials_file()?)),
        })
    }

    /// Reset the configured store, including any legacy keyring entry
    pub fn reset(&self) -> Result<ResetOutcome> {
        let store = self.secret_store()?;
        let outcome = self.unchecked_service(store.clone())?.reset()?;

        if let Some(store) = store {
            if let Err(e) = LegacyKeyringCredentials::new(store).reset() {
                warn!("Could not remove legacy keyring credentials: {}", e);
            }
        }
        Ok(outcome)
    }

    fn not_needed(&self) -> MigrationState {
        let mut state = self.migration_lock();
        if !state.is_ready() {
            *state = MigrationState::NotNeeded;
        }
        state.clone()
    }

    fn ensure_migrated(
        &self,
        store: Arc<dyn SecretStore>,
        target: &KeyringCredentialsService,
    ) -> MigrationState {
        let mut state = self.migration_lock();
        if state.is_ready() {
            return state.clone();
        }

        let legacy = LegacyKeyringCredentials::new(store);
        *state = if !legacy.is_supported() {
            MigrationState::NotNeeded
        } else {
            match migrate(&legacy, target) {
                Ok(report) => MigrationState::Migrated {
                    count: report.migrated.len(),
                },
                Err(e) => {
                    error!("Legacy credential migration failed: {}", e);
                    MigrationState::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };
        state.clone()
    }
}
