//! TOML file storage backend
//!
//! Used when the OS keyring is unavailable. All credentials live in one TOML
//! document keyed by credential name:
//!
//! ```toml
//! [credentials.example]
//! guid = "18cd5640-bee5-4b2a-992a-a2725ab6103d"
//! version = 1
//! url = "https://connect.example.com"
//! api_key = "..."
//! ```
//!
//! The file is only as confidential as its permissions; it is created
//! readable by the owner only.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::credential::{
    audit_override, check_for_conflicts, check_version, CloudEnvironment, Credential,
    CreateCredentialDetails, ServerType, CURRENT_VERSION,
};
use crate::error::{CredentialsError, Result};
use crate::server_url::normalize_server_url;
use crate::service::{CredentialsService, ResetOutcome};

/// Default file name, placed in the user's home directory
pub const CREDENTIALS_FILENAME: &str = ".connect-credentials";

/// One `[credentials.<name>]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FileCredential {
    #[serde(default)]
    guid: String,
    #[serde(default)]
    version: u32,
    /// Only written when it cannot be inferred from the URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_type: Option<ServerType>,
    #[serde(default)]
    url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    api_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    private_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    snowflake_connection: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    account_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    account_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    refresh_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cloud_environment: Option<CloudEnvironment>,
}

impl FileCredential {
    fn is_valid(&self) -> bool {
        !self.url.is_empty()
            && (!self.api_key.is_empty()
                || !self.token.is_empty()
                || !self.snowflake_connection.is_empty()
                || !self.access_token.is_empty())
    }

    fn to_credential(&self, name: &str) -> Credential {
        Credential {
            guid: self.guid.clone(),
            name: name.to_string(),
            url: self.url.clone(),
            server_type: self
                .server_type
                .unwrap_or_else(|| ServerType::from_url(&self.url)),
            api_key: self.api_key.clone(),
            token: self.token.clone(),
            private_key: self.private_key.clone(),
            snowflake_connection: self.snowflake_connection.clone(),
            account_id: self.account_id.clone(),
            account_name: self.account_name.clone(),
            refresh_token: self.refresh_token.clone(),
            access_token: self.access_token.clone(),
            cloud_environment: self.cloud_environment.unwrap_or_default(),
        }
    }
}

impl From<&Credential> for FileCredential {
    fn from(credential: &Credential) -> Self {
        let server_type = (ServerType::from_url(&credential.url) != credential.server_type)
            .then_some(credential.server_type);
        let cloud_environment = credential
            .server_type
            .is_cloud()
            .then_some(credential.cloud_environment);

        Self {
            guid: credential.guid.clone(),
            version: CURRENT_VERSION,
            server_type,
            url: credential.url.clone(),
            api_key: credential.api_key.clone(),
            token: credential.token.clone(),
            private_key: credential.private_key.clone(),
            snowflake_connection: credential.snowflake_connection.clone(),
            account_id: credential.account_id.clone(),
            account_name: credential.account_name.clone(),
            refresh_token: credential.refresh_token.clone(),
            access_token: credential.access_token.clone(),
            cloud_environment,
        }
    }
}

/// Whole-file document
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FileCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_server: Option<String>,
    #[serde(default)]
    credentials: IndexMap<String, FileCredential>,
}

impl FileCredentials {
    fn list(&self) -> Vec<Credential> {
        self.credentials
            .iter()
            .map(|(name, entry)| entry.to_credential(name))
            .collect()
    }

    fn find_by_guid(&self, guid: &str) -> Option<Credential> {
        self.credentials
            .iter()
            .find(|(_, entry)| entry.guid == guid)
            .map(|(name, entry)| entry.to_credential(name))
    }

    /// Re-normalize URLs written before normalization existed
    fn normalize_all(&mut self) {
        for (name, entry) in self.credentials.iter_mut() {
            if !entry.is_valid() {
                continue;
            }
            match normalize_server_url(&entry.url) {
                Ok(normalized) => entry.url = normalized,
                Err(e) => debug!(credential = %name, "Keeping unnormalized credential URL: {}", e),
            }
        }
    }
}

/// File-backed credential store
pub struct FileCredentialsService {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialsService {
    /// Open the store at `path`, creating an empty file if needed and failing
    /// with `Load` when existing data cannot be read.
    pub fn new(path: PathBuf) -> Result<Self> {
        let service = Self::unchecked(path);
        service.setup()?;
        Ok(service)
    }

    /// Open the store without reading it, for recovery through `reset`
    pub fn unchecked(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Get the path to the credentials file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn setup(&self) -> Result<()> {
        let _guard = self.lock();

        if !self.path.exists() {
            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir).map_err(|e| self.load_error(e))?;
            }
            self.save_file(&FileCredentials::default())
                .map_err(|e| CredentialsError::Load(e.to_string()))?;
            debug!("Created credentials file at: {:?}", self.path);
            return Ok(());
        }

        match self.load() {
            Ok(_) => Ok(()),
            Err(e @ CredentialsError::Load(_)) => Err(e),
            Err(e) => Err(CredentialsError::Load(e.to_string())),
        }
    }

    /// Load storage from disk
    fn load(&self) -> Result<FileCredentials> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => Zeroizing::new(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No credentials file found at {:?}", self.path);
                return Ok(FileCredentials::default());
            }
            Err(e) => return Err(self.load_error(e)),
        };

        let mut creds: FileCredentials = toml::from_str(&contents).map_err(|e| {
            debug!("Could not parse credentials file {:?}: {}", self.path, e);
            CredentialsError::corrupted(self.path.display().to_string())
        })?;

        for entry in creds.credentials.values() {
            check_version(entry.version)?;
        }

        creds.normalize_all();
        Ok(creds)
    }

    /// Save storage to disk
    fn save_file(&self, creds: &FileCredentials) -> Result<()> {
        let contents = Zeroizing::new(
            toml::to_string(creds).map_err(|e| CredentialsError::Storage(e.to_string()))?,
        );

        // Write atomically using a temp file
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = open_private(&temp_path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        debug!("Saved {} credentials to {:?}", creds.credentials.len(), self.path);
        Ok(())
    }

    /// Copy the current file next to itself, suffixed with today's date
    fn backup_file(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| CREDENTIALS_FILENAME.to_string());
        let stamp = chrono::Local::now().format("%Y-%m-%d");
        let backup = self.path.with_file_name(format!("{}-{}", file_name, stamp));

        fs::copy(&self.path, &backup).map_err(|e| CredentialsError::BackupFile {
            path: backup.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Some(backup))
    }

    fn load_error(&self, e: std::io::Error) -> CredentialsError {
        CredentialsError::Load(format!("{}: {}", self.path.display(), e))
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl CredentialsService for FileCredentialsService {
    fn list(&self) -> Result<Vec<Credential>> {
        let _guard = self.lock();
        Ok(self.load()?.list())
    }

    fn get(&self, guid: &str) -> Result<Credential> {
        let _guard = self.lock();
        let creds = self.load()?;

        creds.find_by_guid(guid).ok_or_else(|| {
            debug!(credential = %guid, "Could not find credential in file");
            CredentialsError::not_found(guid)
        })
    }

    fn set(&self, details: CreateCredentialDetails) -> Result<Credential> {
        let _guard = self.lock();
        let mut creds = self.load()?;
        let credential = details.to_credential()?;

        let existing = creds.list();
        if let Err(e) = check_for_conflicts(&existing, &credential) {
            debug!("Conflicts storing new credential to file: {}", e);
            return Err(e);
        }
        if existing.iter().any(|c| c.guid == credential.guid) {
            return Err(CredentialsError::Storage(format!(
                "credential guid {} is already in use",
                credential.guid
            )));
        }

        creds
            .credentials
            .insert(credential.name.clone(), FileCredential::from(&credential));
        self.save_file(&creds)?;

        info!(guid = %credential.guid, name = %credential.name, "Stored credential in file");
        Ok(credential)
    }

    fn force_set(&self, details: CreateCredentialDetails) -> Result<Credential> {
        let _guard = self.lock();
        let mut creds = self.load()?;
        let mut credential = details.to_credential()?;

        audit_override(&creds.list(), &credential, self.backend_name());

        if let Some(previous) = creds.credentials.get(&credential.name) {
            if !previous.guid.is_empty() {
                credential.guid = previous.guid.clone();
            }
        }

        creds
            .credentials
            .insert(credential.name.clone(), FileCredential::from(&credential));
        self.save_file(&creds)?;

        info!(guid = %credential.guid, name = %credential.name, "Force-stored credential in file");
        Ok(credential)
    }

    fn delete(&self, guid: &str) -> Result<()> {
        let _guard = self.lock();
        let mut creds = self.load()?;

        let credential = creds.find_by_guid(guid).ok_or_else(|| {
            debug!(credential = %guid, "Cannot delete credential that does not exist");
            CredentialsError::not_found(guid)
        })?;

        creds.credentials.shift_remove(&credential.name);
        if creds.default_server.as_deref() == Some(guid) {
            creds.default_server = None;
        }
        self.save_file(&creds)?;

        info!(guid = %guid, name = %credential.name, "Deleted credential from file");
        Ok(())
    }

    fn reset(&self) -> Result<ResetOutcome> {
        let _guard = self.lock();

        let outcome = match self.backup_file() {
            Ok(backup_file) => ResetOutcome {
                backup_file,
                backup_error: None,
            },
            Err(e) => {
                warn!("Could not back up credentials file before reset: {}", e);
                ResetOutcome {
                    backup_file: None,
                    backup_error: Some(e),
                }
            }
        };

        self.save_file(&FileCredentials::default())?;

        warn!(credentials_service = "file", "Stored credentials were reset");
        if let Some(backup) = &outcome.backup_file {
            warn!(credentials_backup = %backup.display(), "Previous credentials file backed up");
        }
        Ok(outcome)
    }

    fn default_server(&self) -> Result<Option<Credential>> {
        let _guard = self.lock();
        let creds = self.load()?;

        Ok(creds
            .default_server
            .as_deref()
            .and_then(|guid| creds.find_by_guid(guid)))
    }

    fn set_default_server(&self, guid: &str) -> Result<()> {
        let _guard = self.lock();
        let mut creds = self.load()?;

        if creds.find_by_guid(guid).is_none() {
            return Err(CredentialsError::not_found(guid));
        }
        creds.default_server = Some(guid.to_string());
        self.save_file(&creds)
    }

    fn clear_default_server(&self) -> Result<()> {
        let _guard = self.lock();
        let mut creds = self.load()?;

        if creds.default_server.take().is_some() {
            self.save_file(&creds)?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
