//! Credential store configuration
//!
//! Nothing here is sensitive; it only decides where credentials live.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backend::CREDENTIALS_FILENAME;
use crate::error::{CredentialsError, Result};
use crate::storage::SERVICE_NAME;

/// Environment variable selecting the backend
pub const BACKEND_ENV: &str = "PUBLISHER_CREDENTIALS_BACKEND";

/// Environment variable overriding the credentials file location
pub const FILE_ENV: &str = "PUBLISHER_CREDENTIALS_FILE";

/// Which backend the factory opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Keyring when the OS keyring works, otherwise the file
    #[default]
    Auto,
    Keyring,
    File,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Keyring => "keyring",
            Self::File => "file",
        })
    }
}

impl FromStr for BackendKind {
    type Err = CredentialsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "keyring" | "keychain" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            other => Err(CredentialsError::Storage(format!(
                "unknown credentials backend '{}'",
                other
            ))),
        }
    }
}

/// Credential store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    pub backend: BackendKind,
    /// Credentials file; `~/.connect-credentials` when unset
    pub file_path: Option<PathBuf>,
    /// Keyring service name
    pub service_name: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            file_path: None,
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

impl CredentialsConfig {
    /// Defaults overridden by `PUBLISHER_CREDENTIALS_BACKEND` and `PUBLISHER_CREDENTIALS_FILE`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(backend) = lookup(BACKEND_ENV) {
            config.backend = backend.parse()?;
        }
        if let Some(path) = lookup(FILE_ENV).filter(|p| !p.trim().is_empty()) {
            config.file_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Resolved path of the credentials file
    pub fn credentials_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.file_path {
            return Ok(path.clone());
        }

        BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(CREDENTIALS_FILENAME))
            .ok_or_else(|| CredentialsError::Storage("Could not determine home directory".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CredentialsConfig::default();
        assert_eq!(config.backend, BackendKind::Auto);
        assert_eq!(config.service_name, "Posit Publisher Safe Storage");
        assert!(config.file_path.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (BACKEND_ENV, "File"),
            (FILE_ENV, "/tmp/creds.toml"),
        ]
        .into_iter()
        .collect();

        let config = CredentialsConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.credentials_file().unwrap(), PathBuf::from("/tmp/creds.toml"));
    }

    #[test]
    fn test_unknown_backend() {
        let result = CredentialsConfig::from_lookup(|k| (k == BACKEND_ENV).then(|| "vault".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("keychain".parse::<BackendKind>().unwrap(), BackendKind::Keyring);
        assert_eq!("".parse::<BackendKind>().unwrap(), BackendKind::Auto);
        assert_eq!(BackendKind::File.to_string(), "file");
    }
}
