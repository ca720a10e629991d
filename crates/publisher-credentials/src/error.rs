//! Error types for the credential store

use thiserror::Error;

/// Result type alias for credential store operations
pub type Result<T> = std::result::Result<T, CredentialsError>;

/// Credential store error types
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("credential not found: {guid}")]
    NotFound { guid: String },

    #[error("credential '{entry}' is corrupted")]
    Corrupted { entry: String },

    #[error("failed to load credentials: {0}")]
    Load(String),

    #[error("Name value conflicts with existing credential ({name}) URL: {url}")]
    NameCollision { name: String, url: String },

    #[error(
        "URL value conflicts with existing credential ({name}) URL: {url}{}",
        account_suffix(.account_name)
    )]
    IdentityCollision {
        name: String,
        url: String,
        account_name: String,
    },

    #[error("credential version not supported: {version}")]
    Version { version: u32 },

    #[error("incomplete credential: {0}")]
    IncompleteCredential(String),

    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("failed to back up credentials to {path}: {reason}")]
    BackupFile { path: String, reason: String },

    #[error("{0} not supported in legacy format")]
    Unsupported(String),

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to migrate credential {name:?}: {source}")]
    Migration {
        name: String,
        #[source]
        source: Box<CredentialsError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn account_suffix(account_name: &str) -> String {
    if account_name.is_empty() {
        String::new()
    } else {
        format!(" account: {}", account_name)
    }
}

impl CredentialsError {
    /// HTTP status a handler should answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::NameCollision { .. } | Self::IdentityCollision { .. } => 409,
            Self::Load(_) | Self::Corrupted { .. } => 503,
            Self::IncompleteCredential(_) | Self::InvalidUrl(_) => 400,
            Self::Migration { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// True when the backing store itself is broken and only a reset recovers it
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Load(_) | Self::Corrupted { .. })
    }

    pub(crate) fn corrupted(entry: impl Into<String>) -> Self {
        Self::Corrupted {
            entry: entry.into(),
        }
    }

    pub(crate) fn not_found(guid: impl Into<String>) -> Self {
        Self::NotFound { guid: guid.into() }
    }
}
