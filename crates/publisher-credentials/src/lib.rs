//! # publisher-credentials
//!
//! Credential storage for Posit Publisher including:
//! - OS keyring backend with one entry per credential
//! - TOML file fallback at `~/.connect-credentials`
//! - Collision checks on names and normalized server URLs
//! - One-time migration from the legacy single-entry keyring format

pub mod backend;
pub mod config;
pub mod credential;
pub mod error;
pub mod factory;
pub mod migration;
pub mod server_url;
pub mod service;
pub mod storage;

pub use backend::{FileCredentialsService, KeyringCredentialsService, LegacyKeyringCredentials};
pub use config::{BackendKind, CredentialsConfig};
pub use credential::{CloudEnvironment, CreateCredentialDetails, Credential, ServerType};
pub use error::{CredentialsError, Result};
pub use factory::{CredentialsFactory, OpenedStore};
pub use migration::{migrate, MigrationReport, MigrationState};
pub use server_url::{discover_server_url, normalize_server_url, possible_server_urls};
pub use service::{CredentialsService, ResetOutcome};
pub use storage::{KeychainStorage, MemorySecretStore, SecretStore};
