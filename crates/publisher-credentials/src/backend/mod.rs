//! Credential store backends
//!
//! - Keyring: one secret-store entry per credential
//! - File: a TOML document at `~/.connect-credentials`
//! - Legacy keyring: the old single-entry format, read only for migration

mod file;
mod keyring;
mod legacy;

pub use file::{FileCredentialsService, CREDENTIALS_FILENAME};
pub use keyring::KeyringCredentialsService;
pub use legacy::{LegacyKeyringCredentials, LEGACY_KEY};
