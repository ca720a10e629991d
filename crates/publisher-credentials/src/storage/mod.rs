//! Secret storage used by the keyring backends
//!
//! Two implementations:
//! 1. OS Keychain (through the `keyring` crate)
//! 2. In-memory map (tests, embedders without a keyring)

mod keychain;
mod memory;
mod traits;

pub use keychain::{KeychainStorage, SERVICE_NAME};
pub use memory::MemorySecretStore;
pub use traits::SecretStore;
