//! Credential records and the rules every backend applies before writing

mod checker;
mod record;
mod types;

pub(crate) use checker::{audit_override, check_for_conflicts};
pub(crate) use record::{check_version, CredentialData, CredentialRecord};
pub use record::CURRENT_VERSION;
pub use types::*;
