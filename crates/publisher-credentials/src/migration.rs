//! Copying credentials out of the legacy keyring entry

use std::collections::HashSet;
use tracing::{info, warn};

use crate::credential::CreateCredentialDetails;
use crate::error::{CredentialsError, Result};
use crate::service::CredentialsService;

/// Where the one-time legacy migration stands for a store factory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MigrationState {
    #[default]
    Unchecked,
    NotNeeded,
    Migrated { count: usize },
    Failed { reason: String },
}

impl MigrationState {
    /// Whether the check has run; a ready state is never re-checked
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Unchecked)
    }
}

/// Guids copied and guids found already present in the target
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
}

/// Copy every credential from `legacy` into `target`, keeping guids.
///
/// Credentials already present in the target are skipped, so an interrupted
/// migration can be rerun. The legacy store is cleared only after every
/// credential made it across.
pub fn migrate(
    legacy: &dyn CredentialsService,
    target: &dyn CredentialsService,
) -> Result<MigrationReport> {
    let credentials = legacy.list()?;
    let present: HashSet<String> = target.list()?.into_iter().map(|c| c.guid).collect();

    let mut report = MigrationReport::default();
    for credential in &credentials {
        if present.contains(&credential.guid) {
            report.skipped.push(credential.guid.clone());
            continue;
        }

        target
            .set(CreateCredentialDetails::preserving(credential))
            .map_err(|e| {
                warn!(name = %credential.name, "Failed to migrate credential: {}", e);
                CredentialsError::Migration {
                    name: credential.name.clone(),
                    source: Box::new(e),
                }
            })?;
        report.migrated.push(credential.guid.clone());
    }

    if let Err(e) = legacy.reset() {
        warn!("Could not remove legacy credentials after migration: {}", e);
    }

    info!(
        from = legacy.backend_name(),
        to = target.backend_name(),
        migrated = report.migrated.len(),
        skipped = report.skipped.len(),
        "Legacy credentials migrated"
    );
    Ok(report)
}
