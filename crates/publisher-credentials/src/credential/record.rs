//! Versioned JSON representation used by keyring entries

use serde::{Deserialize, Serialize};

use super::types::{CloudEnvironment, Credential, ServerType};
use crate::error::{CredentialsError, Result};

/// Schema version written with every stored credential
pub const CURRENT_VERSION: u32 = 1;

/// Reject records written by a newer schema
pub(crate) fn check_version(version: u32) -> Result<()> {
    if version > CURRENT_VERSION {
        return Err(CredentialsError::Version { version });
    }
    Ok(())
}

/// Envelope stored under each keyring key
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CredentialRecord {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub version: u32,
    pub data: serde_json::Value,
}

impl CredentialRecord {
    pub fn new(credential: &Credential) -> Result<Self> {
        Ok(Self {
            guid: credential.guid.clone(),
            version: CURRENT_VERSION,
            data: serde_json::to_value(CredentialData::from(credential))?,
        })
    }

    /// Decode the payload, checking the version before the data
    pub fn to_credential(&self) -> Result<Credential> {
        check_version(self.version)?;

        let data: CredentialData = serde_json::from_value(self.data.clone())
            .map_err(|_| CredentialsError::corrupted(&self.guid))?;

        if !data.guid.is_empty() && !self.guid.is_empty() && data.guid != self.guid {
            return Err(CredentialsError::corrupted(&self.guid));
        }

        let mut credential = data.into_credential();
        if credential.guid.is_empty() {
            credential.guid = self.guid.clone();
        }
        Ok(credential)
    }
}

/// Credential fields as found in stored JSON.
///
/// Every field is optional so that records written before a field existed
/// still decode.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CredentialData {
    pub guid: String,
    pub name: String,
    pub url: String,
    pub server_type: Option<ServerType>,
    pub api_key: String,
    pub token: String,
    pub private_key: String,
    pub snowflake_connection: String,
    pub account_id: String,
    pub account_name: String,
    pub refresh_token: String,
    pub access_token: String,
    pub cloud_environment: Option<CloudEnvironment>,
}

impl CredentialData {
    pub fn into_credential(self) -> Credential {
        let server_type = self
            .server_type
            .unwrap_or_else(|| ServerType::from_url(&self.url));

        Credential {
            guid: self.guid,
            name: self.name,
            url: self.url,
            server_type,
            api_key: self.api_key,
            token: self.token,
            private_key: self.private_key,
            snowflake_connection: self.snowflake_connection,
            account_id: self.account_id,
            account_name: self.account_name,
            refresh_token: self.refresh_token,
            access_token: self.access_token,
            cloud_environment: self.cloud_environment.unwrap_or_default(),
        }
    }
}

impl From<&Credential> for CredentialData {
    fn from(credential: &Credential) -> Self {
        Self {
            guid: credential.guid.clone(),
            name: credential.name.clone(),
            url: credential.url.clone(),
            server_type: Some(credential.server_type),
            api_key: credential.api_key.clone(),
            token: credential.token.clone(),
            private_key: credential.private_key.clone(),
            snowflake_connection: credential.snowflake_connection.clone(),
            account_id: credential.account_id.clone(),
            account_name: credential.account_name.clone(),
            refresh_token: credential.refresh_token.clone(),
            access_token: credential.access_token.clone(),
            cloud_environment: Some(credential.cloud_environment),
        }
    }
}
