//! Credential type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote product a credential authenticates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    /// Posit Connect (API key or token + private key)
    #[default]
    Connect,
    /// Posit Connect Cloud (OAuth tokens)
    ConnectCloud,
    /// Connect running inside Snowflake (named local connection)
    Snowflake,
}

impl ServerType {
    /// Guess the server type from a server URL.
    ///
    /// Used for stored records that predate the `server_type` field.
    pub fn from_url(server_url: &str) -> Self {
        let host = url::Url::parse(server_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_default();

        if host == "connect.posit.cloud" || host.ends_with(".connect.posit.cloud") {
            Self::ConnectCloud
        } else if host.ends_with(".snowflakecomputing.app") {
            Self::Snowflake
        } else {
            Self::Connect
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ConnectCloud => "connect_cloud",
            Self::Snowflake => "snowflake",
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, Self::ConnectCloud)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connect" => Ok(Self::Connect),
            "connect_cloud" | "connect-cloud" => Ok(Self::ConnectCloud),
            "snowflake" => Ok(Self::Snowflake),
            other => Err(format!("unknown server type: {}", other)),
        }
    }
}

/// Connect Cloud deployment a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudEnvironment {
    #[default]
    Production,
    Staging,
    Development,
}

impl CloudEnvironment {
    /// Frontend URL used as the server URL of Connect Cloud credentials
    pub fn frontend_url(&self) -> &'static str {
        match self {
            Self::Production => "https://connect.posit.cloud",
            Self::Staging => "https://staging.connect.posit.cloud",
            Self::Development => "https://dev.connect.posit.cloud",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

impl FromStr for CloudEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("unknown cloud environment: {}", other)),
        }
    }
}

/// A stored credential.
///
/// Only the fields of the auth kind selected by `server_type` are populated;
/// the others are empty strings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Store-assigned identifier
    pub guid: String,
    /// User-chosen nickname, unique in the store
    pub name: String,
    /// Normalized server URL
    pub url: String,
    pub server_type: ServerType,

    // Connect
    pub api_key: String,
    pub token: String,
    pub private_key: String,

    // Snowflake
    pub snowflake_connection: String,

    // Connect Cloud
    pub account_id: String,
    pub account_name: String,
    pub refresh_token: String,
    pub access_token: String,
    pub cloud_environment: CloudEnvironment,
}

impl Credential {
    /// Copy of this credential with every secret field blanked, safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.api_key,
            &mut copy.private_key,
            &mut copy.refresh_token,
            &mut copy.access_token,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }
}

const REDACTED: &str = "[REDACTED]";

fn redact(value: &str) -> &str {
    if value.is_empty() {
        ""
    } else {
        REDACTED
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("guid", &self.guid)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("server_type", &self.server_type)
            .field("api_key", &redact(&self.api_key))
            .field("token", &self.token)
            .field("private_key", &redact(&self.private_key))
            .field("snowflake_connection", &self.snowflake_connection)
            .field("account_id", &self.account_id)
            .field("account_name", &self.account_name)
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_token", &redact(&self.access_token))
            .field("cloud_environment", &self.cloud_environment)
            .finish()
    }
}

/// Caller input for `set` and `force_set`.
///
/// The guid is always assigned by the store; only migration carries an
/// existing guid across backends.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CreateCredentialDetails {
    pub(crate) guid: Option<String>,
    pub name: String,
    pub url: String,
    pub server_type: ServerType,

    pub api_key: String,
    pub token: String,
    pub private_key: String,

    pub snowflake_connection: String,

    pub account_id: String,
    pub account_name: String,
    pub refresh_token: String,
    pub access_token: String,
    pub cloud_environment: CloudEnvironment,
}

impl CreateCredentialDetails {
    /// Connect server authenticated with an API key
    pub fn connect(name: &str, url: &str, api_key: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            server_type: ServerType::Connect,
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    /// Connect server authenticated with a token and its signing key
    pub fn connect_with_token(name: &str, url: &str, token: &str, private_key: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            server_type: ServerType::Connect,
            token: token.to_string(),
            private_key: private_key.to_string(),
            ..Default::default()
        }
    }

    /// Connect in Snowflake, using a connection from the local Snowflake config
    pub fn snowflake(name: &str, url: &str, connection: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            server_type: ServerType::Snowflake,
            snowflake_connection: connection.to_string(),
            ..Default::default()
        }
    }

    /// Connect Cloud account; the URL is derived from the environment
    pub fn connect_cloud(
        name: &str,
        environment: CloudEnvironment,
        account_id: &str,
        account_name: &str,
        refresh_token: &str,
        access_token: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            server_type: ServerType::ConnectCloud,
            account_id: account_id.to_string(),
            account_name: account_name.to_string(),
            refresh_token: refresh_token.to_string(),
            access_token: access_token.to_string(),
            cloud_environment: environment,
            ..Default::default()
        }
    }

    /// Details that recreate `credential` with its guid, for migration
    pub(crate) fn preserving(credential: &Credential) -> Self {
        Self {
            guid: Some(credential.guid.clone()),
            name: credential.name.clone(),
            url: credential.url.clone(),
            server_type: credential.server_type,
            api_key: credential.api_key.clone(),
            token: credential.token.clone(),
            private_key: credential.private_key.clone(),
            snowflake_connection: credential.snowflake_connection.clone(),
            account_id: credential.account_id.clone(),
            account_name: credential.account_name.clone(),
            refresh_token: credential.refresh_token.clone(),
            access_token: credential.access_token.clone(),
            cloud_environment: credential.cloud_environment,
        }
    }
}

impl fmt::Debug for CreateCredentialDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateCredentialDetails")
            .field("guid", &self.guid)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("server_type", &self.server_type)
            .field("api_key", &redact(&self.api_key))
            .field("token", &self.token)
            .field("private_key", &redact(&self.private_key))
            .field("snowflake_connection", &self.snowflake_connection)
            .field("account_id", &self.account_id)
            .field("account_name", &self.account_name)
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_token", &redact(&self.access_token))
            .field("cloud_environment", &self.cloud_environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_type_from_url() {
        assert_eq!(ServerType::from_url("https://connect.example.com"), ServerType::Connect);
        assert_eq!(ServerType::from_url("https://connect.posit.cloud"), ServerType::ConnectCloud);
        assert_eq!(
            ServerType::from_url("https://staging.connect.posit.cloud"),
            ServerType::ConnectCloud
        );
        assert_eq!(
            ServerType::from_url("https://example.snowflakecomputing.app/connect"),
            ServerType::Snowflake
        );
        assert_eq!(ServerType::from_url("not a url"), ServerType::Connect);
    }

    #[test]
    fn test_server_type_parse() {
        assert_eq!("connect".parse::<ServerType>().unwrap(), ServerType::Connect);
        assert_eq!("Connect-Cloud".parse::<ServerType>().unwrap(), ServerType::ConnectCloud);
        assert!("nope".parse::<ServerType>().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let details = CreateCredentialDetails::connect("example", "https://example.com", "super-secret");
        let printed = format!("{:?}", details);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn test_serialized_field_names() {
        let credential = Credential {
            guid: "18cd5640-bee5-4b2a-992a-a2725ab6103d".to_string(),
            name: "friedtofu".to_string(),
            url: "https://a1.connect-server:3939/connect".to_string(),
            server_type: ServerType::Connect,
            api_key: "abc".to_string(),
            token: String::new(),
            private_key: String::new(),
            snowflake_connection: String::new(),
            account_id: String::new(),
            account_name: String::new(),
            refresh_token: String::new(),
            access_token: String::new(),
            cloud_environment: CloudEnvironment::Production,
        };

        let value = serde_json::to_value(&credential).unwrap();
        assert_eq!(value["apiKey"], "abc");
        assert_eq!(value["serverType"], "connect");
        assert_eq!(value["cloudEnvironment"], "production");

        let redacted = credential.redacted();
        assert_eq!(redacted.api_key, "[REDACTED]");
        assert_eq!(redacted.private_key, "");
    }
}
