//! Validation and collision rules applied before a credential is written

use tracing::warn;
use uuid::Uuid;

use super::types::{Credential, CreateCredentialDetails, ServerType};
use crate::error::{CredentialsError, Result};
use crate::server_url::normalize_server_url;

impl CreateCredentialDetails {
    /// Build the record to store: check required fields, normalize the URL,
    /// keep only the selected auth kind, and assign a guid.
    pub(crate) fn to_credential(&self) -> Result<Credential> {
        if self.name.trim().is_empty() {
            return Err(incomplete("name is required"));
        }

        let mut url = self.url.clone();
        if url.trim().is_empty() && self.server_type.is_cloud() {
            url = self.cloud_environment.frontend_url().to_string();
        }
        if url.trim().is_empty() {
            return Err(incomplete("url is required"));
        }
        let url = normalize_server_url(&url)?;

        let guid = match &self.guid {
            Some(guid) if !guid.is_empty() => guid.clone(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut credential = Credential {
            guid,
            name: self.name.clone(),
            url,
            server_type: self.server_type,
            api_key: String::new(),
            token: String::new(),
            private_key: String::new(),
            snowflake_connection: String::new(),
            account_id: String::new(),
            account_name: String::new(),
            refresh_token: String::new(),
            access_token: String::new(),
            cloud_environment: Default::default(),
        };

        match self.server_type {
            ServerType::Connect => {
                let has_key = !self.api_key.is_empty();
                let has_token = !self.token.is_empty() || !self.private_key.is_empty();
                match (has_key, has_token) {
                    (true, true) => {
                        return Err(incomplete(
                            "connect credentials take either an api key or a token pair, not both",
                        ))
                    }
                    (false, false) => {
                        return Err(incomplete("connect credentials require an api key or a token pair"))
                    }
                    (true, false) => credential.api_key = self.api_key.clone(),
                    (false, true) => {
                        if self.token.is_empty() || self.private_key.is_empty() {
                            return Err(incomplete("token authentication requires both token and private key"));
                        }
                        credential.token = self.token.clone();
                        credential.private_key = self.private_key.clone();
                    }
                }
            }
            ServerType::Snowflake => {
                if self.snowflake_connection.is_empty() {
                    return Err(incomplete("snowflake credentials require a connection name"));
                }
                credential.snowflake_connection = self.snowflake_connection.clone();
            }
            ServerType::ConnectCloud => {
                let missing: Vec<&str> = [
                    ("account id", &self.account_id),
                    ("account name", &self.account_name),
                    ("refresh token", &self.refresh_token),
                    ("access token", &self.access_token),
                ]
                .into_iter()
                .filter(|(_, value)| value.is_empty())
                .map(|(field, _)| field)
                .collect();

                if !missing.is_empty() {
                    return Err(incomplete(&format!(
                        "connect cloud credentials require {}",
                        missing.join(", ")
                    )));
                }

                credential.account_id = self.account_id.clone();
                credential.account_name = self.account_name.clone();
                credential.refresh_token = self.refresh_token.clone();
                credential.access_token = self.access_token.clone();
                credential.cloud_environment = self.cloud_environment;
            }
        }

        Ok(credential)
    }
}

fn incomplete(reason: &str) -> CredentialsError {
    CredentialsError::IncompleteCredential(reason.to_string())
}

impl Credential {
    /// Whether `other` points at the same server identity as this credential
    pub fn same_identity(&self, other: &Credential) -> bool {
        self.url == other.url && self.account_name == other.account_name
    }

    /// Reject `candidate` if it reuses this credential's name or identity
    pub fn conflict_check(&self, candidate: &Credential) -> Result<()> {
        if self.name == candidate.name {
            return Err(CredentialsError::NameCollision {
                name: self.name.clone(),
                url: self.url.clone(),
            });
        }

        if self.same_identity(candidate) {
            return Err(CredentialsError::IdentityCollision {
                name: self.name.clone(),
                url: self.url.clone(),
                account_name: self.account_name.clone(),
            });
        }

        Ok(())
    }
}

/// Check `candidate` against every stored credential; the first conflict wins.
pub(crate) fn check_for_conflicts(existing: &[Credential], candidate: &Credential) -> Result<()> {
    existing
        .iter()
        .try_for_each(|stored| stored.conflict_check(candidate))
}

/// Log every rule a forced write bypasses.
///
/// Replacing the record with the same name is the purpose of a forced write
/// and is only noted when it changes the server identity.
pub(crate) fn audit_override(existing: &[Credential], candidate: &Credential, backend: &str) {
    for stored in existing {
        if stored.name == candidate.name {
            if !stored.same_identity(candidate) {
                warn!(
                    backend,
                    guid = %stored.guid,
                    name = %stored.name,
                    previous_url = %stored.url,
                    url = %candidate.url,
                    "Forced credential write replaced server identity"
                );
            }
        } else if stored.same_identity(candidate) {
            warn!(
                backend,
                name = %candidate.name,
                conflicting = %stored.name,
                url = %candidate.url,
                "Forced credential write shares its server identity with another credential"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CloudEnvironment;

    fn stored() -> Credential {
        CreateCredentialDetails {
            guid: Some("18cd5640-bee5-4b2a-992a-a2725ab6103d".to_string()),
            ..CreateCredentialDetails::connect(
                "friedtofu",
                "https://a1.connect-server:3939/connect",
                "abcdeC2aqbh7dg8TO43XPu7r56YDh000",
            )
        }
        .to_credential()
        .unwrap()
    }

    #[test]
    fn test_conflict_check() {
        let cred = stored();

        let other = CreateCredentialDetails::connect(
            "no friedtofu",
            "https://nota1.connect-server:3939/connect",
            "abcdeC2aqbh7dg8TO43XPu7r56YDh000",
        )
        .to_credential()
        .unwrap();
        assert!(cred.conflict_check(&other).is_ok());

        let same_name = CreateCredentialDetails::connect(
            "friedtofu",
            "https://nota1.connect-server:3939/connect",
            "abcdeC2aqbh7dg8TO43XPu7r56YDh000",
        )
        .to_credential()
        .unwrap();
        assert_eq!(
            cred.conflict_check(&same_name).unwrap_err().to_string(),
            "Name value conflicts with existing credential (friedtofu) URL: https://a1.connect-server:3939/connect"
        );

        let same_url = CreateCredentialDetails::connect(
            "no friedtofu",
            "https://A1.connect-server:3939/connect/",
            "abcdeC2aqbh7dg8TO43XPu7r56YDh000",
        )
        .to_credential()
        .unwrap();
        assert_eq!(
            cred.conflict_check(&same_url).unwrap_err().to_string(),
            "URL value conflicts with existing credential (friedtofu) URL: https://a1.connect-server:3939/connect"
        );
    }

    #[test]
    fn test_cloud_identity_includes_account() {
        let first = CreateCredentialDetails::connect_cloud(
            "team-a",
            CloudEnvironment::Production,
            "id-a",
            "team-a",
            "refresh",
            "access",
        )
        .to_credential()
        .unwrap();
        assert_eq!(first.url, "https://connect.posit.cloud");

        let second = CreateCredentialDetails::connect_cloud(
            "team-b",
            CloudEnvironment::Production,
            "id-b",
            "team-b",
            "refresh",
            "access",
        )
        .to_credential()
        .unwrap();
        assert!(check_for_conflicts(&[first.clone()], &second).is_ok());

        let duplicate = CreateCredentialDetails::connect_cloud(
            "team-a again",
            CloudEnvironment::Production,
            "id-a",
            "team-a",
            "refresh",
            "access",
        )
        .to_credential()
        .unwrap();
        assert!(matches!(
            check_for_conflicts(&[first, second], &duplicate),
            Err(CredentialsError::IdentityCollision { .. })
        ));
    }

    #[test]
    fn test_required_fields() {
        let missing_key = CreateCredentialDetails::connect("a", "https://a.example.com", "");
        assert!(matches!(
            missing_key.to_credential(),
            Err(CredentialsError::IncompleteCredential(_))
        ));

        let both = CreateCredentialDetails {
            api_key: "key".to_string(),
            ..CreateCredentialDetails::connect_with_token("a", "https://a.example.com", "tok", "pk")
        };
        assert!(matches!(both.to_credential(), Err(CredentialsError::IncompleteCredential(_))));

        let half_token = CreateCredentialDetails::connect_with_token("a", "https://a.example.com", "tok", "");
        assert!(matches!(
            half_token.to_credential(),
            Err(CredentialsError::IncompleteCredential(_))
        ));

        let no_connection = CreateCredentialDetails::snowflake("a", "https://x.snowflakecomputing.app", "");
        assert!(matches!(
            no_connection.to_credential(),
            Err(CredentialsError::IncompleteCredential(_))
        ));

        let no_name = CreateCredentialDetails::connect("  ", "https://a.example.com", "key");
        assert!(matches!(no_name.to_credential(), Err(CredentialsError::IncompleteCredential(_))));

        let bad_url = CreateCredentialDetails::connect("a", "example.com", "key");
        assert!(matches!(bad_url.to_credential(), Err(CredentialsError::InvalidUrl(_))));
    }

    #[test]
    fn test_other_auth_kinds_are_dropped() {
        let details = CreateCredentialDetails {
            snowflake_connection: "snowy".to_string(),
            access_token: "stray".to_string(),
            ..CreateCredentialDetails::connect("a", "https://a.example.com", "key")
        };
        let cred = details.to_credential().unwrap();
        assert_eq!(cred.api_key, "key");
        assert!(cred.snowflake_connection.is_empty());
        assert!(cred.access_token.is_empty());
    }

    #[test]
    fn test_fresh_guid_unless_preserved() {
        let details = CreateCredentialDetails::connect("a", "https://a.example.com", "key");
        let first = details.to_credential().unwrap();
        let second = details.to_credential().unwrap();
        assert_ne!(first.guid, second.guid);

        let preserved = CreateCredentialDetails::preserving(&first).to_credential().unwrap();
        assert_eq!(preserved, first);
    }
}
