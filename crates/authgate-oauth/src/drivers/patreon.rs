//! Patreon driver.
//!
//! Patreon serves JSON:API documents: the identity lives under `data` and
//! memberships arrive as relationship includes.

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::drivers::Driver;
use crate::errors::{OAuthError, Result};
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

/// Driver for Patreon.
pub struct PatreonDriver;

impl PatreonDriver {
    fn identity_url(config: &ProviderConfig) -> Result<String> {
        let base = config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| OAuthError::FetchClaimsFailed("userinfo_url not set".to_string()))?;
        Ok(format!(
            "{base}?include=memberships&fields%5Buser%5D=email,full_name,vanity"
        ))
    }
}

#[async_trait]
impl Driver for PatreonDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Patreon
    }

    async fn fetch_claims(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<ClaimMap> {
        let identity = super::bearer_get_json(browser, &Self::identity_url(config)?, token).await?;
        normalize_identity(&identity)
    }

    async fn fetch_groups(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<Vec<String>> {
        let identity = super::bearer_get_json(browser, &Self::identity_url(config)?, token).await?;
        Ok(membership_ids(&identity))
    }
}

fn normalize_identity(identity: &Value) -> Result<ClaimMap> {
    let data = identity
        .get("data")
        .ok_or_else(|| OAuthError::FetchClaimsFailed("identity document has no data".to_string()))?;
    let sub = super::string_member(data, "id")
        .ok_or_else(|| OAuthError::FetchClaimsFailed("Patreon identity has no id".to_string()))?;
    let attributes = data.get("attributes").cloned().unwrap_or(Value::Null);
    Ok(ClaimMap {
        sub: Some(sub),
        email: super::string_member(&attributes, "email"),
        name: super::string_member(&attributes, "full_name"),
        preferred_username: super::string_member(&attributes, "vanity"),
        groups: Vec::new(),
        picture: None,
        extra: Default::default(),
    })
}

fn membership_ids(identity: &Value) -> Vec<String> {
    identity
        .get("included")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| {
                    entry.get("type").and_then(Value::as_str) == Some("member")
                })
                .filter_map(|entry| super::string_member(entry, "id"))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_identity() {
        let claims = normalize_identity(&json!({
            "data": {
                "id": "1234567",
                "type": "user",
                "attributes": {
                    "email": "fan@example.com",
                    "full_name": "A Fan",
                    "vanity": "afan"
                }
            }
        }))
        .unwrap();

        assert_eq!(claims.sub.as_deref(), Some("1234567"));
        assert_eq!(claims.preferred_username.as_deref(), Some("afan"));
    }

    #[test]
    fn test_membership_ids_filter_member_type() {
        let groups = membership_ids(&json!({
            "data": {"id": "1", "type": "user"},
            "included": [
                {"id": "m1", "type": "member"},
                {"id": "c1", "type": "campaign"},
                {"id": "m2", "type": "member"}
            ]
        }));

        assert_eq!(groups, vec!["m1", "m2"]);
    }

    #[test]
    fn test_missing_data_is_an_error() {
        assert!(normalize_identity(&json!({})).is_err());
    }
}
