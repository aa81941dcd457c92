//! Generic OIDC driver.
//!
//! Identity comes from the verified `id_token`; the userinfo endpoint, when
//! configured, only enriches the claim map.

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::drivers::Driver;
use crate::errors::Result;
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

/// Driver for spec-compliant OIDC providers.
pub struct GenericDriver;

#[async_trait]
impl Driver for GenericDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Generic
    }

    fn uses_id_token(&self) -> bool {
        true
    }

    async fn fetch_claims(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<ClaimMap> {
        let Some(userinfo_url) = config.userinfo_url.as_deref() else {
            return Ok(ClaimMap::default());
        };
        let body = super::bearer_get_json(browser, userinfo_url, token).await?;
        Ok(normalize_userinfo(&body))
    }
}

/// Map a standard OIDC userinfo document onto the claim map. Unknown members
/// are preserved under the passthrough map.
fn normalize_userinfo(body: &Value) -> ClaimMap {
    let mut claims = ClaimMap {
        sub: super::string_member(body, "sub"),
        email: match body.get("email_verified").and_then(Value::as_bool) {
            Some(false) => None,
            _ => super::string_member(body, "email"),
        },
        name: super::string_member(body, "name"),
        preferred_username: super::string_member(body, "preferred_username"),
        groups: Vec::new(),
        picture: super::string_member(body, "picture"),
        extra: Default::default(),
    };
    if let Some(groups) = body.get("groups").and_then(Value::as_array) {
        claims.set_groups(
            groups
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        );
    }
    if let Some(object) = body.as_object() {
        const NORMALIZED: &[&str] = &[
            "sub",
            "email",
            "email_verified",
            "name",
            "preferred_username",
            "picture",
            "groups",
        ];
        for (k, v) in object {
            if !NORMALIZED.contains(&k.as_str()) {
                claims.extra.insert(k.clone(), v.clone());
            }
        }
    }
    claims
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_standard_userinfo() {
        let claims = normalize_userinfo(&json!({
            "sub": "u1",
            "email": "u1@example.com",
            "email_verified": true,
            "name": "User One",
            "preferred_username": "u.one",
            "picture": "https://cdn.example.com/u1.png",
            "groups": ["ops", "dev", "ops"],
            "locale": "en"
        }));

        assert_eq!(claims.sub.as_deref(), Some("u1"));
        assert_eq!(claims.email.as_deref(), Some("u1@example.com"));
        assert_eq!(claims.groups, vec!["dev", "ops"]);
        assert_eq!(claims.extra["locale"], json!("en"));
        assert!(!claims.extra.contains_key("sub"));
    }

    #[test]
    fn test_normalize_drops_unverified_email() {
        let claims = normalize_userinfo(&json!({
            "sub": "u1",
            "email": "u1@example.com",
            "email_verified": false
        }));

        assert!(claims.email.is_none());
    }
}
