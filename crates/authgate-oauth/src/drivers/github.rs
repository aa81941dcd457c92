//! GitHub driver.
//!
//! GitHub is plain OAuth 2.0: identity comes from `/user`, the primary
//! verified address from `/user/emails`, and organization memberships from
//! `/user/orgs`.

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::drivers::Driver;
use crate::errors::{OAuthError, Result};
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

/// Driver for GitHub.
pub struct GithubDriver;

impl GithubDriver {
    fn userinfo_url(config: &ProviderConfig) -> Result<&str> {
        config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| OAuthError::FetchClaimsFailed("userinfo_url not set".to_string()))
    }
}

#[async_trait]
impl Driver for GithubDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Github
    }

    async fn fetch_claims(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<ClaimMap> {
        let user_url = Self::userinfo_url(config)?;
        let user = super::bearer_get_json(browser, user_url, token).await?;
        let mut claims = normalize_user(&user)?;

        // The profile email is often null for users who keep it private; the
        // emails endpoint has the authoritative answer.
        match super::bearer_get_json(browser, &format!("{user_url}/emails"), token).await {
            Ok(emails) => {
                if let Some(email) = primary_verified_email(&emails) {
                    claims.email = Some(email);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed fetching GitHub emails");
            }
        }

        Ok(claims)
    }

    async fn fetch_groups(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<Vec<String>> {
        let user_url = Self::userinfo_url(config)?;
        let orgs = super::bearer_get_json(browser, &format!("{user_url}/orgs"), token).await?;
        Ok(org_logins(&orgs))
    }
}

fn normalize_user(user: &Value) -> Result<ClaimMap> {
    let sub = super::string_member(user, "id")
        .ok_or_else(|| OAuthError::FetchClaimsFailed("GitHub user has no id".to_string()))?;
    Ok(ClaimMap {
        sub: Some(sub),
        email: super::string_member(user, "email"),
        name: super::string_member(user, "name"),
        preferred_username: super::string_member(user, "login"),
        groups: Vec::new(),
        picture: super::string_member(user, "avatar_url"),
        extra: Default::default(),
    })
}

/// Pick the primary verified address, falling back to any verified one.
fn primary_verified_email(emails: &Value) -> Option<String> {
    let entries = emails.as_array()?;
    let verified = |entry: &&Value| entry.get("verified").and_then(Value::as_bool) == Some(true);
    entries
        .iter()
        .filter(verified)
        .find(|entry| entry.get("primary").and_then(Value::as_bool) == Some(true))
        .or_else(|| entries.iter().find(verified))
        .and_then(|entry| super::string_member(entry, "email"))
}

fn org_logins(orgs: &Value) -> Vec<String> {
    orgs.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| super::string_member(entry, "login"))
                .collect()
        })
        .unwrap_or_default()
}
