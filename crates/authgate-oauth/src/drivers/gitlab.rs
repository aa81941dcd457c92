//! GitLab driver. Uses the v4 REST API for user and group data.

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::drivers::Driver;
use crate::errors::{OAuthError, Result};
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

/// Driver for GitLab.
pub struct GitlabDriver;

#[async_trait]
impl Driver for GitlabDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Gitlab
    }

    async fn fetch_claims(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<ClaimMap> {
        let user_url = config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| OAuthError::FetchClaimsFailed("userinfo_url not set".to_string()))?;
        let user = super::bearer_get_json(browser, user_url, token).await?;
        normalize_user(&user)
    }

    async fn fetch_groups(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<Vec<String>> {
        let groups_url = groups_url(config)?;
        let groups = super::bearer_get_json(browser, &groups_url, token).await?;
        Ok(group_paths(&groups))
    }
}

/// `/api/v4/user` → `/api/v4/groups` on the same instance.
fn groups_url(config: &ProviderConfig) -> Result<String> {
    let user_url = config
        .userinfo_url
        .as_deref()
        .ok_or_else(|| OAuthError::FetchClaimsFailed("userinfo_url not set".to_string()))?;
    Ok(format!("{}/groups", user_url.trim_end_matches("/user")))
}

fn normalize_user(user: &Value) -> Result<ClaimMap> {
    let sub = super::string_member(user, "id")
        .ok_or_else(|| OAuthError::FetchClaimsFailed("GitLab user has no id".to_string()))?;
    Ok(ClaimMap {
        sub: Some(sub),
        email: super::string_member(user, "email"),
        name: super::string_member(user, "name"),
        preferred_username: super::string_member(user, "username"),
        groups: Vec::new(),
        picture: super::string_member(user, "avatar_url"),
        extra: Default::default(),
    })
}

fn group_paths(groups: &Value) -> Vec<String> {
    groups
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| super::string_member(entry, "full_path"))
                .collect()
        })
        .unwrap_or_default()
}
