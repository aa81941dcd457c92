//! Provider drivers.
//!
//! A driver is the strategy for one provider profile: how the token request
//! is shaped, whether identity comes from an `id_token`, and how the vendor's
//! userinfo and group payloads normalize into a [`ClaimMap`].

pub mod discord;
pub mod facebook;
pub mod generic;
pub mod github;
pub mod gitlab;
pub mod patreon;

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::errors::{OAuthError, Result};
use crate::exchange::TokenRequestStyle;
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

pub use discord::DiscordDriver;
pub use facebook::FacebookDriver;
pub use generic::GenericDriver;
pub use github::GithubDriver;
pub use gitlab::GitlabDriver;
pub use patreon::PatreonDriver;

/// Per-provider strategy consulted by the engine.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver tag this strategy serves.
    fn kind(&self) -> DriverKind;

    /// Wire shape of the token request.
    fn token_request_style(&self) -> TokenRequestStyle {
        TokenRequestStyle::PostForm
    }

    /// Whether identity claims come from a verified `id_token`.
    fn uses_id_token(&self) -> bool {
        false
    }

    /// Fetch and normalize the provider's user info.
    async fn fetch_claims(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<ClaimMap>;

    /// Fetch group or organization memberships. Failures here are logged by
    /// the engine and never fail the flow.
    async fn fetch_groups(
        &self,
        _browser: &Browser,
        _config: &ProviderConfig,
        _token: &AccessTokenEnvelope,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

static GENERIC: GenericDriver = GenericDriver;
static GITHUB: GithubDriver = GithubDriver;
static GITLAB: GitlabDriver = GitlabDriver;
static FACEBOOK: FacebookDriver = FacebookDriver;
static DISCORD: DiscordDriver = DiscordDriver;
static PATREON: PatreonDriver = PatreonDriver;

/// Resolve the strategy for a driver tag.
///
/// Google, Azure, and Okta are spec-compliant OIDC providers and share the
/// generic strategy; only their endpoint presets differ.
pub fn resolve(kind: DriverKind) -> &'static dyn Driver {
    match kind {
        DriverKind::Generic | DriverKind::Google | DriverKind::Azure | DriverKind::Okta => {
            &GENERIC
        }
        DriverKind::Github => &GITHUB,
        DriverKind::Gitlab => &GITLAB,
        DriverKind::Facebook => &FACEBOOK,
        DriverKind::Discord => &DISCORD,
        DriverKind::Patreon => &PATREON,
    }
}

/// Bearer-authenticated GET returning the decoded JSON body.
pub(crate) async fn bearer_get_json(
    browser: &Browser,
    url: &str,
    token: &AccessTokenEnvelope,
) -> Result<Value> {
    let access_token = token
        .bearer()
        .ok_or_else(|| OAuthError::FetchClaimsFailed("no access token available".to_string()))?;
    let response = browser
        .get(url)
        .bearer_auth(access_token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| OAuthError::FetchClaimsFailed(e.to_string()))?;
    response
        .json::<Value>()
        .await
        .map_err(|e| OAuthError::FetchClaimsFailed(e.to_string()))
}

/// Read a JSON member as a string, stringifying numbers.
pub(crate) fn string_member(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
