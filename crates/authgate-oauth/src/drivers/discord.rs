//! Discord driver.
//!
//! Subjects are snowflake IDs (already strings on the wire); guild
//! memberships stand in for groups.

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::drivers::Driver;
use crate::errors::{OAuthError, Result};
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

/// Driver for Discord.
pub struct DiscordDriver;

#[async_trait]
impl Driver for DiscordDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Discord
    }

    async fn fetch_claims(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<ClaimMap> {
        let me_url = config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| OAuthError::FetchClaimsFailed("userinfo_url not set".to_string()))?;
        let me = super::bearer_get_json(browser, me_url, token).await?;
        normalize_me(&me)
    }

    async fn fetch_groups(
        &self,
        browser: &Browser,
        config: &ProviderConfig,
        token: &AccessTokenEnvelope,
    ) -> Result<Vec<String>> {
        let me_url = config
            .userinfo_url
            .as_deref()
            .ok_or_else(|| OAuthError::FetchClaimsFailed("userinfo_url not set".to_string()))?;
        let guilds = super::bearer_get_json(browser, &format!("{me_url}/guilds"), token).await?;
        Ok(guild_ids(&guilds))
    }
}

fn normalize_me(me: &Value) -> Result<ClaimMap> {
    let sub = super::string_member(me, "id")
        .ok_or_else(|| OAuthError::FetchClaimsFailed("Discord user has no id".to_string()))?;
    let email = match me.get("verified").and_then(Value::as_bool) {
        Some(false) => None,
        _ => super::string_member(me, "email"),
    };
    let picture = super::string_member(me, "avatar")
        .map(|avatar| format!("https://cdn.discordapp.com/avatars/{sub}/{avatar}.png"));
    Ok(ClaimMap {
        sub: Some(sub),
        email,
        name: super::string_member(me, "global_name"),
        preferred_username: super::string_member(me, "username"),
        groups: Vec::new(),
        picture,
        extra: Default::default(),
    })
}

/// Guild snowflakes are the stable membership identifiers; display names can
/// be renamed at will.
fn guild_ids(guilds: &Value) -> Vec<String> {
    guilds
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| super::string_member(entry, "id"))
                .collect()
        })
        .unwrap_or_default()
}
