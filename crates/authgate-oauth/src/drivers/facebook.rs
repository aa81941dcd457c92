//! Facebook driver.
//!
//! Facebook deviates on the wire: the token exchange is a GET with query
//! parameters and no `grant_type`, and identity comes from the Graph `/me`
//! endpoint.

use crate::browser::Browser;
use crate::config::{DriverKind, ProviderConfig};
use crate::drivers::Driver;
use crate::errors::{OAuthError, Result};
use crate::exchange::TokenRequestStyle;
use crate::types::{AccessTokenEnvelope, ClaimMap};
use async_trait::async_trait;
use serde_json::Value;

/// Driver for Facebook.
pub struct FacebookDriver;

#[async_trait]
impl Driver for FacebookDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Facebook
    }

    fn token_request_style(&self) -> TokenRequestStyle {
        TokenRequestStyle::GetQuery
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
        let url = format!("{me_url}?fields=id,name,email");
        let me = super::bearer_get_json(browser, &url, token).await?;
        normalize_me(&me)
    }
}

fn normalize_me(me: &Value) -> Result<ClaimMap> {
    let sub = super::string_member(me, "id")
        .ok_or_else(|| OAuthError::FetchClaimsFailed("Facebook profile has no id".to_string()))?;
    Ok(ClaimMap {
        sub: Some(sub),
        email: super::string_member(me, "email"),
        name: super::string_member(me, "name"),
        preferred_username: None,
        groups: Vec::new(),
        picture: None,
        extra: Default::default(),
    })
}
