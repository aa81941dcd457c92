//! Provider configuration.

use crate::browser::BrowserConfig;
use crate::errors::{OAuthError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Identifies the provider profile that customizes endpoints, token-request
/// shapes, and claim normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Any spec-compliant OpenID Connect provider
    Generic,
    /// Google (generic OIDC strategy, preset endpoints)
    Google,
    /// Microsoft Entra ID / Azure AD (generic OIDC strategy)
    Azure,
    /// Okta (generic OIDC strategy)
    Okta,
    /// GitHub (OAuth 2.0 only, JSON via Accept header)
    Github,
    /// GitLab (OAuth 2.0 REST API)
    Gitlab,
    /// Facebook (GET token exchange)
    Facebook,
    /// Discord (OAuth 2.0 REST API)
    Discord,
    /// Patreon (JSON:API identity endpoint)
    Patreon,
}

impl DriverKind {
    /// Lowercase driver tag as it appears in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Google => "google",
            Self::Azure => "azure",
            Self::Okta => "okta",
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Facebook => "facebook",
            Self::Discord => "discord",
            Self::Patreon => "patreon",
        }
    }

    /// Whether this driver derives identity from an `id_token`.
    pub fn is_oidc(&self) -> bool {
        matches!(self, Self::Generic | Self::Google | Self::Azure | Self::Okta)
    }
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one upstream authorization server.
///
/// Immutable after construction; the engine takes it by `Arc`. Preset
/// constructors fill endpoints, scopes, and quirk flags for the known
/// providers; [`ProviderConfig::validate`] is called once at engine
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider profile
    pub driver: DriverKind,
    /// OAuth client identifier
    pub client_id: String,
    /// OAuth client secret; never logged, never part of error messages
    pub client_secret: String,
    /// Scopes requested on the initial redirect
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `response_type` values for the initial redirect
    #[serde(default = "default_response_type")]
    pub response_type: Vec<String>,
    /// Authorization endpoint the user agent is redirected to
    pub authorization_url: String,
    /// Token endpoint for the code exchange
    pub token_url: String,
    /// Userinfo endpoint; optional for pure-OIDC providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_url: Option<String>,
    /// JWKS endpoint for ID-token verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_url: Option<String>,
    /// Expected `iss` claim of ID tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Do not mint or check a nonce
    #[serde(default)]
    pub disable_nonce: bool,
    /// Omit `scope` from the initial redirect
    #[serde(default)]
    pub disable_scope: bool,
    /// Omit `response_type` from the initial redirect
    #[serde(default)]
    pub disable_response_type: bool,
    /// Omit `grant_type` from the form-encoded token request
    #[serde(default)]
    pub disable_pass_grant_type: bool,
    /// Send `Accept: application/json` on the token request
    #[serde(default)]
    pub enable_accept_header: bool,
    /// Route the callback through the JavaScript callback endpoint
    #[serde(default)]
    pub js_callback_enabled: bool,
    /// Emit the raw ID token as a cookie on success
    #[serde(default)]
    pub identity_token_cookie_enabled: bool,
    /// Cookie name; defaults to `id_token` when enabled and unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_token_cookie_name: Option<String>,
    /// JSON keys that must be present in a token response
    #[serde(default)]
    pub required_token_fields: Vec<String>,
    /// Outbound HTTP client settings
    #[serde(default)]
    pub browser: BrowserConfig,
}

fn default_response_type() -> Vec<String> {
    vec!["code".to_string()]
}

impl ProviderConfig {
    fn base(
        driver: DriverKind,
        client_id: String,
        client_secret: String,
        authorization_url: String,
        token_url: String,
    ) -> Self {
        Self {
            driver,
            client_id,
            client_secret,
            scopes: Vec::new(),
            response_type: default_response_type(),
            authorization_url,
            token_url,
            userinfo_url: None,
            jwks_url: None,
            issuer: None,
            disable_nonce: false,
            disable_scope: false,
            disable_response_type: false,
            disable_pass_grant_type: false,
            enable_accept_header: false,
            js_callback_enabled: false,
            identity_token_cookie_enabled: false,
            identity_token_cookie_name: None,
            required_token_fields: vec!["access_token".to_string(), "token_type".to_string()],
            browser: BrowserConfig::default(),
        }
    }

    /// Generic OIDC provider with explicit endpoints.
    pub fn generic(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        let mut config = Self::base(
            DriverKind::Generic,
            client_id.into(),
            client_secret.into(),
            authorization_url.into(),
            token_url.into(),
        );
        config.scopes = oidc_scopes();
        config.required_token_fields.push("id_token".to_string());
        config
    }

    /// Google preset.
    pub fn google(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut config = Self::base(
            DriverKind::Google,
            client_id.into(),
            client_secret.into(),
            "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            "https://oauth2.googleapis.com/token".to_string(),
        );
        config.scopes = oidc_scopes();
        config.userinfo_url =
            Some("https://openidconnect.googleapis.com/v1/userinfo".to_string());
        config.jwks_url = Some("https://www.googleapis.com/oauth2/v3/certs".to_string());
        config.issuer = Some("https://accounts.google.com".to_string());
        config.required_token_fields.push("id_token".to_string());
        config
    }

    /// Microsoft Entra ID preset for the given tenant.
    pub fn azure(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant: &str,
    ) -> Self {
        let mut config = Self::base(
            DriverKind::Azure,
            client_id.into(),
            client_secret.into(),
            format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize"),
            format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token"),
        );
        config.scopes = oidc_scopes();
        config.jwks_url = Some(format!(
            "https://login.microsoftonline.com/{tenant}/discovery/v2.0/keys"
        ));
        config.issuer = Some(format!("https://login.microsoftonline.com/{tenant}/v2.0"));
        config.required_token_fields.push("id_token".to_string());
        config
    }

    /// Okta preset; `base_url` is the authorization-server base, e.g.
    /// `https://dev-123456.okta.com/oauth2/default`.
    pub fn okta(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: &str,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let mut config = Self::base(
            DriverKind::Okta,
            client_id.into(),
            client_secret.into(),
            format!("{base_url}/v1/authorize"),
            format!("{base_url}/v1/token"),
        );
        config.scopes = oidc_scopes();
        config.userinfo_url = Some(format!("{base_url}/v1/userinfo"));
        config.jwks_url = Some(format!("{base_url}/v1/keys"));
        config.issuer = Some(base_url.to_string());
        config.required_token_fields.push("id_token".to_string());
        config
    }

    /// GitHub preset. GitHub answers form-encoded unless the request carries
    /// `Accept: application/json`, so the accept header is enabled here.
    pub fn github(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut config = Self::base(
            DriverKind::Github,
            client_id.into(),
            client_secret.into(),
            "https://github.com/login/oauth/authorize".to_string(),
            "https://github.com/login/oauth/access_token".to_string(),
        );
        config.scopes = vec![
            "read:user".to_string(),
            "user:email".to_string(),
            "read:org".to_string(),
        ];
        config.userinfo_url = Some("https://api.github.com/user".to_string());
        config.enable_accept_header = true;
        config.required_token_fields = vec!["access_token".to_string()];
        config
    }

    /// GitLab preset.
    pub fn gitlab(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut config = Self::base(
            DriverKind::Gitlab,
            client_id.into(),
            client_secret.into(),
            "https://gitlab.com/oauth/authorize".to_string(),
            "https://gitlab.com/oauth/token".to_string(),
        );
        config.scopes = vec!["read_user".to_string(), "read_api".to_string()];
        config.userinfo_url = Some("https://gitlab.com/api/v4/user".to_string());
        config
    }

    /// Facebook preset. The token exchange is a GET with query parameters and
    /// no `grant_type`.
    pub fn facebook(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut config = Self::base(
            DriverKind::Facebook,
            client_id.into(),
            client_secret.into(),
            "https://www.facebook.com/v12.0/dialog/oauth".to_string(),
            "https://graph.facebook.com/v12.0/oauth/access_token".to_string(),
        );
        config.scopes = vec!["email".to_string(), "public_profile".to_string()];
        config.userinfo_url = Some("https://graph.facebook.com/me".to_string());
        config.required_token_fields = vec!["access_token".to_string()];
        config
    }

    /// Discord preset.
    pub fn discord(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut config = Self::base(
            DriverKind::Discord,
            client_id.into(),
            client_secret.into(),
            "https://discord.com/api/oauth2/authorize".to_string(),
            "https://discord.com/api/oauth2/token".to_string(),
        );
        config.scopes = vec![
            "identify".to_string(),
            "email".to_string(),
            "guilds".to_string(),
        ];
        config.userinfo_url = Some("https://discord.com/api/users/@me".to_string());
        config
    }

    /// Patreon preset.
    pub fn patreon(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        let mut config = Self::base(
            DriverKind::Patreon,
            client_id.into(),
            client_secret.into(),
            "https://www.patreon.com/oauth2/authorize".to_string(),
            "https://www.patreon.com/api/oauth2/token".to_string(),
        );
        config.scopes = vec!["identity".to_string(), "identity[email]".to_string()];
        config.userinfo_url = Some("https://www.patreon.com/api/oauth2/v2/identity".to_string());
        config
    }

    /// Set the JWKS endpoint.
    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = Some(jwks_url.into());
        self
    }

    /// Set the expected issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the userinfo endpoint.
    pub fn with_userinfo_url(mut self, userinfo_url: impl Into<String>) -> Self {
        self.userinfo_url = Some(userinfo_url.into());
        self
    }

    /// Replace the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Enable the identity-token cookie with the given name.
    pub fn with_identity_token_cookie(mut self, name: impl Into<String>) -> Self {
        self.identity_token_cookie_enabled = true;
        self.identity_token_cookie_name = Some(name.into());
        self
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(OAuthError::ConfigInvalid("client_id is empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(OAuthError::ConfigInvalid(
                "client_secret is empty".to_string(),
            ));
        }
        parse_url("authorization_url", &self.authorization_url)?;
        parse_url("token_url", &self.token_url)?;
        if let Some(url) = &self.userinfo_url {
            parse_url("userinfo_url", url)?;
        }
        if let Some(url) = &self.jwks_url {
            parse_url("jwks_url", url)?;
        }
        if self.driver.is_oidc() {
            if self.jwks_url.is_none() {
                return Err(OAuthError::ConfigInvalid(format!(
                    "driver {} requires jwks_url",
                    self.driver
                )));
            }
            if self.issuer.is_none() {
                return Err(OAuthError::ConfigInvalid(format!(
                    "driver {} requires issuer",
                    self.driver
                )));
            }
        }
        Ok(())
    }

    /// Cookie name to emit when the identity-token cookie is enabled.
    pub fn cookie_name(&self) -> &str {
        self.identity_token_cookie_name
            .as_deref()
            .unwrap_or("id_token")
    }
}

fn oidc_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}

fn parse_url(field: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| OAuthError::ConfigInvalid(format!("{field} is not a valid URL: {e}")))
}
