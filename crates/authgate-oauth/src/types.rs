//! Core data types shared across the relying party.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// Decoded token-endpoint response.
///
/// Well-known members are typed; anything else the vendor sends lands in
/// `raw` unchanged, so quirky fields (Facebook's string `expires_in`,
/// GitHub's `scope` lists) survive the round trip without loosening the
/// common case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessTokenEnvelope {
    /// Bearer token for userinfo and group requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Token type, normally `Bearer`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Raw ID token JWT when the provider issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Refresh token when the provider issued one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope string when echoed back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Vendor extras, preserved verbatim
    #[serde(flatten)]
    pub raw: Map<String, Value>,
}

impl AccessTokenEnvelope {
    /// Whether the decoded response carries the given JSON key, typed or raw.
    pub fn has_field(&self, field: &str) -> bool {
        match field {
            "access_token" => self.access_token.is_some(),
            "token_type" => self.token_type.is_some(),
            "id_token" => self.id_token.is_some(),
            "refresh_token" => self.refresh_token.is_some(),
            "scope" => self.scope.is_some(),
            other => self.raw.contains_key(other),
        }
    }

    /// The bearer token, when present.
    pub fn bearer(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

/// Normalized identity delivered to upstream components.
///
/// Driver-specific keys never appear at the top level; vendor passthrough
/// lives under `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimMap {
    /// Stable subject identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Email address, omitted when the provider reports it unverified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Short login-style handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Flat, deduplicated, sorted group memberships
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Vendor passthrough
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClaimMap {
    /// Whether the minimum identity (a stable subject) has been assembled.
    pub fn has_subject(&self) -> bool {
        self.sub.is_some()
    }

    /// Fill gaps from `other` without overwriting anything already present.
    pub fn merge_missing(&mut self, other: ClaimMap) {
        if self.sub.is_none() {
            self.sub = other.sub;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.preferred_username.is_none() {
            self.preferred_username = other.preferred_username;
        }
        if self.picture.is_none() {
            self.picture = other.picture;
        }
        if !other.groups.is_empty() {
            let mut groups = std::mem::take(&mut self.groups);
            groups.extend(other.groups);
            self.groups = normalize_groups(groups);
        }
        for (k, v) in other.extra {
            self.extra.entry(k).or_insert(v);
        }
    }

    /// Replace the group list with a deduplicated sorted copy of `groups`.
    pub fn set_groups(&mut self, groups: Vec<String>) {
        self.groups = normalize_groups(groups);
    }
}

/// Deduplicate and sort group names.
pub fn normalize_groups(mut groups: Vec<String>) -> Vec<String> {
    groups.sort();
    groups.dedup();
    groups
}

/// Identity cookie handed back to the user agent on success.
///
/// The value is the raw ID token JWT; serialization is the framework's job,
/// but [`IdentityTokenCookie::header_value`] renders the implementation
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityTokenCookie {
    /// Cookie name from configuration
    pub name: String,
    /// Raw ID token JWT
    pub payload: String,
}

impl IdentityTokenCookie {
    /// `Set-Cookie` value with the default attributes.
    pub fn header_value(&self) -> String {
        format!(
            "{}={}; HttpOnly; Secure; SameSite=Lax",
            self.name, self.payload
        )
    }
}

/// Outcome of one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    /// HTTP status the framework should answer with
    pub code: u16,
    /// Normalized claims on success
    pub payload: Option<ClaimMap>,
    /// Authorization-server redirect target when initiating a flow
    pub redirect_url: Option<String>,
    /// Identity cookie when enabled and an ID token was issued
    pub identity_token_cookie: Option<IdentityTokenCookie>,
}

/// Per-request context handed to the engine.
///
/// The engine is the only writer of `response`; the surrounding framework
/// owns routing, header parsing, and serialization.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Upstream session identifier for log correlation
    pub session_id: String,
    /// Unique request identifier
    pub request_id: String,
    /// Client address as seen by the framework
    pub source_ip: String,
    /// External base URL of this deployment, e.g. `https://sso.example.com`
    pub base_url: String,
    /// Realm segment of the inbound path
    pub realm: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Response under construction
    pub response: AuthResponse,
}

impl RequestContext {
    /// New context with generated session and request identifiers.
    pub fn new(base_url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            source_ip: String::new(),
            base_url: base_url.into(),
            realm: realm.into(),
            query: HashMap::new(),
            response: AuthResponse::default(),
        }
    }

    /// Add a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Query parameter lookup.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Canonical endpoint path for this realm: `{base}/oauth2/{realm}`.
    pub fn endpoint_path(&self) -> String {
        format!(
            "{}/oauth2/{}",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }
}
