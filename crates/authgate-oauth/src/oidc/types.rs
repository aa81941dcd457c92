//! OIDC wire types: JWKS documents and ID-token claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON Web Key Set published by the authorization server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwksKeySet {
    /// Keys in publication order
    pub keys: Vec<JwksKey>,
}

impl JwksKeySet {
    /// Find a key by its key ID.
    pub fn find_key(&self, kid: &str) -> Option<&JwksKey> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// One JSON Web Key. RSA and EC members are optional because the set mixes
/// key types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksKey {
    /// Key type, `RSA` or `EC`
    pub kty: String,
    /// Key ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Key use, `sig` for signing
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    /// Declared algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC curve name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Audience claim; providers emit either a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience
    One(String),
    /// Multiple audiences
    Many(Vec<String>),
}

impl Audience {
    /// Whether the audience set contains `client_id`.
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::One(aud) => aud == client_id,
            Self::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Claims portion of a validated ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject, the provider's stable user ID
    pub sub: String,
    /// Audience
    pub aud: Audience,
    /// Expiration, Unix seconds
    pub exp: u64,
    /// Issued-at, Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Not-before, Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Replay-protection nonce echoed from the authorization request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Email address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the provider vouches for the email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Login-style handle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Group memberships when the provider maps them into the token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Remaining claims, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<IdTokenClaims> for crate::types::ClaimMap {
    fn from(claims: IdTokenClaims) -> Self {
        let email = match claims.email_verified {
            Some(false) => None,
            _ => claims.email,
        };
        let mut map = crate::types::ClaimMap {
            sub: Some(claims.sub),
            email,
            name: claims.name,
            preferred_username: claims.preferred_username,
            groups: Vec::new(),
            picture: claims.picture,
            extra: claims.extra,
        };
        if let Some(groups) = claims.groups {
            map.set_groups(groups);
        }
        map
    }
}
