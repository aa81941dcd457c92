//! ID-token verification.

use crate::browser::Browser;
use crate::oidc::jwks::JwksCache;
use crate::oidc::types::{IdTokenClaims, JwksKey};
use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use thiserror::Error;

/// Clock skew tolerated on `exp` and `nbf`, in seconds.
pub const CLOCK_SKEW_SECS: u64 = 60;

/// Signature algorithms accepted on inbound ID tokens. `none` and the
/// HMAC family are rejected outright; ES512 is excluded because the
/// underlying JWT stack does not implement P-521.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::PS256,
];

/// ID-token verification failures.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// JWKS endpoint unreachable or returned garbage
    #[error("JWKS fetch failed: {0}")]
    JwksFetchFailed(String),

    /// Token header is not a decodable JWT header
    #[error("malformed token header: {0}")]
    MalformedHeader(String),

    /// Header algorithm outside the allow-list
    #[error("token algorithm {alg} is not allowed")]
    AlgorithmNotAllowed {
        /// Algorithm declared in the header
        alg: String,
    },

    /// Header carries no `kid`
    #[error("token header has no key ID")]
    MissingKeyId,

    /// No JWKS key matches the token's `kid`
    #[error("no key found for kid {kid}")]
    KeyNotFound {
        /// Key ID from the token header
        kid: String,
    },

    /// JWKS key cannot be turned into a verification key
    #[error("unusable verification key: {0}")]
    UnusableKey(String),

    /// Signature check failed
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token expired beyond the skew allowance
    #[error("token expired")]
    Expired,

    /// `nbf` lies in the future beyond the skew allowance
    #[error("token not yet valid")]
    NotYetValid,

    /// `iss` does not match the configured issuer
    #[error("issuer mismatch")]
    IssuerMismatch,

    /// `aud` does not contain the client ID
    #[error("audience mismatch")]
    AudienceMismatch,

    /// Any other claim-level failure
    #[error("claim validation failed: {0}")]
    ClaimValidation(String),

    /// Nonce expected but the token carries none
    #[error("token has no nonce")]
    MissingNonce,

    /// Token nonce differs from the one registered for the flow
    #[error("nonce mismatch")]
    NonceMismatch,

    /// No verifier configured for this provider
    #[error("token verification is not configured for this provider")]
    NotConfigured,
}

/// Abstract ID-token verification capability.
///
/// The engine only depends on this trait; the JWKS-backed implementation
/// below is the default, and tests substitute their own.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `id_token` and return its claims.
    ///
    /// `expected_nonce` is the nonce registered for the flow; `None` means
    /// nonce checking is disabled for this provider.
    async fn verify(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdTokenClaims, VerifyError>;
}

/// JWKS-backed [`TokenVerifier`].
pub struct JwksVerifier {
    issuer: String,
    client_id: String,
    jwks: JwksCache,
}

impl JwksVerifier {
    /// Create a verifier for one provider.
    pub fn new(browser: Browser, jwks_url: String, issuer: String, client_id: String) -> Self {
        Self {
            issuer,
            client_id,
            jwks: JwksCache::new(browser, jwks_url),
        }
    }

    fn decoding_key(key: &JwksKey) -> Result<DecodingKey, VerifyError> {
        match key.kty.as_str() {
            "RSA" => {
                let n = key.n.as_deref().ok_or_else(|| {
                    VerifyError::UnusableKey("RSA key has no modulus".to_string())
                })?;
                let e = key.e.as_deref().ok_or_else(|| {
                    VerifyError::UnusableKey("RSA key has no exponent".to_string())
                })?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| VerifyError::UnusableKey(e.to_string()))
            }
            "EC" => {
                let x = key
                    .x
                    .as_deref()
                    .ok_or_else(|| VerifyError::UnusableKey("EC key has no x".to_string()))?;
                let y = key
                    .y
                    .as_deref()
                    .ok_or_else(|| VerifyError::UnusableKey("EC key has no y".to_string()))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| VerifyError::UnusableKey(e.to_string()))
            }
            other => Err(VerifyError::UnusableKey(format!(
                "unsupported key type {other}"
            ))),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(
        &self,
        id_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdTokenClaims, VerifyError> {
        let header =
            decode_header(id_token).map_err(|e| VerifyError::MalformedHeader(e.to_string()))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(VerifyError::AlgorithmNotAllowed {
                alg: format!("{:?}", header.alg),
            });
        }

        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
        let key = self.jwks.key_for(&kid).await?;
        let decoding_key = Self::decoding_key(&key)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.client_id]);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.validate_nbf = true;

        let token_data = decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
                ErrorKind::ExpiredSignature => VerifyError::Expired,
                ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
                ErrorKind::InvalidIssuer => VerifyError::IssuerMismatch,
                ErrorKind::InvalidAudience => VerifyError::AudienceMismatch,
                _ => VerifyError::ClaimValidation(e.to_string()),
            })?;
        let claims = token_data.claims;

        if let Some(expected) = expected_nonce {
            match claims.nonce.as_deref() {
                None => return Err(VerifyError::MissingNonce),
                Some(nonce) if nonce != expected => return Err(VerifyError::NonceMismatch),
                Some(_) => {}
            }
        }

        Ok(claims)
    }
}
