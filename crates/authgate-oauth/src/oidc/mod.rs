//! OpenID Connect support: JWKS handling and ID-token verification.

pub mod jwks;
pub mod types;
pub mod verifier;

pub use jwks::JwksCache;
pub use types::{Audience, IdTokenClaims, JwksKey, JwksKeySet};
pub use verifier::{JwksVerifier, TokenVerifier, VerifyError};
