//! OAuth 2.0 / OpenID Connect relying party for the authgate framework.
//!
//! This crate drives the browser-mediated Authorization Code flow (and the
//! Implicit/Hybrid variant) against an external authorization server,
//! exchanges the code for tokens, validates ID tokens, and normalizes
//! provider identities into a common claim map.
//!
//! # Security
//! - Every flow is bound by a random `state`; callbacks with an unknown
//!   `state` are rejected before any outbound request.
//! - OIDC flows carry a `nonce` echoed inside the ID token; a mismatch is
//!   terminal for the flow.
//! - ID tokens are verified against the provider's JWKS with a fixed
//!   algorithm allow-list; `alg: none` and HMAC tokens are rejected.
//! - Client secrets and token bodies never appear in error messages or
//!   info-level logs.

pub mod browser;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod errors;
pub mod exchange;
pub mod oidc;
pub mod state;
pub mod types;

pub use browser::{Browser, BrowserConfig};
pub use config::{DriverKind, ProviderConfig};
pub use engine::IdentityProvider;
pub use errors::{OAuthError, Result};
pub use exchange::TokenRequestStyle;
pub use oidc::{IdTokenClaims, JwksVerifier, TokenVerifier, VerifyError};
pub use state::{FlowState, FlowStateStore, DEFAULT_FLOW_TTL};
pub use types::{
    AccessTokenEnvelope, AuthResponse, ClaimMap, IdentityTokenCookie, RequestContext,
};
