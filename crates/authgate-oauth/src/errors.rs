//! Relying-party error types.

use crate::oidc::verifier::VerifyError;
use thiserror::Error;

/// Errors surfaced by the OAuth relying party.
///
/// Every variant maps to a stable kind tag via [`OAuthError::kind`] so
/// upstream components can branch on the outcome without string matching.
/// None of the messages carry the client secret, token bodies, or cookie
/// payloads.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The authorization server answered the redirect with an `error` parameter
    #[error("authorization failed: {error}")]
    AuthorizationFailed {
        /// Error code returned by the authorization server
        error: String,
    },

    /// Like [`OAuthError::AuthorizationFailed`], with the server's description
    #[error("authorization failed: {error}: {description}")]
    AuthorizationFailedDetailed {
        /// Error code returned by the authorization server
        error: String,
        /// Human-readable description supplied by the server
        description: String,
    },

    /// Callback carried a `state` that is not live (unknown, consumed, or expired)
    #[error("authorization state not found")]
    AuthorizationStateNotFound,

    /// A live flow already holds a different authorization code
    #[error("authorization code conflicts with the code already bound to this flow")]
    AuthorizationCodeConflict,

    /// Transport or decode failure while talking to the token endpoint
    #[error("failed fetching access token: {0}")]
    FetchAccessTokenFailed(String),

    /// Token endpoint returned an error body
    #[error("access token request failed: {error}")]
    GetAccessTokenFailed {
        /// The `error` value as returned; may be a string or arbitrary JSON
        error: serde_json::Value,
    },

    /// Token endpoint returned an error body with a description
    #[error("access token request failed: {error}: {description}")]
    GetAccessTokenFailedDetailed {
        /// Error code returned by the token endpoint
        error: String,
        /// The accompanying `error_description`
        description: String,
    },

    /// A field listed in `required_token_fields` is missing from the token response
    #[error("authorization server response has no {field} field")]
    AuthorizationServerResponseFieldNotFound {
        /// Name of the missing JSON key
        field: String,
    },

    /// ID token verification, claim check, or nonce match failed
    #[error("access token validation failed: {0}")]
    ValidateAccessTokenFailed(#[from] VerifyError),

    /// Userinfo transport or decode failure with no fallback identity
    #[error("failed fetching claims: {0}")]
    FetchClaimsFailed(String),

    /// Inbound request parameters match none of the accepted shapes
    #[error("unable to process authorization server response")]
    ResponseProcessingFailed,

    /// A flow with the same `state` is already live
    #[error("flow state already exists")]
    FlowStateConflict,

    /// Provider configuration rejected at construction time
    #[error("provider configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Outbound HTTP client could not be constructed
    #[error("browser initialization failed: {0}")]
    BrowserInitFailed(String),
}

impl OAuthError {
    /// Stable kind tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthorizationFailed { .. } => "authorization_failed",
            Self::AuthorizationFailedDetailed { .. } => "authorization_failed_detailed",
            Self::AuthorizationStateNotFound => "authorization_state_not_found",
            Self::AuthorizationCodeConflict => "authorization_code_conflict",
            Self::FetchAccessTokenFailed(_) => "fetch_access_token_failed",
            Self::GetAccessTokenFailed { .. } => "get_access_token_failed",
            Self::GetAccessTokenFailedDetailed { .. } => "get_access_token_failed_detailed",
            Self::AuthorizationServerResponseFieldNotFound { .. } => {
                "authorization_server_response_field_not_found"
            }
            Self::ValidateAccessTokenFailed(_) => "validate_access_token_failed",
            Self::FetchClaimsFailed(_) => "fetch_claims_failed",
            Self::ResponseProcessingFailed => "response_processing_failed",
            Self::FlowStateConflict => "flow_state_conflict",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::BrowserInitFailed(_) => "browser_init_failed",
        }
    }

    /// HTTP status code the framework should answer with for this error.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Result type for relying-party operations
pub type Result<T> = std::result::Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(
            OAuthError::AuthorizationStateNotFound.kind(),
            "authorization_state_not_found"
        );
        assert_eq!(
            OAuthError::ResponseProcessingFailed.kind(),
            "response_processing_failed"
        );
        assert_eq!(
            OAuthError::GetAccessTokenFailed {
                error: serde_json::json!({"code": 190})
            }
            .kind(),
            "get_access_token_failed"
        );
    }

    #[test]
    fn test_error_value_preserved_in_message() {
        let err = OAuthError::GetAccessTokenFailed {
            error: serde_json::json!({"message": "invalid verification code"}),
        };
        assert!(err.to_string().contains("invalid verification code"));

        let err = OAuthError::GetAccessTokenFailedDetailed {
            error: "access_denied".to_string(),
            description: "user cancelled".to_string(),
        };
        assert!(err.to_string().contains("access_denied"));
        assert!(err.to_string().contains("user cancelled"));
    }

    #[test]
    fn test_protocol_errors_map_to_bad_request() {
        assert_eq!(OAuthError::ResponseProcessingFailed.http_status(), 400);
        assert_eq!(OAuthError::AuthorizationStateNotFound.http_status(), 400);
    }
}
