//! Outbound HTTP client construction.
//!
//! All traffic to the authorization server (token, JWKS, userinfo, groups)
//! goes through one configured [`Browser`]; nothing builds ad-hoc clients.

use crate::errors::{OAuthError, Result};
use reqwest::redirect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const USER_AGENT: &str = concat!("authgate-oauth/", env!("CARGO_PKG_VERSION"));

/// Settings for the outbound HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Per-request deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// PEM bundle of additional trust roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<PathBuf>,
    /// Skip TLS verification. Testing only.
    #[serde(default)]
    pub danger_accept_invalid_certs: bool,
    /// Redirect hop limit
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    10
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            ca_bundle: None,
            danger_accept_invalid_certs: false,
            max_redirects: default_max_redirects(),
        }
    }
}

/// Shared outbound HTTP client.
///
/// Cheap to clone; every accessor hands out a fresh request builder so
/// callers never share mutable headers.
#[derive(Debug, Clone)]
pub struct Browser {
    client: reqwest::Client,
}

impl Browser {
    /// Build a client from the given settings.
    pub fn build(config: &BrowserConfig) -> Result<Self> {
        let max_redirects = config.max_redirects;
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                return attempt.error("too many redirects");
            }
            let downgraded = attempt.url().scheme() == "http"
                && attempt.previous().iter().any(|u| u.scheme() == "https");
            if downgraded {
                return attempt.error("refusing redirect scheme downgrade");
            }
            attempt.follow()
        });

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .redirect(policy);

        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                OAuthError::BrowserInitFailed(format!(
                    "cannot read CA bundle {}: {e}",
                    path.display()
                ))
            })?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| OAuthError::BrowserInitFailed(format!("invalid CA bundle: {e}")))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if config.danger_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| OAuthError::BrowserInitFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// Fresh GET request builder.
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    /// Fresh POST request builder.
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrowserConfig::default();

        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.max_redirects, 10);
        assert!(!config.danger_accept_invalid_certs);
        assert!(config.ca_bundle.is_none());
    }

    #[test]
    fn test_build_with_defaults() {
        assert!(Browser::build(&BrowserConfig::default()).is_ok());
    }

    #[test]
    fn test_build_rejects_missing_ca_bundle() {
        let config = BrowserConfig {
            ca_bundle: Some(PathBuf::from("/nonexistent/bundle.pem")),
            ..BrowserConfig::default()
        };

        let err = Browser::build(&config).unwrap_err();
        assert_eq!(err.kind(), "browser_init_failed");
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let config: BrowserConfig = serde_json::from_str(r#"{"timeout_secs": 3}"#).unwrap();

        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.max_redirects, 10);
    }
}
