//! JWKS fetching and caching.

use crate::browser::Browser;
use crate::oidc::types::{JwksKey, JwksKeySet};
use crate::oidc::verifier::VerifyError;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Minimum spacing between refreshes triggered by the same unknown `kid`.
pub const KID_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

struct CacheInner {
    keys: JwksKeySet,
    fetched: bool,
    refresh_attempts: HashMap<String, Instant>,
}

/// Process-wide JWKS cache.
///
/// Keys are fetched lazily and re-fetched when a token arrives with an
/// unknown `kid` (key rotation), throttled to once per
/// [`KID_REFRESH_INTERVAL`] per `kid` so a stream of forged tokens cannot
/// hammer the JWKS endpoint.
pub struct JwksCache {
    browser: Browser,
    jwks_url: String,
    inner: RwLock<CacheInner>,
}

impl JwksCache {
    /// Create a cache backed by the given endpoint.
    pub fn new(browser: Browser, jwks_url: String) -> Self {
        Self {
            browser,
            jwks_url,
            inner: RwLock::new(CacheInner {
                keys: JwksKeySet::default(),
                fetched: false,
                refresh_attempts: HashMap::new(),
            }),
        }
    }

    /// Resolve a key by `kid`, refreshing the set if it is unknown.
    pub async fn key_for(&self, kid: &str) -> Result<JwksKey, VerifyError> {
        {
            let inner = self.inner.read().await;
            if let Some(key) = inner.keys.find_key(kid) {
                return Ok(key.clone());
            }
            if inner.fetched && !self.may_refresh(&inner, kid) {
                return Err(VerifyError::KeyNotFound {
                    kid: kid.to_string(),
                });
            }
        }

        let mut inner = self.inner.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(key) = inner.keys.find_key(kid) {
            return Ok(key.clone());
        }
        if inner.fetched && !self.may_refresh(&inner, kid) {
            return Err(VerifyError::KeyNotFound {
                kid: kid.to_string(),
            });
        }

        inner
            .refresh_attempts
            .insert(kid.to_string(), Instant::now());
        let keys = self.fetch().await?;
        debug!(key_count = keys.keys.len(), "refreshed JWKS key set");
        inner.keys = keys;
        inner.fetched = true;

        inner
            .keys
            .find_key(kid)
            .cloned()
            .ok_or_else(|| VerifyError::KeyNotFound {
                kid: kid.to_string(),
            })
    }

    fn may_refresh(&self, inner: &CacheInner, kid: &str) -> bool {
        inner
            .refresh_attempts
            .get(kid)
            .map(|at| at.elapsed() >= KID_REFRESH_INTERVAL)
            .unwrap_or(true)
    }

    async fn fetch(&self) -> Result<JwksKeySet, VerifyError> {
        let response = self
            .browser
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VerifyError::JwksFetchFailed(e.to_string()))?;
        response
            .json::<JwksKeySet>()
            .await
            .map_err(|e| VerifyError::JwksFetchFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::BrowserConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn browser() -> Browser {
        Browser::build(&BrowserConfig::default()).unwrap()
    }

    fn jwks_body() -> serde_json::Value {
        json!({
            "keys": [
                {"kty": "RSA", "kid": "k1", "use": "sig", "alg": "RS256", "n": "abc", "e": "AQAB"}
            ]
        })
    }

    #[tokio::test]
    async fn test_key_resolved_after_lazy_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(browser(), format!("{}/jwks", server.uri()));

        let key = cache.key_for("k1").await.unwrap();
        assert_eq!(key.kty, "RSA");

        // Second lookup is served from the cache; the mock allows one call.
        cache.key_for("k1").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_kid_refresh_is_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(browser(), format!("{}/jwks", server.uri()));

        let err = cache.key_for("rotated").await.unwrap_err();
        assert!(matches!(err, VerifyError::KeyNotFound { .. }));

        // Immediate retry with the same unknown kid must not refetch.
        let err = cache.key_for("rotated").await.unwrap_err();
        assert!(matches!(err, VerifyError::KeyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = JwksCache::new(browser(), format!("{}/jwks", server.uri()));

        let err = cache.key_for("k1").await.unwrap_err();
        assert!(matches!(err, VerifyError::JwksFetchFailed(_)));
    }
}
