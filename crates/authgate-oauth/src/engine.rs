//! The authentication engine.
//!
//! One [`IdentityProvider`] serves one configured upstream authorization
//! server. [`IdentityProvider::authenticate`] is the single entry point: it
//! classifies the inbound request, either minting a fresh flow and answering
//! with a redirect, or processing an authorization-server callback into a
//! normalized claim map.

use crate::browser::Browser;
use crate::config::ProviderConfig;
use crate::drivers::{self, Driver};
use crate::errors::{OAuthError, Result};
use crate::exchange;
use crate::oidc::{JwksVerifier, TokenVerifier, VerifyError};
use crate::state::FlowStateStore;
use crate::types::{
    AccessTokenEnvelope, ClaimMap, IdentityTokenCookie, RequestContext,
};
use rand::RngCore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// OAuth 2.0 / OIDC relying party for one provider.
pub struct IdentityProvider {
    config: Arc<ProviderConfig>,
    store: FlowStateStore,
    browser: Browser,
    driver: &'static dyn Driver,
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl IdentityProvider {
    /// Build an engine from a validated configuration.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let browser = Browser::build(&config.browser)?;
        let driver = drivers::resolve(config.driver);
        let verifier: Option<Arc<dyn TokenVerifier>> = match (&config.jwks_url, &config.issuer) {
            (Some(jwks_url), Some(issuer)) => Some(Arc::new(JwksVerifier::new(
                browser.clone(),
                jwks_url.clone(),
                issuer.clone(),
                config.client_id.clone(),
            ))),
            _ => None,
        };
        Ok(Self {
            config: Arc::new(config),
            store: FlowStateStore::default(),
            browser,
            driver,
            verifier,
        })
    }

    /// Replace the token-verification capability.
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// The flow state store backing this engine.
    pub fn flow_state_store(&self) -> &FlowStateStore {
        &self.store
    }

    /// Start the background flow sweeper for this engine.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.store.spawn_sweeper()
    }

    /// Drive one inbound request through the flow state machine.
    ///
    /// On success the response carries either a redirect (flow initiation) or
    /// the claim payload (callback completion). Errors leave the response at
    /// 400; the framework maps the error kind onto the wire.
    pub async fn authenticate(&self, r: &mut RequestContext) -> Result<()> {
        r.response.code = 400;

        let access_token = r.param("access_token").map(str::to_string);
        let id_token = r.param("id_token").map(str::to_string);
        let code = r.param("code").map(str::to_string);
        let state = r.param("state").map(str::to_string);
        let error = r.param("error").map(str::to_string);

        if state.is_some() || error.is_some() || code.is_some() || access_token.is_some() {
            debug!(
                session_id = %r.session_id,
                request_id = %r.request_id,
                params = ?r.query.keys().collect::<Vec<_>>(),
                "received authorization server response"
            );

            if let Some(error) = error {
                if let Some(description) = r.param("error_description") {
                    return Err(OAuthError::AuthorizationFailedDetailed {
                        error,
                        description: description.to_string(),
                    });
                }
                return Err(OAuthError::AuthorizationFailed { error });
            }

            if let (Some(code), Some(state)) = (&code, &state) {
                return self.handle_code_callback(r, state, code).await;
            }

            if let (Some(id_token), Some(access_token)) = (&id_token, &access_token) {
                return self
                    .handle_implicit_callback(r, state.as_deref(), id_token, access_token)
                    .await;
            }

            return Err(OAuthError::ResponseProcessingFailed);
        }

        self.initiate(r).await
    }

    /// Authorization Code callback: exchange, verify, claims, consume.
    async fn handle_code_callback(
        &self,
        r: &mut RequestContext,
        state: &str,
        code: &str,
    ) -> Result<()> {
        if !self.store.exists(state).await {
            return Err(OAuthError::AuthorizationStateNotFound);
        }
        self.store.add_code(state, code).await?;

        debug!(
            session_id = %r.session_id,
            request_id = %r.request_id,
            state,
            "received authorization code from the authorization server"
        );

        let redirect_uri = self.callback_redirect_uri(r);
        let envelope = exchange::fetch_access_token(
            &self.browser,
            &self.config,
            self.driver.token_request_style(),
            &redirect_uri,
            state,
            code,
        )
        .await
        .map_err(|e| {
            debug!(
                session_id = %r.session_id,
                request_id = %r.request_id,
                error = %e,
                "failed fetching access token from the authorization server"
            );
            e
        })?;

        let mut claims = if self.driver.uses_id_token() {
            self.claims_from_id_token(r, state, &envelope).await?
        } else {
            let claims = self
                .driver
                .fetch_claims(&self.browser, &self.config, &envelope)
                .await?;
            if !claims.has_subject() {
                return Err(OAuthError::FetchClaimsFailed(
                    "provider payload yields no stable subject".to_string(),
                ));
            }
            claims
        };

        self.merge_groups(r, &envelope, &mut claims).await;
        self.attach_identity_cookie(r, envelope.id_token.clone());

        self.store
            .consume(state)
            .await
            .ok_or(OAuthError::AuthorizationStateNotFound)?;

        debug!(
            session_id = %r.session_id,
            request_id = %r.request_id,
            sub = claims.sub.as_deref().unwrap_or_default(),
            "decoded claims from the authorization server response"
        );
        r.response.payload = Some(claims);
        r.response.code = 200;
        Ok(())
    }

    /// Implicit/Hybrid callback: no exchange, the tokens arrive inline.
    async fn handle_implicit_callback(
        &self,
        r: &mut RequestContext,
        state: Option<&str>,
        id_token: &str,
        access_token: &str,
    ) -> Result<()> {
        let expected_nonce = if self.config.disable_nonce {
            None
        } else {
            let state = state.ok_or(OAuthError::AuthorizationStateNotFound)?;
            self.store
                .nonce_for(state)
                .await
                .ok_or(OAuthError::AuthorizationStateNotFound)?
        };

        let verifier = self
            .verifier
            .as_ref()
            .ok_or(OAuthError::ValidateAccessTokenFailed(
                VerifyError::NotConfigured,
            ))?;
        let token_claims = match verifier
            .verify(id_token, expected_nonce.as_deref())
            .await
        {
            Ok(claims) => claims,
            Err(e) => {
                if let Some(state) = state {
                    let _ = self.store.consume(state).await;
                }
                return Err(OAuthError::ValidateAccessTokenFailed(e));
            }
        };

        let envelope = AccessTokenEnvelope {
            access_token: Some(access_token.to_string()),
            id_token: Some(id_token.to_string()),
            ..AccessTokenEnvelope::default()
        };
        let claims = ClaimMap::from(token_claims);
        self.attach_identity_cookie(r, envelope.id_token.clone());

        if let Some(state) = state {
            let consumed = self.store.consume(state).await;
            if consumed.is_none() && !self.config.disable_nonce {
                return Err(OAuthError::AuthorizationStateNotFound);
            }
        }

        debug!(
            session_id = %r.session_id,
            request_id = %r.request_id,
            sub = claims.sub.as_deref().unwrap_or_default(),
            "decoded claims from inline tokens"
        );
        r.response.payload = Some(claims);
        r.response.code = 200;
        Ok(())
    }

    /// Verified-ID-token path: claims come from C5, userinfo only enriches.
    async fn claims_from_id_token(
        &self,
        r: &RequestContext,
        state: &str,
        envelope: &AccessTokenEnvelope,
    ) -> Result<ClaimMap> {
        let expected_nonce = if self.config.disable_nonce {
            None
        } else {
            self.store
                .nonce_for(state)
                .await
                .ok_or(OAuthError::AuthorizationStateNotFound)?
        };

        let id_token = envelope.id_token.as_deref().ok_or_else(|| {
            OAuthError::AuthorizationServerResponseFieldNotFound {
                field: "id_token".to_string(),
            }
        })?;
        let verifier = self
            .verifier
            .as_ref()
            .ok_or(OAuthError::ValidateAccessTokenFailed(
                VerifyError::NotConfigured,
            ))?;

        let token_claims = match verifier.verify(id_token, expected_nonce.as_deref()).await {
            Ok(claims) => claims,
            Err(e) => {
                // Verification failure is terminal for the flow.
                let _ = self.store.consume(state).await;
                return Err(OAuthError::ValidateAccessTokenFailed(e));
            }
        };
        let mut claims = ClaimMap::from(token_claims);

        match self
            .driver
            .fetch_claims(&self.browser, &self.config, envelope)
            .await
        {
            Ok(userinfo) => claims.merge_missing(userinfo),
            Err(e) => {
                debug!(
                    session_id = %r.session_id,
                    request_id = %r.request_id,
                    error = %e,
                    "failed fetching user info"
                );
            }
        }

        Ok(claims)
    }

    /// Group fetch is best-effort; failure leaves whatever the claims already
    /// carry.
    async fn merge_groups(
        &self,
        r: &RequestContext,
        envelope: &AccessTokenEnvelope,
        claims: &mut ClaimMap,
    ) {
        match self
            .driver
            .fetch_groups(&self.browser, &self.config, envelope)
            .await
        {
            Ok(groups) if !groups.is_empty() => {
                let mut merged = claims.groups.clone();
                merged.extend(groups);
                claims.set_groups(merged);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(
                    session_id = %r.session_id,
                    request_id = %r.request_id,
                    error = %e,
                    "failed fetching user groups"
                );
            }
        }
    }

    fn attach_identity_cookie(&self, r: &mut RequestContext, id_token: Option<String>) {
        if !self.config.identity_token_cookie_enabled {
            return;
        }
        if let Some(payload) = id_token {
            r.response.identity_token_cookie = Some(IdentityTokenCookie {
                name: self.config.cookie_name().to_string(),
                payload,
            });
        }
    }

    /// Mint a fresh flow and answer with the authorization redirect.
    async fn initiate(&self, r: &mut RequestContext) -> Result<()> {
        let state = Uuid::new_v4().to_string();
        let nonce = if self.config.disable_nonce {
            None
        } else {
            Some(random_nonce())
        };

        let mut url = Url::parse(&self.config.authorization_url)
            .map_err(|e| OAuthError::ConfigInvalid(format!("authorization_url: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            // CSRF protection
            pairs.append_pair("state", &state);
            if let Some(nonce) = &nonce {
                // Replay protection
                pairs.append_pair("nonce", nonce);
            }
            if !self.config.disable_scope {
                let mut scopes = self.config.scopes.clone();
                if let Some(additional) = r.param("additional_scopes") {
                    scopes.extend(additional.split_whitespace().map(str::to_string));
                }
                pairs.append_pair("scope", &scopes.join(" "));
            }
            pairs.append_pair("redirect_uri", &self.callback_redirect_uri(r));
            if !self.config.disable_response_type {
                pairs.append_pair("response_type", &self.config.response_type.join(" "));
            }
            if let Some(login_hint) = r.param("login_hint") {
                pairs.append_pair("login_hint", login_hint);
            }
            pairs.append_pair("client_id", &self.config.client_id);
        }

        self.store.add(&state, nonce).await?;

        r.response.redirect_url = Some(url.to_string());
        r.response.code = 302;
        debug!(
            session_id = %r.session_id,
            request_id = %r.request_id,
            redirect_url = %url,
            "redirecting to the authorization endpoint"
        );
        Ok(())
    }

    fn callback_redirect_uri(&self, r: &RequestContext) -> String {
        let suffix = if self.config.js_callback_enabled {
            "authorization-code-js-callback"
        } else {
            "authorization-code-callback"
        };
        format!("{}/{}", r.endpoint_path(), suffix)
    }
}

fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
