//! End-to-end flows against a mock authorization server.

mod common;

use authgate_oauth::{IdentityProvider, OAuthError, ProviderConfig, RequestContext};
use common::SigningKey;
use serde_json::json;
use std::collections::HashMap;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ISSUER: &str = "https://as.example.com";
const CLIENT_ID: &str = "client-1";

fn oidc_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::generic(
        CLIENT_ID,
        "s3cr3t",
        format!("{}/authorize", server.uri()),
        format!("{}/token", server.uri()),
    )
    .with_jwks_url(format!("{}/jwks", server.uri()))
    .with_issuer(ISSUER)
}

fn request() -> RequestContext {
    RequestContext::new("https://sso.example.com", "contoso")
}

/// Run the initiation leg and hand back the minted `state` and `nonce`.
async fn initiate(engine: &IdentityProvider) -> (String, String) {
    let mut r = request();
    engine.authenticate(&mut r).await.expect("initiate flow");
    assert_eq!(r.response.code, 302);

    let url = Url::parse(r.response.redirect_url.as_deref().unwrap()).unwrap();
    let params: HashMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    (params["state"].clone(), params["nonce"].clone())
}

async fn mount_jwks(server: &MockServer, key: &SigningKey) {
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks.clone()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_happy_oidc_flow() {
    let server = MockServer::start().await;
    let key = SigningKey::generate();
    mount_jwks(&server, &key).await;

    let config = oidc_config(&server).with_identity_token_cookie("id_token");
    let engine = IdentityProvider::new(config).unwrap();
    let (state, nonce) = initiate(&engine).await;

    let now = common::unix_now();
    let id_token = key.sign(&json!({
        "iss": ISSUER,
        "sub": "u1",
        "aud": CLIENT_ID,
        "exp": now + 600,
        "iat": now,
        "nonce": nonce,
        "email": "u1@x",
        "email_verified": true,
        "name": "User One"
    }));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "token_type": "Bearer",
            "id_token": id_token
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut r = request()
        .with_param("code", "abc")
        .with_param("state", state.clone());
    engine.authenticate(&mut r).await.expect("complete flow");

    assert_eq!(r.response.code, 200);
    let claims = r.response.payload.unwrap();
    assert_eq!(claims.sub.as_deref(), Some("u1"));
    assert_eq!(claims.email.as_deref(), Some("u1@x"));
    assert_eq!(claims.name.as_deref(), Some("User One"));

    let cookie = r.response.identity_token_cookie.unwrap();
    assert_eq!(cookie.name, "id_token");
    assert_eq!(cookie.payload, id_token);

    // The flow is terminal: the state is gone.
    assert!(!engine.flow_state_store().exists(&state).await);
}

#[tokio::test]
async fn test_unknown_state_makes_no_outbound_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = ProviderConfig::github(CLIENT_ID, "s3cr3t");
    config.token_url = format!("{}/token", server.uri());
    let engine = IdentityProvider::new(config).unwrap();

    let mut r = request()
        .with_param("code", "abc")
        .with_param("state", "never-issued");
    let err = engine.authenticate(&mut r).await.unwrap_err();

    assert_eq!(err.kind(), "authorization_state_not_found");
    // MockServer verifies the zero-call expectation on drop.
}

#[tokio::test]
async fn test_authorization_server_error_parameter() {
    let server = MockServer::start().await;
    let engine = IdentityProvider::new(oidc_config(&server)).unwrap();

    let mut r = request()
        .with_param("error", "access_denied")
        .with_param("error_description", "user cancelled");
    let err = engine.authenticate(&mut r).await.unwrap_err();

    match err {
        OAuthError::AuthorizationFailedDetailed { error, description } => {
            assert_eq!(error, "access_denied");
            assert_eq!(description, "user cancelled");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_facebook_flow_uses_get_exchange() {
    let server = MockServer::start().await;

    let mut config = ProviderConfig::facebook(CLIENT_ID, "s3cr3t");
    config.token_url = format!("{}/oauth/access_token", server.uri());
    config.userinfo_url = Some(format!("{}/me", server.uri()));
    let engine = IdentityProvider::new(config).unwrap();
    let (state, _nonce) = initiate(&engine).await;

    Mock::given(method("GET"))
        .and(path("/oauth/access_token"))
        .and(query_param("client_id", CLIENT_ID))
        .and(query_param("code", "fb-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "FBTOKEN",
            "token_type": "bearer",
            "expires_in": 5183944
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(query_param("fields", "id,name,email"))
        .and(header("authorization", "Bearer FBTOKEN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "10158000000000000",
            "name": "Pat Example",
            "email": "pat@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut r = request()
        .with_param("code", "fb-code")
        .with_param("state", state);
    engine.authenticate(&mut r).await.expect("facebook flow");

    assert_eq!(r.response.code, 200);
    let claims = r.response.payload.unwrap();
    assert_eq!(claims.sub.as_deref(), Some("10158000000000000"));
    assert_eq!(claims.email.as_deref(), Some("pat@example.com"));

    // The GET exchange must not carry a grant_type.
    let token_request = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|req| req.url.path() == "/oauth/access_token")
        .expect("token request recorded");
    assert!(!token_request
        .url
        .query_pairs()
        .any(|(k, _)| k == "grant_type"));
}

#[tokio::test]
async fn test_implicit_flow_skips_token_exchange() {
    let server = MockServer::start().await;
    let key = SigningKey::generate();
    mount_jwks(&server, &key).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let engine = IdentityProvider::new(oidc_config(&server)).unwrap();
    let (state, nonce) = initiate(&engine).await;

    let now = common::unix_now();
    let id_token = key.sign(&json!({
        "iss": ISSUER,
        "sub": "u2",
        "aud": CLIENT_ID,
        "exp": now + 600,
        "iat": now,
        "nonce": nonce
    }));

    let mut r = request()
        .with_param("access_token", "A")
        .with_param("id_token", id_token)
        .with_param("state", state.clone());
    engine.authenticate(&mut r).await.expect("implicit flow");

    assert_eq!(r.response.code, 200);
    assert_eq!(r.response.payload.unwrap().sub.as_deref(), Some("u2"));
    assert!(!engine.flow_state_store().exists(&state).await);
}

#[tokio::test]
async fn test_nonce_mismatch_is_terminal() {
    let server = MockServer::start().await;
    let key = SigningKey::generate();
    mount_jwks(&server, &key).await;

    let engine = IdentityProvider::new(oidc_config(&server)).unwrap();
    let (state, _nonce) = initiate(&engine).await;

    let now = common::unix_now();
    let id_token = key.sign(&json!({
        "iss": ISSUER,
        "sub": "u1",
        "aud": CLIENT_ID,
        "exp": now + 600,
        "iat": now,
        "nonce": "not-the-registered-nonce"
    }));
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "token_type": "Bearer",
            "id_token": id_token
        })))
        .mount(&server)
        .await;

    let mut r = request()
        .with_param("code", "abc")
        .with_param("state", state.clone());
    let err = engine.authenticate(&mut r).await.unwrap_err();

    assert_eq!(err.kind(), "validate_access_token_failed");
    // Verification failure removes the flow state.
    assert!(!engine.flow_state_store().exists(&state).await);
}

#[tokio::test]
async fn test_expired_id_token_is_rejected() {
    let server = MockServer::start().await;
    let key = SigningKey::generate();
    mount_jwks(&server, &key).await;

    let engine = IdentityProvider::new(oidc_config(&server)).unwrap();
    let (state, nonce) = initiate(&engine).await;

    let now = common::unix_now();
    let id_token = key.sign(&json!({
        "iss": ISSUER,
        "sub": "u1",
        "aud": CLIENT_ID,
        "exp": now - 600,
        "iat": now - 1200,
        "nonce": nonce
    }));
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A",
            "token_type": "Bearer",
            "id_token": id_token
        })))
        .mount(&server)
        .await;

    let mut r = request()
        .with_param("code", "abc")
        .with_param("state", state);
    let err = engine.authenticate(&mut r).await.unwrap_err();

    assert_eq!(err.kind(), "validate_access_token_failed");
}

#[tokio::test]
async fn test_github_flow_normalizes_vendor_payloads() {
    let server = MockServer::start().await;

    let mut config = ProviderConfig::github(CLIENT_ID, "s3cr3t");
    config.token_url = format!("{}/login/oauth/access_token", server.uri());
    config.userinfo_url = Some(format!("{}/user", server.uri()));
    let engine = IdentityProvider::new(config).unwrap();
    let (state, _nonce) = initiate(&engine).await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_token",
            "scope": "read:user,user:email,read:org",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": null,
            "avatar_url": "https://avatars.example.com/u/583231"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"email": "octo@example.com", "primary": true, "verified": true}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"login": "contoso"},
            {"login": "fabrikam"}
        ])))
        .mount(&server)
        .await;

    let mut r = request()
        .with_param("code", "gh-code")
        .with_param("state", state);
    engine.authenticate(&mut r).await.expect("github flow");

    let claims = r.response.payload.unwrap();
    assert_eq!(claims.sub.as_deref(), Some("583231"));
    assert_eq!(claims.preferred_username.as_deref(), Some("octocat"));
    assert_eq!(claims.email.as_deref(), Some("octo@example.com"));
    assert_eq!(claims.groups, vec!["contoso", "fabrikam"]);
}

#[tokio::test]
async fn test_concurrent_callbacks_produce_one_winner() {
    let server = MockServer::start().await;

    let mut config = ProviderConfig::github(CLIENT_ID, "s3cr3t");
    config.token_url = format!("{}/login/oauth/access_token", server.uri());
    config.userinfo_url = Some(format!("{}/user", server.uri()));
    let engine = std::sync::Arc::new(IdentityProvider::new(config).unwrap());
    let (state, _nonce) = initiate(&engine).await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_token",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7, "login": "racer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let engine = engine.clone();
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let mut r = request()
                .with_param("code", "gh-code")
                .with_param("state", state);
            engine.authenticate(&mut r).await
        }));
    }

    let mut successes = 0;
    let mut not_found = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => successes += 1,
            Err(e) if e.kind() == "authorization_state_not_found" => not_found += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(not_found, 1);
}

#[tokio::test]
async fn test_group_fetch_failure_is_not_fatal() {
    let server = MockServer::start().await;

    let mut config = ProviderConfig::github(CLIENT_ID, "s3cr3t");
    config.token_url = format!("{}/login/oauth/access_token", server.uri());
    config.userinfo_url = Some(format!("{}/user", server.uri()));
    let engine = IdentityProvider::new(config).unwrap();
    let (state, _nonce) = initiate(&engine).await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_token",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "login": "solo"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/orgs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut r = request()
        .with_param("code", "gh-code")
        .with_param("state", state);
    engine.authenticate(&mut r).await.expect("flow succeeds without groups");

    let claims = r.response.payload.unwrap();
    assert_eq!(claims.sub.as_deref(), Some("1"));
    assert!(claims.groups.is_empty());
}
