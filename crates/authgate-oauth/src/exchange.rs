//! Authorization-code exchange against the token endpoint.

use crate::browser::Browser;
use crate::config::ProviderConfig;
use crate::errors::{OAuthError, Result};
use crate::types::AccessTokenEnvelope;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

/// Wire shape of the token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRequestStyle {
    /// `POST` with a form-urlencoded body (the OAuth 2.0 default)
    PostForm,
    /// `GET` with query parameters and no `grant_type` (Facebook)
    GetQuery,
}

/// Exchange an authorization code for the token envelope.
///
/// The request shape comes from the driver; the response contract (error
/// envelope parsing, required-field checks) is shared by all drivers.
/// Failures are fatal to the flow; authorization codes are single-use, so
/// there is nothing to retry.
pub async fn fetch_access_token(
    browser: &Browser,
    config: &ProviderConfig,
    style: TokenRequestStyle,
    redirect_uri: &str,
    state: &str,
    code: &str,
) -> Result<AccessTokenEnvelope> {
    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
    ];
    if style == TokenRequestStyle::PostForm {
        if !config.disable_pass_grant_type {
            params.push(("grant_type", "authorization_code"));
        }
        params.push(("state", state));
    }
    params.push(("code", code));
    params.push(("redirect_uri", redirect_uri));

    let mut request = match style {
        TokenRequestStyle::PostForm => {
            let mut body = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &params {
                body.append_pair(k, v);
            }
            let body = body.finish();
            browser
                .post(&config.token_url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(CONTENT_LENGTH, body.len())
                .body(body)
        }
        TokenRequestStyle::GetQuery => browser.get(&config.token_url).query(&params),
    };
    if config.enable_accept_header {
        request = request.header(ACCEPT, "application/json");
    }

    let response = request
        .send()
        .await
        .map_err(|e| OAuthError::FetchAccessTokenFailed(e.to_string()))?;
    let body = response
        .bytes()
        .await
        .map_err(|e| OAuthError::FetchAccessTokenFailed(e.to_string()))?;

    debug!(
        body_len = body.len(),
        redirect_uri, "token endpoint response received"
    );

    let data: Value = serde_json::from_slice(&body)
        .map_err(|e| OAuthError::FetchAccessTokenFailed(format!("response is not JSON: {e}")))?;
    let object = data.as_object().ok_or_else(|| {
        OAuthError::FetchAccessTokenFailed("response is not a JSON object".to_string())
    })?;

    if let Some(error) = object.get("error") {
        if let Some(description) = object.get("error_description").and_then(Value::as_str) {
            return Err(OAuthError::GetAccessTokenFailedDetailed {
                error: stringify(error),
                description: description.to_string(),
            });
        }
        return Err(OAuthError::GetAccessTokenFailed {
            error: error.clone(),
        });
    }

    for field in &config.required_token_fields {
        if !object.contains_key(field) {
            return Err(OAuthError::AuthorizationServerResponseFieldNotFound {
                field: field.clone(),
            });
        }
    }

    let envelope: AccessTokenEnvelope = serde_json::from_value(data)
        .map_err(|e| OAuthError::FetchAccessTokenFailed(format!("unexpected shape: {e}")))?;

    debug!(
        has_id_token = envelope.id_token.is_some(),
        "token endpoint response decoded"
    );

    Ok(envelope)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
