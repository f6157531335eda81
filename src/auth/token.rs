use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::session::Credentials;
use crate::error::AuthError;

pub const TOKEN_PATH: &str = "/as/token.oauth2";

/// Applied when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// A hung token endpoint must not stall callers past this.
const TOKEN_ENDPOINT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// The session's central token state.
///
/// All fields may be absent. An access token with no expiry is trusted
/// as-is (degraded mode); the session logs a warning when it hands one out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.expires_at.is_none()
    }
}

/// Raw token-endpoint response, validated once at the parse boundary.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        TokenSet {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            expires_at: Some(now + Duration::seconds(expires_in)),
        }
    }
}

fn token_endpoint(auth_base_url: &str) -> String {
    format!("{}{}", auth_base_url.trim_end_matches('/'), TOKEN_PATH)
}

/// Trade an authorization code for a token set.
///
/// Authenticates with HTTP Basic auth from the client id/secret; the PKCE
/// verifier rides along in the form body when the flow used one.
pub async fn exchange_code(
    http: &reqwest::Client,
    creds: &Credentials,
    code: &str,
    verifier: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TokenSet, AuthError> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", creds.redirect_uri.as_str()),
    ];
    if let Some(verifier) = verifier {
        form.push(("code_verifier", verifier));
    }

    let resp = http
        .post(token_endpoint(&creds.auth_base_url))
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .form(&form)
        .timeout(TOKEN_ENDPOINT_TIMEOUT)
        .send()
        .await
        .map_err(|e| AuthError::TokenExchangeFailed(format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::TokenExchangeFailed(format!(
            "status {status}: {body}"
        )));
    }

    let parsed: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::TokenExchangeFailed(format!("invalid token response: {e}")))?;

    Ok(parsed.into_token_set(now))
}

/// Obtain a fresh token set from a refresh token.
///
/// The returned set's `refresh_token` is `None` when the provider omitted
/// it, which means "keep using the current one"; the session applies that
/// rule, not this function.
pub async fn refresh(
    http: &reqwest::Client,
    creds: &Credentials,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<TokenSet, AuthError> {
    let resp = http
        .post(token_endpoint(&creds.auth_base_url))
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .timeout(TOKEN_ENDPOINT_TIMEOUT)
        .send()
        .await
        .map_err(|e| AuthError::TokenRefreshFailed(format!("request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(AuthError::TokenRefreshFailed(format!(
            "status {status}: {body}"
        )));
    }

    let parsed: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::TokenRefreshFailed(format!("invalid token response: {e}")))?;

    Ok(parsed.into_token_set(now))
}
