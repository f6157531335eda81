use url::form_urlencoded;
use url::Url;

use crate::auth::pkce::PkcePair;
use crate::auth::session::Credentials;
use crate::error::AuthError;

pub const AUTHORIZE_PATH: &str = "/as/authorization.oauth2";

/// Build the URL the user must visit to grant consent.
///
/// Pure string construction; the only non-determinism is the PKCE pair the
/// caller may have generated.
pub fn build_authorization_url(
    creds: &Credentials,
    state: Option<&str>,
    pkce: Option<&PkcePair>,
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("response_type", "code");
    query.append_pair("client_id", &creds.client_id);
    query.append_pair("redirect_uri", &creds.redirect_uri);
    query.append_pair("scope", &creds.scopes.join(" "));
    if let Some(state) = state {
        query.append_pair("state", state);
    }
    if let Some(pkce) = pkce {
        query.append_pair("code_challenge", &pkce.challenge);
        query.append_pair("code_challenge_method", "S256");
    }

    format!(
        "{}{}?{}",
        creds.auth_base_url.trim_end_matches('/'),
        AUTHORIZE_PATH,
        query.finish()
    )
}

/// Extract the authorization code (and state, if present) from the redirect
/// URL the provider sent the user back to.
///
/// Repeated query keys keep their first value, mirroring form-decoding
/// semantics. A URL that does not parse is a malformed callback.
pub fn parse_callback(callback_url: &str) -> Result<(String, Option<String>), AuthError> {
    let url = Url::parse(callback_url).map_err(|_| AuthError::MissingAuthorizationCode)?;

    let mut code = None;
    let mut state = None;
    let mut error_code = None;
    let mut error_description = None;

    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "code" => &mut code,
            "state" => &mut state,
            "error" => &mut error_code,
            "error_description" => &mut error_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    if let Some(error) = error_code {
        return Err(AuthError::AuthorizationDenied {
            code: error,
            description: error_description.unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    match code {
        Some(code) => Ok((code, state)),
        None => Err(AuthError::MissingAuthorizationCode),
    }
}
