/// Failures of the OAuth2 token lifecycle.
///
/// Variants that require a fresh authorization flow (rather than a retry)
/// report `true` from [`AuthError::requires_reauth`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization failed: {code} - {description}")]
    AuthorizationDenied { code: String, description: String },

    #[error("No authorization code found in callback URL")]
    MissingAuthorizationCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No access token available. Please authenticate first.")]
    NoAccessToken,

    #[error("Token expired and no refresh token available. Please re-authenticate.")]
    TokenExpiredNoRefresh,

    #[error("Token expired and refresh failed. Please re-authenticate.")]
    TokenExpiredRefreshFailed(#[source] Box<AuthError>),
}

impl AuthError {
    /// True when recovery needs a full re-authorization instead of a retry.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            AuthError::NoAccessToken
                | AuthError::TokenExpiredNoRefresh
                | AuthError::TokenExpiredRefreshFailed(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication rejected by the API (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Vehicle not found or not accessible")]
    VehicleNotFound,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a long-running caller should stop and ask for a new
    /// authorization flow, as opposed to retrying on the next cycle.
    pub fn requires_reauth(&self) -> bool {
        match self {
            Error::Auth(e) => e.requires_reauth(),
            Error::Unauthorized { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_authorization_denied() {
        let err = AuthError::AuthorizationDenied {
            code: "access_denied".into(),
            description: "User cancelled".into(),
        };
        assert_eq!(
            err.to_string(),
            "Authorization failed: access_denied - User cancelled"
        );
    }

    #[test]
    fn display_missing_code() {
        assert_eq!(
            AuthError::MissingAuthorizationCode.to_string(),
            "No authorization code found in callback URL"
        );
    }

    #[test]
    fn display_exchange_and_refresh_are_distinct() {
        let exchange = AuthError::TokenExchangeFailed("status 400: bad code".into());
        let refresh = AuthError::TokenRefreshFailed("status 400: bad token".into());
        assert!(exchange.to_string().starts_with("Token exchange failed"));
        assert!(refresh.to_string().starts_with("Token refresh failed"));
    }

    #[test]
    fn expired_refresh_failed_keeps_source() {
        let cause = AuthError::TokenRefreshFailed("status 500: ".into());
        let err = AuthError::TokenExpiredRefreshFailed(Box::new(cause));
        let source = std::error::Error::source(&err).expect("should carry a source");
        assert!(source.to_string().contains("status 500"));
    }

    #[test]
    fn reauth_required_variants() {
        assert!(AuthError::NoAccessToken.requires_reauth());
        assert!(AuthError::TokenExpiredNoRefresh.requires_reauth());
        assert!(AuthError::TokenExpiredRefreshFailed(Box::new(
            AuthError::TokenRefreshFailed("x".into())
        ))
        .requires_reauth());

        assert!(!AuthError::MissingAuthorizationCode.requires_reauth());
        assert!(!AuthError::TokenExchangeFailed("x".into()).requires_reauth());
        assert!(!AuthError::TokenRefreshFailed("x".into()).requires_reauth());
    }

    #[test]
    fn app_error_reauth_mapping() {
        assert!(Error::Auth(AuthError::NoAccessToken).requires_reauth());
        assert!(Error::Unauthorized { status: 401 }.requires_reauth());
        assert!(!Error::RateLimited.requires_reauth());
        assert!(!Error::Transport("connection reset".into()).requires_reauth());
        assert!(!Error::Api {
            status: 500,
            message: "oops".into()
        }
        .requires_reauth());
    }

    #[test]
    fn auth_error_converts_into_app_error() {
        let err: Error = AuthError::NoAccessToken.into();
        assert!(matches!(err, Error::Auth(AuthError::NoAccessToken)));
    }
}
