use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::authorize::build_authorization_url;
use crate::auth::pkce::PkcePair;
use crate::auth::store::TokenStore;
use crate::auth::token::{self, TokenSet};
use crate::error::AuthError;

/// Minutes before the real expiry at which a refresh kicks in, so a token
/// cannot lapse mid-flight of a dependent API call.
pub const REFRESH_BUFFER_MINUTES: i64 = 5;

/// Client identity for one session. Immutable for the session's lifetime.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub use_pkce: bool,
    pub auth_base_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("use_pkce", &self.use_pkce)
            .field("auth_base_url", &self.auth_base_url)
            .finish()
    }
}

/// Time source for expiry checks, injected so buffer-boundary behavior is
/// testable without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Default)]
struct SessionState {
    tokens: TokenSet,
    // Single-slot PKCE verifier; written by authorization_url, consumed by
    // exchange_code.
    verifier: Option<String>,
}

/// Owns the live token state and decides when a token is usable, must be
/// refreshed, or requires a new authorization flow.
///
/// All methods take `&self`; the state sits behind a mutex that is held
/// across the refresh request, so concurrent callers that hit the expiry
/// buffer wait for the first refresh instead of racing the token endpoint.
pub struct Session {
    credentials: Credentials,
    http: reqwest::Client,
    store: TokenStore,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(credentials: Credentials, store: TokenStore) -> Self {
        Self::with_clock(credentials, store, Arc::new(SystemClock))
    }

    pub fn with_clock(credentials: Credentials, store: TokenStore, clock: Arc<dyn Clock>) -> Self {
        let tokens = store.load().unwrap_or_default();
        if !tokens.is_empty() {
            debug!(path = %store.path().display(), "loaded persisted tokens");
        }
        Self {
            credentials,
            http: reqwest::Client::new(),
            store,
            clock,
            state: Mutex::new(SessionState {
                tokens,
                verifier: None,
            }),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Build the consent URL for a fresh authorization attempt.
    ///
    /// Generates a new PKCE pair each call (when PKCE is enabled) and holds
    /// the verifier until `exchange_code` consumes it.
    pub async fn authorization_url(&self, state: Option<&str>) -> String {
        let pkce = self.credentials.use_pkce.then(PkcePair::generate);
        let url = build_authorization_url(&self.credentials, state, pkce.as_ref());
        self.state.lock().await.verifier = pkce.map(|p| p.verifier);
        url
    }

    /// Trade an authorization code for tokens, persist them, and adopt them
    /// as the session's state.
    pub async fn exchange_code(&self, code: &str) -> Result<(), AuthError> {
        let mut state = self.state.lock().await;
        let verifier = state.verifier.take();
        let tokens = token::exchange_code(
            &self.http,
            &self.credentials,
            code,
            verifier.as_deref(),
            self.clock.now(),
        )
        .await?;
        info!(expires_at = ?tokens.expires_at, "token exchange successful");
        self.install(&mut state, tokens);
        Ok(())
    }

    /// The single entry point callers use before an authenticated request.
    ///
    /// Inside the refresh buffer this transparently refreshes; with no
    /// stored expiry the current token is returned as-is with a warning.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut state = self.state.lock().await;

        let Some(access) = state.tokens.access_token.clone() else {
            debug!("no access token available");
            return Err(AuthError::NoAccessToken);
        };

        let Some(expires_at) = state.tokens.expires_at else {
            warn!("stored token has no expiry; using it unverified");
            return Ok(access);
        };

        let now = self.clock.now();
        if now < expires_at - Duration::minutes(REFRESH_BUFFER_MINUTES) {
            return Ok(access);
        }

        info!(
            expires_at = %expires_at.to_rfc3339(),
            "access token inside refresh buffer, refreshing"
        );

        let Some(refresh_token) = state.tokens.refresh_token.clone() else {
            warn!("token expired and no refresh token available");
            return Err(AuthError::TokenExpiredNoRefresh);
        };

        match token::refresh(&self.http, &self.credentials, &refresh_token, self.clock.now()).await
        {
            Ok(fresh) => {
                // An omitted refresh token means "keep using the current one".
                let fresh = TokenSet {
                    refresh_token: fresh.refresh_token.or(Some(refresh_token)),
                    ..fresh
                };
                let renewed = fresh.access_token.clone().unwrap_or(access);
                info!(expires_at = ?fresh.expires_at, "token refresh successful");
                self.install(&mut state, fresh);
                Ok(renewed)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed; re-authentication required");
                Err(AuthError::TokenExpiredRefreshFailed(Box::new(e)))
            }
        }
    }

    /// True iff `access_token` would currently succeed. Never propagates.
    pub async fn is_authenticated(&self) -> bool {
        match self.access_token().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "authentication check failed");
                false
            }
        }
    }

    /// Drop all in-memory token and PKCE state and delete the persisted
    /// record. Calling with nothing stored is a no-op.
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        state.tokens = TokenSet::default();
        state.verifier = None;
        if let Err(e) = self.store.clear() {
            warn!(path = %self.store.path().display(), error = %e, "failed to remove persisted tokens");
        }
    }

    pub async fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.tokens.expires_at
    }

    // Losing the local cache only costs a later re-authentication, so a
    // failed write must not fail an exchange that already succeeded remotely.
    fn install(&self, state: &mut SessionState, tokens: TokenSet) {
        if let Err(e) = self.store.save(&tokens) {
            warn!(path = %self.store.path().display(), error = %e, "failed to persist tokens; keeping in-memory state");
        }
        state.tokens = tokens;
    }
}
