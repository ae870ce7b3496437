// identity-gate-client/src/auth.rs
// ============================================================================
// Module: Credential Lifecycle Manager
// Description: Token acquisition, caching, and single-refresh serialization.
// Purpose: Keep a valid access token available with at most one refresh
//          network call per unauthorized burst.
// Dependencies: reqwest, serde, thiserror
// ============================================================================

//! ## Overview
//! The credential manager owns the current [`Session`]. Callers read the
//! token under a shared lock; when the downstream service rejects it, they
//! request a refresh. Refreshes serialize behind a dedicated mutex: the first
//! caller performs the two-step exchange (discovery document, then client
//! credentials grant) while concurrent callers block on the mutex and then
//! reuse the fresh token without a second network round trip. The refresh
//! mutex is the one deliberate case where a lock is held across a network
//! call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::session::Session;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Well-known path of the OpenID discovery document.
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";
/// Maximum size of token endpoint responses (bytes).
const MAX_TOKEN_RESPONSE_BYTES: u64 = 64 * 1024;
/// Timeout applied to discovery and token exchange requests.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Credential acquisition errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The discovery document could not be fetched or decoded.
    #[error("discovery failed: {0}")]
    Discovery(String),
    /// The token exchange failed or returned an unusable token.
    #[error("token exchange failed: {0}")]
    Exchange(String),
    /// Shared credential state is unavailable.
    #[error("credential state unavailable: {0}")]
    State(String),
}

// ============================================================================
// SECTION: Token Exchanger
// ============================================================================

/// Capability that acquires a fresh session from the authorization server.
pub trait TokenExchanger: Send + Sync {
    /// Performs the full exchange and returns a new session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when discovery or the exchange fails.
    fn exchange(&self) -> Result<Session, AuthError>;
}

/// Discovery document fields consumed by the exchanger.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    /// Token endpoint URL.
    token_endpoint: String,
}

/// Token endpoint response fields consumed by the exchanger.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// Issued access token.
    access_token: String,
    /// Optional refresh token.
    refresh_token: Option<String>,
    /// Token lifetime in seconds.
    expires_in: Option<u64>,
}

/// Two-step exchanger: discovery document, then client credentials grant.
pub struct OidcTokenExchanger {
    /// Blocking HTTP client for exchange calls.
    http: Client,
    /// Base URL of the authorization server.
    auth_base_url: String,
    /// OAuth client identifier.
    client_id: String,
    /// OAuth client secret.
    client_secret: String,
}

impl OidcTokenExchanger {
    /// Builds an exchanger against the given authorization server.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Exchange`] when the HTTP client cannot be built.
    pub fn new(
        auth_base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .map_err(|_| AuthError::Exchange("http client build failed".to_string()))?;
        Ok(Self {
            http,
            auth_base_url: auth_base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Fetches the discovery document to learn the token endpoint.
    fn discover_token_endpoint(&self) -> Result<String, AuthError> {
        let url =
            format!("{}/{DISCOVERY_PATH}", self.auth_base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|_| AuthError::Discovery("discovery request failed".to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Discovery(format!(
                "discovery returned status {}",
                response.status().as_u16()
            )));
        }
        let document: DiscoveryDocument = response
            .json()
            .map_err(|_| AuthError::Discovery("invalid discovery document".to_string()))?;
        if document.token_endpoint.is_empty() {
            return Err(AuthError::Discovery("discovery document missing token endpoint".to_string()));
        }
        Ok(document.token_endpoint)
    }
}

impl TokenExchanger for OidcTokenExchanger {
    fn exchange(&self) -> Result<Session, AuthError> {
        let token_endpoint = self.discover_token_endpoint()?;
        let response = self
            .http
            .post(&token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .map_err(|_| AuthError::Exchange("token request failed".to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "token endpoint returned status {}",
                response.status().as_u16()
            )));
        }
        if response.content_length().is_some_and(|len| len > MAX_TOKEN_RESPONSE_BYTES) {
            return Err(AuthError::Exchange("token response too large".to_string()));
        }
        let token: TokenResponse = response
            .json()
            .map_err(|_| AuthError::Exchange("invalid token response".to_string()))?;
        if token.access_token.is_empty() {
            return Err(AuthError::Exchange("token response missing access token".to_string()));
        }
        Ok(Session::issued(token.access_token, token.refresh_token, token.expires_in))
    }
}

// ============================================================================
// SECTION: Credential Manager
// ============================================================================

/// Shared credential state guarded by the manager.
#[derive(Default)]
struct SessionState {
    /// Current session, absent before the first successful exchange.
    session: Option<Session>,
    /// Monotonic counter incremented on every refresh.
    generation: u64,
}

/// Credential lifecycle manager for downstream API calls.
///
/// # Invariants
/// - At most one refresh network call occurs per unauthorized burst.
/// - The state lock is never held across a network call; only the refresh
///   mutex is.
pub struct CredentialManager {
    /// Exchanger performing the two-step token acquisition.
    exchanger: Arc<dyn TokenExchanger>,
    /// Guarded session state.
    state: RwLock<SessionState>,
    /// Serializes refresh network round trips.
    refresh_gate: Mutex<()>,
}

impl CredentialManager {
    /// Creates a manager around a token exchanger.
    #[must_use]
    pub fn new(exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self {
            exchanger,
            state: RwLock::new(SessionState::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Returns the current token and its generation, acquiring one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no token exists and acquisition fails.
    pub fn token(&self) -> Result<(String, u64), AuthError> {
        {
            let state = self
                .state
                .read()
                .map_err(|_| AuthError::State("credential lock poisoned".to_string()))?;
            if let Some(session) = &state.session
                && !session.is_expired()
            {
                return Ok((session.access_token.clone(), state.generation));
            }
        }
        let observed = {
            let state = self
                .state
                .read()
                .map_err(|_| AuthError::State("credential lock poisoned".to_string()))?;
            state.generation
        };
        let token = self.refresh(observed)?;
        let generation = {
            let state = self
                .state
                .read()
                .map_err(|_| AuthError::State("credential lock poisoned".to_string()))?;
            state.generation
        };
        Ok((token, generation))
    }

    /// Refreshes the session after an unauthorized response.
    ///
    /// `observed_generation` is the generation of the token the caller used.
    /// When another caller already refreshed past it, the current token is
    /// returned without a second network round trip.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the exchange fails.
    pub fn refresh(&self, observed_generation: u64) -> Result<String, AuthError> {
        let _guard = self
            .refresh_gate
            .lock()
            .map_err(|_| AuthError::State("refresh lock poisoned".to_string()))?;
        {
            let state = self
                .state
                .read()
                .map_err(|_| AuthError::State("credential lock poisoned".to_string()))?;
            if state.generation != observed_generation
                && let Some(session) = &state.session
                && !session.is_expired()
            {
                return Ok(session.access_token.clone());
            }
        }
        let session = self.exchanger.exchange()?;
        let token = session.access_token.clone();
        let mut state = self
            .state
            .write()
            .map_err(|_| AuthError::State("credential lock poisoned".to_string()))?;
        state.session = Some(session);
        state.generation = state.generation.wrapping_add(1);
        Ok(token)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        clippy::missing_docs_in_private_items,
        reason = "Test-only panic-based assertions."
    )]

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::AuthError;
    use super::CredentialManager;
    use super::TokenExchanger;
    use crate::session::Session;

    struct CountingExchanger {
        exchanges: AtomicUsize,
    }

    impl CountingExchanger {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                exchanges: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.exchanges.load(Ordering::SeqCst)
        }
    }

    impl TokenExchanger for CountingExchanger {
        fn exchange(&self) -> Result<Session, AuthError> {
            let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Session::issued(format!("token-{n}"), None, Some(3600)))
        }
    }

    struct FailingExchanger;

    impl TokenExchanger for FailingExchanger {
        fn exchange(&self) -> Result<Session, AuthError> {
            Err(AuthError::Exchange("credentials rejected".to_string()))
        }
    }

    #[test]
    fn first_token_read_performs_one_exchange() {
        let exchanger = CountingExchanger::new();
        let manager = CredentialManager::new(Arc::clone(&exchanger) as Arc<dyn TokenExchanger>);
        let (token, generation) = manager.token().expect("token acquisition failed");
        assert_eq!(token, "token-1");
        assert_eq!(generation, 1);
        assert_eq!(exchanger.count(), 1);
    }

    #[test]
    fn cached_token_is_reused_without_exchange() {
        let exchanger = CountingExchanger::new();
        let manager = CredentialManager::new(Arc::clone(&exchanger) as Arc<dyn TokenExchanger>);
        let _ = manager.token().expect("token acquisition failed");
        let _ = manager.token().expect("token acquisition failed");
        assert_eq!(exchanger.count(), 1);
    }

    #[test]
    fn unauthorized_burst_performs_one_refresh() {
        let exchanger = CountingExchanger::new();
        let manager = CredentialManager::new(Arc::clone(&exchanger) as Arc<dyn TokenExchanger>);
        let (_, generation) = manager.token().expect("token acquisition failed");

        // Two callers observed the same rejected generation; only the first
        // refresh performs a network exchange.
        let first = manager.refresh(generation).expect("refresh failed");
        let second = manager.refresh(generation).expect("refresh failed");
        assert_eq!(first, "token-2");
        assert_eq!(second, "token-2");
        assert_eq!(exchanger.count(), 2);
    }

    #[test]
    fn failed_refresh_surfaces_error() {
        let manager = CredentialManager::new(Arc::new(FailingExchanger));
        let result = manager.token();
        assert!(matches!(result, Err(AuthError::Exchange(_))));
    }
}
