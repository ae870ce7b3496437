// identity-gate-client/src/session.rs
// ============================================================================
// Module: Session State
// Description: In-memory access credential state for the downstream API.
// Purpose: Track the current token and its expiry between refreshes.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A session is created on first successful authentication, mutated in place
//! on each refresh, and discarded at process exit. There is no durable store;
//! credential persistence across restarts is out of scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::SystemTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Expiry leeway so a token is refreshed slightly before its deadline.
const EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Session
// ============================================================================

/// Current access credential for the downstream API.
///
/// # Invariants
/// - `access_token` is never empty while the session is considered valid.
#[derive(Debug, Clone)]
pub struct Session {
    /// Current access token.
    pub access_token: String,
    /// Optional refresh token returned by the token endpoint.
    pub refresh_token: Option<String>,
    /// Expiry deadline when the token endpoint reported one.
    pub expires_at: Option<SystemTime>,
}

impl Session {
    /// Builds a session from an issued token and its lifetime in seconds.
    ///
    /// A lifetime too large to represent as a deadline is treated as no
    /// deadline; the token endpoint input is untrusted and must not be able
    /// to panic the refresh path.
    #[must_use]
    pub fn issued(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
    ) -> Self {
        let expires_at = expires_in_secs
            .and_then(|secs| SystemTime::now().checked_add(Duration::from_secs(secs)));
        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Returns true when the token is missing, empty, or past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expires_at.is_some_and(|deadline| {
            SystemTime::now()
                .checked_add(EXPIRY_LEEWAY)
                .is_none_or(|cutoff| cutoff >= deadline)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
