// identity-gate-mcp/src/auth.rs
// ============================================================================
// Module: Transport Authentication
// Description: Shared-secret enforcement for protected HTTP routes.
// Purpose: Provide strict, fail-closed auth for the gateway's HTTP surface.
// Dependencies: subtle
// ============================================================================

//! ## Overview
//! Protected HTTP routes require a shared secret carried in a request header
//! and compared in full using a constant-time comparison. A missing or
//! mismatched secret yields an unauthorized error that never echoes the
//! expected value. Stdio requests are local by construction and bypass the
//! check, as does an explicit insecure opt-in for local/testing use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::ServerTransport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the shared secret on protected routes.
pub const SHARED_SECRET_HEADER: &str = "x-gateway-secret";
/// Maximum accepted secret header size.
const MAX_SECRET_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Per-request context used for auth decisions and auditing.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Transport used by the caller.
    pub transport: ServerTransport,
    /// Peer IP address when available.
    pub peer_ip: Option<IpAddr>,
    /// Shared-secret header value (HTTP).
    pub secret_header: Option<String>,
    /// Optional request identifier for auditing.
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Builds a stdio request context.
    #[must_use]
    pub const fn stdio() -> Self {
        Self {
            transport: ServerTransport::Stdio,
            peer_ip: None,
            secret_header: None,
            request_id: None,
        }
    }

    /// Builds an HTTP request context.
    #[must_use]
    pub const fn http(peer_ip: Option<IpAddr>, secret_header: Option<String>) -> Self {
        Self {
            transport: ServerTransport::Http,
            peer_ip,
            secret_header,
            request_id: None,
        }
    }

    /// Returns a copy with the request identifier set.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Transport authentication errors.
///
/// The message never contains secret material.
#[derive(Debug, Error)]
pub enum TransportAuthError {
    /// Missing or mismatched shared secret.
    #[error("unauthorized")]
    Unauthorized,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Shared-secret policy derived from server configuration.
pub struct TransportAuth {
    /// Expected shared secret for protected routes.
    secret: Option<String>,
    /// Whether the check is disabled entirely.
    insecure: bool,
}

impl TransportAuth {
    /// Builds the policy from configured secret and insecure flag.
    #[must_use]
    pub const fn new(secret: Option<String>, insecure: bool) -> Self {
        Self {
            secret,
            insecure,
        }
    }

    /// Returns true when the shared-secret check is disabled.
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Authorizes a request context against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`TransportAuthError::Unauthorized`] when the secret is
    /// required and absent or mismatched.
    pub fn authorize(&self, context: &RequestContext) -> Result<(), TransportAuthError> {
        if context.transport == ServerTransport::Stdio || self.insecure {
            return Ok(());
        }
        let Some(expected) = &self.secret else {
            // No secret configured and not insecure: fail closed.
            return Err(TransportAuthError::Unauthorized);
        };
        let Some(presented) = &context.secret_header else {
            return Err(TransportAuthError::Unauthorized);
        };
        if presented.len() > MAX_SECRET_HEADER_BYTES {
            return Err(TransportAuthError::Unauthorized);
        }
        if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(TransportAuthError::Unauthorized)
        }
    }
}

// ============================================================================
// SECTION: Constant-Time Comparison
// ============================================================================

/// Compares two byte slices in constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
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
        clippy::missing_docs_in_private_items,
        reason = "Test-only panic-based assertions."
    )]

    use super::RequestContext;
    use super::TransportAuth;
    use super::TransportAuthError;
    use super::constant_time_eq;

    fn http_context(secret: Option<&str>) -> RequestContext {
        RequestContext::http(None, secret.map(str::to_string))
    }

    #[test]
    fn stdio_requests_bypass_the_check() {
        let auth = TransportAuth::new(Some("0123456789abcdef".to_string()), false);
        assert!(auth.authorize(&RequestContext::stdio()).is_ok());
    }

    #[test]
    fn matching_secret_is_accepted() {
        let auth = TransportAuth::new(Some("0123456789abcdef".to_string()), false);
        assert!(auth.authorize(&http_context(Some("0123456789abcdef"))).is_ok());
    }

    #[test]
    fn missing_secret_is_rejected_without_echo() {
        let auth = TransportAuth::new(Some("0123456789abcdef".to_string()), false);
        let err = auth.authorize(&http_context(None)).unwrap_err();
        assert!(!err.to_string().contains("0123456789abcdef"));
    }

    #[test]
    fn mismatched_secret_is_rejected() {
        let auth = TransportAuth::new(Some("0123456789abcdef".to_string()), false);
        let result = auth.authorize(&http_context(Some("wrong-secret-value")));
        assert!(matches!(result, Err(TransportAuthError::Unauthorized)));
    }

    #[test]
    fn insecure_mode_disables_the_check() {
        let auth = TransportAuth::new(None, true);
        assert!(auth.authorize(&http_context(None)).is_ok());
    }

    #[test]
    fn unconfigured_secret_fails_closed() {
        let auth = TransportAuth::new(None, false);
        let result = auth.authorize(&http_context(Some("anything")));
        assert!(matches!(result, Err(TransportAuthError::Unauthorized)));
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"abcd", b"abcd"));
    }
}
