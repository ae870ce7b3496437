// identity-gate-mcp/src/audit.rs
// ============================================================================
// Module: Gateway Audit
// Description: Structured audit events for auth and validation decisions.
// Purpose: Emit JSON-line audit records without heavy logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events record allow/deny decisions made by the transport auth
//! policy and the tier validation gate. Sinks are intentionally small traits
//! so deployments can plug in their own collection without redesign; the
//! default sink writes one JSON line per event to stderr.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::auth::RequestContext;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Gateway audit event payload.
#[derive(Debug, Serialize)]
pub struct GatewayAuditEvent {
    /// Event identifier.
    event: &'static str,
    /// Decision outcome.
    decision: &'static str,
    /// Gateway action (method or tool name).
    action: String,
    /// Transport label.
    transport: &'static str,
    /// Caller IP address when available.
    peer_ip: Option<String>,
    /// Target resource identifier when the event concerns validation.
    resource_id: Option<String>,
    /// Resolved tier label when classification succeeded.
    tier: Option<&'static str>,
    /// Failure reason for deny events.
    reason: Option<String>,
    /// Request identifier when provided.
    request_id: Option<String>,
}

impl GatewayAuditEvent {
    /// Builds an auth allow event.
    #[must_use]
    pub fn auth_allowed(context: &RequestContext, action: impl Into<String>) -> Self {
        Self::base("gateway_auth", "allow", context, action)
    }

    /// Builds an auth deny event.
    #[must_use]
    pub fn auth_denied(
        context: &RequestContext,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut event = Self::base("gateway_auth", "deny", context, action);
        event.reason = Some(reason.into());
        event
    }

    /// Builds a validation allow event.
    #[must_use]
    pub fn validation_allowed(
        context: &RequestContext,
        action: impl Into<String>,
        resource_id: impl Into<String>,
        tier: &'static str,
    ) -> Self {
        let mut event = Self::base("tier_validation", "allow", context, action);
        event.resource_id = Some(resource_id.into());
        event.tier = Some(tier);
        event
    }

    /// Builds a validation deny event.
    #[must_use]
    pub fn validation_denied(
        context: &RequestContext,
        action: impl Into<String>,
        resource_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        let mut event = Self::base("tier_validation", "deny", context, action);
        event.resource_id = resource_id;
        event.reason = Some(reason.into());
        event
    }

    /// Builds the common event shape.
    fn base(
        event: &'static str,
        decision: &'static str,
        context: &RequestContext,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event,
            decision,
            action: action.into(),
            transport: match context.transport {
                crate::config::ServerTransport::Stdio => "stdio",
                crate::config::ServerTransport::Http => "http",
            },
            peer_ip: context.peer_ip.map(|ip| ip.to_string()),
            resource_id: None,
            tier: None,
            reason: None,
            request_id: context.request_id.clone(),
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for gateway decisions.
pub trait GatewayAuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &GatewayAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl GatewayAuditSink for StderrAuditSink {
    #[allow(clippy::print_stderr, reason = "Stderr is the audit channel for this sink.")]
    fn record(&self, event: &GatewayAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            eprintln!("{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record(&self, _event: &GatewayAuditEvent) {}
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
        reason = "Test-only panic-based assertions."
    )]

    use serde_json::Value;

    use super::GatewayAuditEvent;
    use crate::auth::RequestContext;

    #[test]
    fn deny_event_serializes_reason_and_resource() {
        let context = RequestContext::stdio().with_request_id("42");
        let event = GatewayAuditEvent::validation_denied(
            &context,
            "user_delete",
            Some("env-1".to_string()),
            "protected tier",
        );
        let payload = serde_json::to_string(&event).expect("serialize failed");
        let value: Value = serde_json::from_str(&payload).expect("parse failed");
        assert_eq!(value["decision"], "deny");
        assert_eq!(value["resource_id"], "env-1");
        assert_eq!(value["request_id"], "42");
        assert_eq!(value["transport"], "stdio");
    }
}
