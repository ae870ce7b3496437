// identity-gate-mcp/src/middleware.rs
// ============================================================================
// Module: Tool Call Gate
// Description: Dispatch middleware that validates tool calls before they run.
// Purpose: Intercept tool invocations, resolve the target resource tier and
//          block protected-tier operations with a structured protocol error.
// Dependencies: identity-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The gate inspects only tool invocation requests; every other method
//! passes through untouched. For a registered tool it extracts the target
//! resource identifier from the call arguments and runs tier validation
//! according to the tool's descriptor. Unregistered tool names pass through
//! so the dispatcher can produce its own method-not-found error, while a
//! registered tool whose arguments carry no extractable resource identifier
//! is blocked, unless the descriptor opts out of validation entirely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use identity_gate_core::Envelope;
use identity_gate_core::ErrorCode;
use identity_gate_core::Response;
use identity_gate_core::ToolCallParams;
use identity_gate_core::ToolRegistry;
use identity_gate_core::ValidationPolicy;
use serde_json::Value;
use serde_json::json;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditSink;
use crate::auth::RequestContext;
use crate::validator::OperationKind;
use crate::validator::TierValidator;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Method name the gate intercepts.
const TOOL_CALL_METHOD: &str = "tools/call";
/// Argument key carrying the target resource identifier.
pub const RESOURCE_ID_ARGUMENT: &str = "environmentId";

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Middleware gating tool calls on tier validation.
pub struct ToolCallGate {
    /// Tier validator shared with the rest of the gateway.
    validator: Arc<TierValidator>,
    /// Audit sink for allow/deny decisions.
    audit: Arc<dyn GatewayAuditSink>,
    /// Whether validation is enabled at all.
    enabled: bool,
}

impl ToolCallGate {
    /// Creates a gate over a validator and audit sink.
    #[must_use]
    pub fn new(
        validator: Arc<TierValidator>,
        audit: Arc<dyn GatewayAuditSink>,
        enabled: bool,
    ) -> Self {
        Self {
            validator,
            audit,
            enabled,
        }
    }

    /// Inspects a request envelope before dispatch.
    ///
    /// Returns `Some(response)` when the call must be blocked; `None` lets
    /// the dispatcher proceed.
    #[must_use]
    pub fn check(
        &self,
        registry: &ToolRegistry,
        envelope: &Envelope,
        context: &RequestContext,
    ) -> Option<Response> {
        if !self.enabled || envelope.method != TOOL_CALL_METHOD {
            return None;
        }
        let params: ToolCallParams =
            serde_json::from_value(envelope.params.clone()).ok()?;
        // Unknown tool names fall through so dispatch reports method-not-found.
        let tool = registry.get(&params.name)?;
        let descriptor = tool.descriptor();
        if descriptor.validation == ValidationPolicy::Skip {
            return None;
        }
        let operation = if descriptor.read_only {
            OperationKind::Read
        } else {
            OperationKind::Write
        };
        let Some(resource_id) = extract_resource_id(&params.arguments) else {
            let reason = format!(
                "tool {} requires a {RESOURCE_ID_ARGUMENT} argument for tier validation",
                params.name
            );
            self.audit.record(&GatewayAuditEvent::validation_denied(
                context,
                params.name.clone(),
                None,
                reason.clone(),
            ));
            return Some(blocked_response(envelope.id.clone(), None, reason));
        };
        let allow_protected_reads =
            descriptor.validation == ValidationPolicy::AllowProtectedReads;
        match self.validator.validate(&resource_id, operation, allow_protected_reads) {
            Ok(tier) => {
                self.audit.record(&GatewayAuditEvent::validation_allowed(
                    context,
                    params.name,
                    resource_id,
                    tier.as_str(),
                ));
                None
            }
            Err(err) => {
                let reason = err.to_string();
                self.audit.record(&GatewayAuditEvent::validation_denied(
                    context,
                    params.name,
                    Some(resource_id.clone()),
                    reason.clone(),
                ));
                Some(blocked_response(envelope.id.clone(), Some(resource_id), reason))
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the target resource identifier from tool arguments.
fn extract_resource_id(arguments: &Value) -> Option<String> {
    let value = arguments.get(RESOURCE_ID_ARGUMENT)?;
    let id = value.as_str()?.trim();
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Builds the protocol error response for a blocked call.
fn blocked_response(id: Value, resource_id: Option<String>, reason: String) -> Response {
    let data = json!({
        "resourceId": resource_id,
        "reason": reason,
    });
    Response::failure_with_data(id, ErrorCode::InvalidParams, reason.clone(), Some(data))
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
        reason = "Test-only panic-based assertions and fixtures."
    )]

    use std::sync::Arc;

    use identity_gate_client::ClassificationLookup;
    use identity_gate_client::Tier;
    use identity_gate_client::TierLookupError;
    use identity_gate_core::Envelope;
    use identity_gate_core::PROTOCOL_VERSION;
    use identity_gate_core::Tool;
    use identity_gate_core::ToolDescriptor;
    use identity_gate_core::ToolRegistry;
    use identity_gate_core::ToolRunError;
    use identity_gate_core::ValidationPolicy;
    use serde_json::Value;
    use serde_json::json;

    use super::RESOURCE_ID_ARGUMENT;
    use super::ToolCallGate;
    use crate::audit::NoopAuditSink;
    use crate::auth::RequestContext;
    use crate::validator::TierValidator;

    struct StaticTool {
        descriptor: ToolDescriptor,
    }

    impl StaticTool {
        fn new(name: &str, read_only: bool, validation: ValidationPolicy) -> Self {
            Self {
                descriptor: ToolDescriptor {
                    name: name.to_string(),
                    title: name.to_string(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                    output_schema: json!({"type": "object"}),
                    read_only,
                    validation,
                },
            }
        }
    }

    impl Tool for StaticTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        fn run(&self, _arguments: Value) -> Result<Value, ToolRunError> {
            Ok(json!({"ok": true}))
        }
    }

    struct FixedLookup {
        tier: Tier,
    }

    impl ClassificationLookup for FixedLookup {
        fn resolve(&self, _resource_id: &str) -> Result<Tier, TierLookupError> {
            Ok(self.tier)
        }
    }

    fn gate_with(tier: Tier, enabled: bool) -> ToolCallGate {
        let validator = Arc::new(TierValidator::new(Arc::new(FixedLookup {
            tier,
        })));
        ToolCallGate::new(validator, Arc::new(NoopAuditSink), enabled)
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(StaticTool::new(
                "user_delete",
                false,
                ValidationPolicy::Enforce,
            )))
            .expect("register failed");
        registry
            .register(Arc::new(StaticTool::new(
                "user_read",
                true,
                ValidationPolicy::AllowProtectedReads,
            )))
            .expect("register failed");
        registry
            .register(Arc::new(StaticTool::new(
                "environment_list",
                true,
                ValidationPolicy::Skip,
            )))
            .expect("register failed");
        registry
    }

    fn call_envelope(tool: &str, arguments: Value) -> Envelope {
        Envelope {
            version: PROTOCOL_VERSION.to_string(),
            id: json!(7),
            method: "tools/call".to_string(),
            params: json!({"name": tool, "arguments": arguments}),
        }
    }

    #[test]
    fn non_tool_call_methods_pass_through() {
        let gate = gate_with(Tier::Production, true);
        let envelope = Envelope {
            version: PROTOCOL_VERSION.to_string(),
            id: json!(1),
            method: "tools/list".to_string(),
            params: Value::Null,
        };
        assert!(gate.check(&registry(), &envelope, &RequestContext::stdio()).is_none());
    }

    #[test]
    fn unknown_tool_passes_through_for_dispatch_to_reject() {
        let gate = gate_with(Tier::Production, true);
        let envelope = call_envelope("nonexistent", json!({RESOURCE_ID_ARGUMENT: "env-1"}));
        assert!(gate.check(&registry(), &envelope, &RequestContext::stdio()).is_none());
    }

    #[test]
    fn write_against_protected_tier_is_blocked_with_resource_id() {
        let gate = gate_with(Tier::Production, true);
        let envelope = call_envelope("user_delete", json!({RESOURCE_ID_ARGUMENT: "env-1"}));
        let response = gate
            .check(&registry(), &envelope, &RequestContext::stdio())
            .expect("expected blocked response");
        let error = response.error.expect("expected error object");
        assert_eq!(error.code, -32602);
        let data = error.data.expect("expected error data");
        assert_eq!(data["resourceId"], "env-1");
    }

    #[test]
    fn protected_read_allowed_by_descriptor_override() {
        let gate = gate_with(Tier::Production, true);
        let envelope = call_envelope("user_read", json!({RESOURCE_ID_ARGUMENT: "env-1"}));
        assert!(gate.check(&registry(), &envelope, &RequestContext::stdio()).is_none());
    }

    #[test]
    fn registered_tool_without_resource_id_is_blocked() {
        let gate = gate_with(Tier::Sandbox, true);
        let envelope = call_envelope("user_delete", json!({"name": "someone"}));
        let response = gate
            .check(&registry(), &envelope, &RequestContext::stdio())
            .expect("expected blocked response");
        let error = response.error.expect("expected error object");
        assert_eq!(error.code, -32602);
    }

    #[test]
    fn skip_policy_bypasses_validation_without_resource_id() {
        let gate = gate_with(Tier::Production, true);
        let envelope = call_envelope("environment_list", json!({}));
        assert!(gate.check(&registry(), &envelope, &RequestContext::stdio()).is_none());
    }

    #[test]
    fn disabled_gate_passes_everything_through() {
        let gate = gate_with(Tier::Production, false);
        let envelope = call_envelope("user_delete", json!({RESOURCE_ID_ARGUMENT: "env-1"}));
        assert!(gate.check(&registry(), &envelope, &RequestContext::stdio()).is_none());
    }

    #[test]
    fn blank_resource_id_is_treated_as_missing() {
        let gate = gate_with(Tier::Sandbox, true);
        let envelope = call_envelope("user_delete", json!({RESOURCE_ID_ARGUMENT: "  "}));
        assert!(gate.check(&registry(), &envelope, &RequestContext::stdio()).is_some());
    }
}
