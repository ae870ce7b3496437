// identity-gate-core/src/dispatch.rs
// ============================================================================
// Module: Dispatcher
// Description: Pure routing from decoded envelopes to registered tools.
// Purpose: Produce a result or structured error for every decoded request.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The dispatcher is a pure routing function over (method, params, registry).
//! It answers `initialize` from static server metadata, projects the registry
//! for `tools/list`, and invokes a tool's run function for `tools/call`.
//! Any run-function failure is wrapped as an internal error carrying the tool
//! name and the original arguments; the underlying cause is not classified
//! further at this layer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::protocol::Envelope;
use crate::protocol::ErrorCode;
use crate::protocol::Response;
use crate::registry::ToolDescriptor;
use crate::registry::ToolRegistry;

// ============================================================================
// SECTION: Server Metadata
// ============================================================================

/// Static server identity returned by `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Capability negotiation payload for `initialize`.
#[derive(Debug, Serialize)]
struct InitializeResult {
    /// Advertised server capabilities.
    capabilities: Capabilities,
    /// Server identity metadata.
    #[serde(rename = "serverInfo")]
    server_info: ServerInfo,
}

/// Advertised capability set.
#[derive(Debug, Serialize)]
struct Capabilities {
    /// Tool listing and invocation support.
    tools: ToolsCapability,
}

/// Tool capability marker.
#[derive(Debug, Serialize)]
struct ToolsCapability {}

// ============================================================================
// SECTION: Method Payloads
// ============================================================================

/// Parameters accepted by `tools/call`.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// Target tool name.
    pub name: String,
    /// Raw JSON arguments forwarded to the run function.
    #[serde(default)]
    pub arguments: Value,
}

/// Descriptor projection returned by `tools/list`.
#[derive(Debug, Serialize)]
struct ToolSummary {
    /// Tool name.
    name: String,
    /// Tool description.
    description: String,
    /// JSON schema for tool input.
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

impl From<ToolDescriptor> for ToolSummary {
    fn from(descriptor: ToolDescriptor) -> Self {
        Self {
            name: descriptor.name,
            description: descriptor.description,
            input_schema: descriptor.input_schema,
        }
    }
}

/// Result payload for `tools/list`.
#[derive(Debug, Serialize)]
struct ToolListResult {
    /// Registered tool projections.
    tools: Vec<ToolSummary>,
}

/// Result payload for `tools/call`.
#[derive(Debug, Serialize)]
struct ToolCallResult {
    /// Tool output content.
    content: Vec<ToolContent>,
    /// Whether the content represents a tool-level failure.
    #[serde(rename = "isError")]
    is_error: bool,
}

/// Tool output payloads.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    /// JSON tool output.
    Json {
        /// JSON payload.
        json: Value,
    },
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Pure request dispatcher over a tool registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Server identity returned by `initialize`.
    info: ServerInfo,
}

impl Dispatcher {
    /// Creates a dispatcher with the given server identity.
    #[must_use]
    pub const fn new(info: ServerInfo) -> Self {
        Self {
            info,
        }
    }

    /// Routes a decoded envelope to a response.
    #[must_use]
    pub fn dispatch(&self, registry: &ToolRegistry, envelope: Envelope) -> Response {
        match envelope.method.as_str() {
            "initialize" => self.handle_initialize(envelope.id),
            "tools/list" => Self::handle_tools_list(registry, envelope.id),
            "tools/call" => Self::handle_tools_call(registry, envelope.id, envelope.params),
            _ => Response::failure(
                envelope.id,
                ErrorCode::MethodNotFound,
                format!("method not found: {}", envelope.method),
            ),
        }
    }

    /// Answers `initialize` from static metadata without touching the registry.
    fn handle_initialize(&self, id: Value) -> Response {
        let result = InitializeResult {
            capabilities: Capabilities {
                tools: ToolsCapability {},
            },
            server_info: self.info.clone(),
        };
        match serde_json::to_value(result) {
            Ok(value) => Response::success(id, value),
            Err(_) => {
                Response::failure(id, ErrorCode::Internal, "result serialization failed")
            }
        }
    }

    /// Projects every registered descriptor for `tools/list`.
    fn handle_tools_list(registry: &ToolRegistry, id: Value) -> Response {
        let result = ToolListResult {
            tools: registry.list().into_iter().map(ToolSummary::from).collect(),
        };
        match serde_json::to_value(result) {
            Ok(value) => Response::success(id, value),
            Err(_) => {
                Response::failure(id, ErrorCode::Internal, "result serialization failed")
            }
        }
    }

    /// Resolves and invokes a tool run function for `tools/call`.
    fn handle_tools_call(registry: &ToolRegistry, id: Value, params: Value) -> Response {
        let Ok(call) = serde_json::from_value::<ToolCallParams>(params) else {
            return Response::failure(
                id,
                ErrorCode::InvalidParams,
                "tools/call requires a tool name",
            );
        };
        let Some(tool) = registry.get(&call.name) else {
            return Response::failure(
                id,
                ErrorCode::MethodNotFound,
                format!("unknown tool: {}", call.name),
            );
        };
        match tool.run(call.arguments.clone()) {
            Ok(output) => {
                let result = ToolCallResult {
                    content: vec![ToolContent::Json {
                        json: output,
                    }],
                    is_error: false,
                };
                match serde_json::to_value(result) {
                    Ok(value) => Response::success(id, value),
                    Err(_) => {
                        Response::failure(id, ErrorCode::Internal, "result serialization failed")
                    }
                }
            }
            Err(err) => {
                let mut data = serde_json::Map::new();
                data.insert("tool".to_string(), Value::String(call.name.clone()));
                data.insert("arguments".to_string(), call.arguments);
                if let Some(status) = err.status() {
                    data.insert("status".to_string(), Value::from(status));
                }
                Response::failure_with_data(
                    id,
                    ErrorCode::Internal,
                    format!("tool {} failed: {err}", call.name),
                    Some(Value::Object(data)),
                )
            }
        }
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

    use serde_json::Value;
    use serde_json::json;

    use super::Dispatcher;
    use super::ServerInfo;
    use crate::protocol::Envelope;
    use crate::protocol::ErrorCode;
    use crate::registry::Tool;
    use crate::registry::ToolDescriptor;
    use crate::registry::ToolRegistry;
    use crate::registry::ToolRunError;
    use crate::registry::ValidationPolicy;

    struct CountingTool {
        descriptor: ToolDescriptor,
        calls: Arc<AtomicUsize>,
        outcome: fn(Value) -> Result<Value, ToolRunError>,
    }

    impl Tool for CountingTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        fn run(&self, arguments: Value) -> Result<Value, ToolRunError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(arguments)
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            title: name.to_string(),
            description: "test tool".to_string(),
            input_schema: json!({"type": "object"}),
            output_schema: json!({"type": "object"}),
            read_only: true,
            validation: ValidationPolicy::Skip,
        }
    }

    fn fixture(
        name: &str,
        outcome: fn(Value) -> Result<Value, ToolRunError>,
    ) -> (ToolRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(CountingTool {
                descriptor: descriptor(name),
                calls: Arc::clone(&calls),
                outcome,
            }))
            .expect("register failed");
        (registry, calls)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ServerInfo {
            name: "identity-gate".to_string(),
            version: "0.1.0".to_string(),
        })
    }

    fn envelope(method: &str, id: Value, params: Value) -> Envelope {
        Envelope {
            version: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn initialize_returns_server_metadata() {
        let (registry, _) = fixture("user_get", |_| Ok(json!({})));
        let response =
            dispatcher().dispatch(&registry, envelope("initialize", json!(1), Value::Null));
        let result = response.result.expect("missing result");
        assert_eq!(result["serverInfo"]["name"], json!("identity-gate"));
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[test]
    fn tools_list_returns_registered_count() {
        let (registry, _) = fixture("user_get", |_| Ok(json!({})));
        let response =
            dispatcher().dispatch(&registry, envelope("tools/list", json!(1), json!({})));
        let result = response.result.expect("missing result");
        let tools = result["tools"].as_array().expect("tools not array");
        assert_eq!(tools.len(), registry.len());
        assert_eq!(tools[0]["name"], json!("user_get"));
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[test]
    fn unknown_method_returns_method_not_found() {
        let (registry, _) = fixture("user_get", |_| Ok(json!({})));
        let response =
            dispatcher().dispatch(&registry, envelope("resources/list", json!(2), json!({})));
        let error = response.error.expect("missing error");
        assert_eq!(error.code, ErrorCode::MethodNotFound.code());
    }

    #[test]
    fn call_without_name_returns_invalid_params() {
        let (registry, calls) = fixture("user_get", |_| Ok(json!({})));
        let response =
            dispatcher().dispatch(&registry, envelope("tools/call", json!(3), json!({})));
        let error = response.error.expect("missing error");
        assert_eq!(error.code, ErrorCode::InvalidParams.code());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn call_of_unregistered_tool_never_invokes_run_functions() {
        let (registry, calls) = fixture("user_get", |_| Ok(json!({})));
        let params = json!({"name": "missing", "arguments": {}});
        let response = dispatcher().dispatch(&registry, envelope("tools/call", json!(4), params));
        let error = response.error.expect("missing error");
        assert_eq!(error.code, ErrorCode::MethodNotFound.code());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn successful_call_wraps_output_in_content_array() {
        let (registry, calls) = fixture("user_get", |_| Ok(json!({"id": "u-1"})));
        let params = json!({"name": "user_get", "arguments": {"userId": "u-1"}});
        let response = dispatcher().dispatch(&registry, envelope("tools/call", json!(5), params));
        let result = response.result.expect("missing result");
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["json"]["id"], json!("u-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn precondition_failure_surfaces_as_internal_error_with_diagnostics() {
        let (registry, _) =
            fixture("user_get", |_| Err(ToolRunError::Invalid("userId required".to_string())));
        let params = json!({"name": "user_get", "arguments": {"bogus": 1}});
        let response = dispatcher().dispatch(&registry, envelope("tools/call", json!(6), params));
        let error = response.error.expect("missing error");
        assert_eq!(error.code, ErrorCode::Internal.code());
        let data = error.data.expect("missing diagnostics");
        assert_eq!(data["tool"], json!("user_get"));
        assert_eq!(data["arguments"]["bogus"], json!(1));
    }

    #[test]
    fn downstream_failure_carries_status_in_diagnostics() {
        let (registry, _) = fixture("user_get", |_| {
            Err(ToolRunError::Downstream {
                status: Some(404),
                message: "downstream returned status 404".to_string(),
            })
        });
        let params = json!({"name": "user_get", "arguments": {}});
        let response = dispatcher().dispatch(&registry, envelope("tools/call", json!(7), params));
        let error = response.error.expect("missing error");
        let data = error.data.expect("missing diagnostics");
        assert_eq!(data["status"], json!(404));
    }
}
