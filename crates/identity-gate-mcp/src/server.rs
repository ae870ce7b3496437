// identity-gate-mcp/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: Stdio and HTTP transports over the shared dispatch pipeline.
// Purpose: Wire configuration into the credential manager, downstream
//          client, validator, gate, and registry, then serve requests.
// Dependencies: axum, identity-gate-client, identity-gate-core, serde_json,
//               thiserror, tokio
// ============================================================================

//! ## Overview
//! Both transports funnel into one pipeline: decode the envelope, run the
//! tool-call gate, then dispatch. The stdio transport is line-oriented and
//! synchronous; a malformed line produces a parse-error response keyed to a
//! null id and the loop continues. The HTTP transport exposes the raw
//! protocol endpoint plus a small REST shim, both behind the shared-secret
//! policy. Tool runs use blocking downstream calls, so HTTP handlers step
//! out of the async scheduler before dispatching.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::BufRead;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Json;
use axum::routing::get;
use axum::routing::post;
use identity_gate_client::ApiClientConfig;
use identity_gate_client::CredentialManager;
use identity_gate_client::EnvironmentTierLookup;
use identity_gate_client::IdentityApiClient;
use identity_gate_client::OidcTokenExchanger;
use identity_gate_core::Dispatcher;
use identity_gate_core::Envelope;
use identity_gate_core::ErrorCode;
use identity_gate_core::PROTOCOL_VERSION;
use identity_gate_core::Response;
use identity_gate_core::ServerInfo;
use identity_gate_core::ToolRegistry;
use identity_gate_core::decode;
use identity_gate_core::encode;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::audit::GatewayAuditEvent;
use crate::audit::GatewayAuditSink;
use crate::audit::StderrAuditSink;
use crate::auth::RequestContext;
use crate::auth::SHARED_SECRET_HEADER;
use crate::auth::TransportAuth;
use crate::config::GatewayConfig;
use crate::middleware::ToolCallGate;
use crate::tools;
use crate::validator::TierValidator;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and serve errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A gateway component could not be constructed.
    #[error("gateway init failed: {0}")]
    Init(String),
    /// Transport I/O failed.
    #[error("transport failed: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Gateway server owning the dispatch pipeline.
pub struct GatewayServer {
    /// Tool registry built at startup.
    registry: ToolRegistry,
    /// Protocol dispatcher.
    dispatcher: Dispatcher,
    /// Tool-call validation gate.
    gate: ToolCallGate,
    /// Shared-secret policy for the HTTP transport.
    auth: TransportAuth,
    /// Audit sink shared across components.
    audit: Arc<dyn GatewayAuditSink>,
    /// Bind address for the HTTP transport.
    bind: Option<String>,
    /// Maximum HTTP request body size.
    max_body_bytes: usize,
}

impl GatewayServer {
    /// Wires the full gateway from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Init`] when a downstream component cannot be
    /// constructed.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServerError> {
        let exchanger = OidcTokenExchanger::new(
            config.downstream.auth_base_url.clone(),
            config.downstream.client_id.clone(),
            config.downstream.client_secret.clone(),
        )
        .map_err(|err| ServerError::Init(err.to_string()))?;
        let credentials = Arc::new(CredentialManager::new(Arc::new(exchanger)));
        let mut client_config = ApiClientConfig::new(config.downstream.api_base_url.clone());
        client_config.request_timeout =
            Duration::from_millis(config.downstream.request_timeout_ms);
        let client = Arc::new(
            IdentityApiClient::new(client_config, credentials)
                .map_err(|err| ServerError::Init(err.to_string()))?,
        );
        let lookup = Arc::new(EnvironmentTierLookup::new(Arc::clone(&client)));
        let validator = Arc::new(TierValidator::new(lookup));
        let audit: Arc<dyn GatewayAuditSink> = Arc::new(StderrAuditSink);
        let gate = ToolCallGate::new(
            validator,
            Arc::clone(&audit),
            config.validation.enabled,
        );
        let registry = tools::build_registry(&client)
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let dispatcher = Dispatcher::new(ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        let auth = TransportAuth::new(
            config.server.shared_secret.clone(),
            config.server.insecure,
        );
        Ok(Self {
            registry,
            dispatcher,
            gate,
            auth,
            audit,
            bind: config.server.bind.clone(),
            max_body_bytes: config.server.max_body_bytes,
        })
    }

    /// Runs one raw frame through gate and dispatch.
    fn handle_frame(&self, bytes: &[u8], context: &RequestContext) -> Response {
        let envelope = match decode(bytes) {
            Ok(envelope) => envelope,
            Err(err) => return Response::from_decode_error(err),
        };
        self.handle_envelope(envelope, context)
    }

    /// Runs a decoded envelope through gate and dispatch.
    fn handle_envelope(&self, envelope: Envelope, context: &RequestContext) -> Response {
        if let Some(blocked) = self.gate.check(&self.registry, &envelope, context) {
            return blocked;
        }
        self.dispatcher.dispatch(&self.registry, envelope)
    }

    // ------------------------------------------------------------------
    // Stdio transport
    // ------------------------------------------------------------------

    /// Serves the line-oriented stdio transport until end of input or
    /// shutdown.
    ///
    /// Blank lines are skipped; a malformed line yields a parse-error
    /// response and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] when reading or writing a line fails.
    pub fn serve_stdio(
        &self,
        reader: impl BufRead,
        mut writer: impl Write,
        shutdown: &AtomicBool,
    ) -> Result<(), ServerError> {
        let context = RequestContext::stdio();
        for line in reader.lines() {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let line = line.map_err(|err| ServerError::Io(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_frame(line.as_bytes(), &context);
            let frame = encode(&response);
            writer
                .write_all(&frame)
                .and_then(|()| writer.write_all(b"\n"))
                .and_then(|()| writer.flush())
                .map_err(|err| ServerError::Io(err.to_string()))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // HTTP transport
    // ------------------------------------------------------------------

    /// Serves the HTTP transport on the configured bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the bind address is missing or the
    /// listener cannot be started.
    pub async fn serve_http(self: Arc<Self>) -> Result<(), ServerError> {
        let bind = self
            .bind
            .clone()
            .ok_or_else(|| ServerError::Init("http transport requires a bind address".to_string()))?;
        if self.auth.is_insecure() {
            #[allow(clippy::print_stderr, reason = "Startup warning belongs on stderr.")]
            {
                eprintln!("warning: shared-secret check disabled; gateway accepts unauthenticated requests");
            }
        }
        let router = Arc::clone(&self).router();
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|err| ServerError::Io(format!("bind {bind}: {err}")))?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|err| ServerError::Io(err.to_string()))
    }

    /// Builds the HTTP router.
    #[must_use]
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/mcp/jsonrpc", post(handle_jsonrpc))
            .route("/mcp/tools", get(handle_tools))
            .route("/mcp/run", post(handle_run))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(self)
    }

    /// Authorizes an HTTP request and audits the decision.
    fn authorize_http(&self, context: &RequestContext, action: &str) -> Result<(), StatusCode> {
        match self.auth.authorize(context) {
            Ok(()) => {
                self.audit.record(&GatewayAuditEvent::auth_allowed(context, action));
                Ok(())
            }
            Err(err) => {
                self.audit.record(&GatewayAuditEvent::auth_denied(
                    context,
                    action,
                    err.to_string(),
                ));
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

// ============================================================================
// SECTION: HTTP Handlers
// ============================================================================

/// Builds an HTTP request context from connection info and headers.
fn http_context(peer: Option<SocketAddr>, headers: &HeaderMap) -> RequestContext {
    let secret = headers
        .get(SHARED_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    RequestContext::http(peer.map(|addr| addr.ip()), secret)
}

/// Raw protocol endpoint: one envelope in, one response out.
async fn handle_jsonrpc(
    State(server): State<Arc<GatewayServer>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let context = http_context(Some(peer), &headers);
    if let Err(status) = server.authorize_http(&context, "jsonrpc") {
        return status.into_response();
    }
    let response = dispatch_blocking(&server, move |server| {
        server.handle_frame(&body, &context)
    })
    .await;
    Json(response).into_response()
}

/// Tool discovery endpoint.
async fn handle_tools(
    State(server): State<Arc<GatewayServer>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let context = http_context(Some(peer), &headers);
    if let Err(status) = server.authorize_http(&context, "tools") {
        return status.into_response();
    }
    let tools: Vec<Value> = server
        .registry
        .list()
        .into_iter()
        .map(|descriptor| {
            json!({
                "name": descriptor.name,
                "description": descriptor.description,
                "inputSchema": descriptor.input_schema,
            })
        })
        .collect();
    Json(json!({"tools": tools})).into_response()
}

/// Request body accepted by the REST run endpoint.
#[derive(Debug, Deserialize)]
struct RunRequest {
    /// Target tool name.
    tool: String,
    /// Raw tool input map.
    #[serde(default)]
    input: Value,
}

/// REST shim: runs one tool named in the request body.
///
/// Accepts `{"tool": name, "input": map}` and answers `{"output": map}` on
/// success or `{"error": object}` with a mapped status on failure; the
/// protocol-level content wrapper never leaks onto this surface.
async fn handle_run(
    State(server): State<Arc<GatewayServer>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let context = http_context(Some(peer), &headers);
    if let Err(status) = server.authorize_http(&context, "run") {
        return status.into_response();
    }
    let Ok(request) = serde_json::from_slice::<RunRequest>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "request body must be a JSON object with a tool name"})),
        )
            .into_response();
    };
    let envelope = Envelope {
        version: PROTOCOL_VERSION.to_string(),
        id: Value::Null,
        method: "tools/call".to_string(),
        params: json!({"name": request.tool, "arguments": request.input}),
    };
    let response = dispatch_blocking(&server, move |server| {
        server.handle_envelope(envelope, &context)
    })
    .await;
    match response.error {
        None => Json(json!({"output": unwrap_tool_output(response.result)})).into_response(),
        Some(error) => {
            let status = rest_status(error.code, error.data.as_ref());
            (status, Json(json!({"error": error}))).into_response()
        }
    }
}

/// Extracts the raw tool output from the protocol content wrapper.
fn unwrap_tool_output(result: Option<Value>) -> Value {
    result
        .and_then(|mut value| value.pointer_mut("/content/0/json").map(Value::take))
        .unwrap_or(Value::Null)
}

/// Runs a dispatch closure off the async scheduler.
///
/// Tool runs issue blocking downstream calls, so they must not execute on a
/// scheduler worker directly.
async fn dispatch_blocking<F>(server: &Arc<GatewayServer>, work: F) -> Response
where
    F: FnOnce(&GatewayServer) -> Response + Send + 'static,
{
    let server = Arc::clone(server);
    tokio::task::spawn_blocking(move || work(&server))
        .await
        .unwrap_or_else(|_| {
            Response::failure(Value::Null, ErrorCode::Internal, "dispatch task failed")
        })
}

/// Maps a protocol error onto a REST status code.
fn rest_status(code: i64, data: Option<&Value>) -> StatusCode {
    match code {
        -32601 => StatusCode::NOT_FOUND,
        -32602 | -32600 | -32700 => StatusCode::BAD_REQUEST,
        _ => data
            .and_then(|value| value.get("status"))
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
            .and_then(|status| StatusCode::from_u16(status).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
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
        clippy::missing_docs_in_private_items,
        reason = "Test-only panic-based assertions."
    )]

    use axum::http::StatusCode;
    use serde_json::Value;
    use serde_json::json;

    use super::rest_status;
    use super::unwrap_tool_output;

    #[test]
    fn method_not_found_maps_to_not_found() {
        assert_eq!(rest_status(-32601, None), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_params_maps_to_bad_request() {
        assert_eq!(rest_status(-32602, None), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_error_forwards_downstream_status() {
        let data = json!({"status": 404});
        assert_eq!(rest_status(-32603, Some(&data)), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_error_without_status_maps_to_server_error() {
        assert_eq!(rest_status(-32603, None), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn tool_output_is_unwrapped_from_the_content_envelope() {
        let result = json!({
            "content": [{"type": "json", "json": {"id": "env-1", "type": "SANDBOX"}}],
            "isError": false,
        });
        let output = unwrap_tool_output(Some(result));
        assert_eq!(output["id"], "env-1");
        assert_eq!(output["type"], "SANDBOX");
    }

    #[test]
    fn missing_tool_output_degrades_to_null() {
        assert_eq!(unwrap_tool_output(None), Value::Null);
        assert_eq!(unwrap_tool_output(Some(json!({"isError": false}))), Value::Null);
    }
}
