// identity-gate-mcp/src/lib.rs
// ============================================================================
// Module: Identity Gate MCP
// Description: Gateway server exposing identity tools over stdio and HTTP.
// Purpose: Wire configuration, credentials, tier validation, and the tool
//          registry into the protocol dispatch pipeline.
// Dependencies: identity-gate-client, identity-gate-core, axum, tokio
// ============================================================================

//! ## Overview
//! Identity Gate exposes downstream identity operations as enumerable tools
//! behind a tier-aware safety gate. All tools are thin wrappers over
//! [`identity_gate_client::IdentityApiClient`]; tier validation runs as
//! dispatch middleware before any tool executes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod config;
pub mod middleware;
pub mod server;
pub mod tools;
pub mod validator;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::GatewayAuditEvent;
pub use audit::GatewayAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::RequestContext;
pub use auth::SHARED_SECRET_HEADER;
pub use auth::TransportAuth;
pub use auth::TransportAuthError;
pub use config::ConfigError;
pub use config::GatewayConfig;
pub use config::ServerTransport;
pub use middleware::RESOURCE_ID_ARGUMENT;
pub use middleware::ToolCallGate;
pub use server::GatewayServer;
pub use server::ServerError;
pub use tools::build_registry;
pub use validator::OperationKind;
pub use validator::TierCacheEntry;
pub use validator::TierValidator;
pub use validator::ValidationError;
