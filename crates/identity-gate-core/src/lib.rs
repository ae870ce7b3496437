// identity-gate-core/src/lib.rs
// ============================================================================
// Module: Identity Gate Core
// Description: Wire envelope codec, tool registry, and request dispatcher.
// Purpose: Provide the transport-independent dispatch core of the gateway.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Identity Gate Core holds the pieces of the gateway that must behave
//! identically regardless of transport: the versioned envelope codec, the
//! tool registry populated once at startup, and the pure dispatcher that
//! routes decoded requests to registered tools. Transports, credential
//! management, and safety validation live in the sibling crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dispatch;
pub mod protocol;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatch::Dispatcher;
pub use dispatch::ServerInfo;
pub use dispatch::ToolCallParams;
pub use protocol::DecodeError;
pub use protocol::Envelope;
pub use protocol::ErrorCode;
pub use protocol::ErrorObject;
pub use protocol::PROTOCOL_VERSION;
pub use protocol::Response;
pub use protocol::decode;
pub use protocol::encode;
pub use registry::RegistryError;
pub use registry::Tool;
pub use registry::ToolDescriptor;
pub use registry::ToolRegistry;
pub use registry::ToolRunError;
pub use registry::ValidationPolicy;
