// identity-gate-client/src/lib.rs
// ============================================================================
// Module: Identity Gate Client
// Description: Downstream identity API client and credential lifecycle.
// Purpose: Provide authorized, bounded access to the identity service.
// Dependencies: reqwest, serde, serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! This crate owns every outbound call to the downstream identity service.
//! The credential manager holds the current session, re-acquires an access
//! token through a two-step discovery and client-credentials exchange when
//! the downstream service rejects it, and retries the rejected request
//! exactly once. The tier module exposes the classification lookup used by
//! the gateway's safety validator.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod api;
pub mod auth;
pub mod session;
pub mod tier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use api::ApiClientConfig;
pub use api::ApiError;
pub use api::IdentityApiClient;
pub use auth::AuthError;
pub use auth::CredentialManager;
pub use auth::OidcTokenExchanger;
pub use auth::TokenExchanger;
pub use session::Session;
pub use tier::ClassificationLookup;
pub use tier::EnvironmentTierLookup;
pub use tier::Tier;
pub use tier::TierLookupError;
