// identity-gate-client/src/tier.rs
// ============================================================================
// Module: Tier Classification
// Description: Resource tier model and the downstream classification lookup.
// Purpose: Resolve a target resource's protection tier for the validator.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every target resource is classified into a tier that governs read/write
//! safety policy. Production environments are protected and stable, so their
//! classification may be cached; sandbox environments are volatile and are
//! re-classified on every validation. A failed lookup is always an error,
//! never an implicit "unprotected".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;
use crate::api::IdentityApiClient;

// ============================================================================
// SECTION: Tier
// ============================================================================

/// Protection tier of a target resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Production environment: protected and stable.
    Production,
    /// Sandbox environment: unprotected and volatile.
    Sandbox,
}

impl Tier {
    /// Returns a stable label for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "PRODUCTION",
            Self::Sandbox => "SANDBOX",
        }
    }

    /// Returns true when operations against the tier are gated.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns true when the classification is stable enough to cache.
    ///
    /// Volatile tiers are re-classified on every validation.
    #[must_use]
    pub const fn is_cacheable(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Parses a downstream tier label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "PRODUCTION" => Some(Self::Production),
            "SANDBOX" => Some(Self::Sandbox),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Classification lookup errors.
#[derive(Debug, Error)]
pub enum TierLookupError {
    /// The resource does not exist downstream.
    #[error("resource not found: {resource_id}")]
    NotFound {
        /// Target resource identifier.
        resource_id: String,
    },
    /// The downstream response carried no usable classification.
    #[error("empty classification for resource {resource_id}")]
    Empty {
        /// Target resource identifier.
        resource_id: String,
    },
    /// The downstream response carried an unrecognized tier label.
    #[error("unrecognized tier {label} for resource {resource_id}")]
    Unrecognized {
        /// Target resource identifier.
        resource_id: String,
        /// Raw label returned downstream.
        label: String,
    },
    /// The lookup could not be performed.
    #[error("classification lookup failed: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Lookup Capability
// ============================================================================

/// Classification lookup capability consumed by the tier validator.
pub trait ClassificationLookup: Send + Sync {
    /// Resolves a resource identifier to its protection tier.
    ///
    /// # Errors
    ///
    /// Returns [`TierLookupError`] when the resource is missing, the
    /// response is empty, or the lookup fails.
    fn resolve(&self, resource_id: &str) -> Result<Tier, TierLookupError>;
}

/// Lookup implementation backed by the identity API environments resource.
pub struct EnvironmentTierLookup {
    /// Downstream identity API client.
    client: Arc<IdentityApiClient>,
}

impl EnvironmentTierLookup {
    /// Creates a lookup over the given client.
    #[must_use]
    pub const fn new(client: Arc<IdentityApiClient>) -> Self {
        Self {
            client,
        }
    }
}

impl ClassificationLookup for EnvironmentTierLookup {
    fn resolve(&self, resource_id: &str) -> Result<Tier, TierLookupError> {
        let payload = self.client.get_environment(resource_id).map_err(|err| match err {
            ApiError::Status {
                status: 404, ..
            } => TierLookupError::NotFound {
                resource_id: resource_id.to_string(),
            },
            other => TierLookupError::Transport(other.to_string()),
        })?;
        let Some(label) = payload.get("type").and_then(serde_json::Value::as_str) else {
            return Err(TierLookupError::Empty {
                resource_id: resource_id.to_string(),
            });
        };
        Tier::parse(label).ok_or_else(|| TierLookupError::Unrecognized {
            resource_id: resource_id.to_string(),
            label: label.to_string(),
        })
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
        reason = "Test-only panic-based assertions."
    )]

    use super::Tier;

    #[test]
    fn production_is_protected_and_cacheable() {
        assert!(Tier::Production.is_protected());
        assert!(Tier::Production.is_cacheable());
    }

    #[test]
    fn sandbox_is_neither_protected_nor_cacheable() {
        assert!(!Tier::Sandbox.is_protected());
        assert!(!Tier::Sandbox.is_cacheable());
    }

    #[test]
    fn parse_accepts_known_labels_only() {
        assert_eq!(Tier::parse("PRODUCTION"), Some(Tier::Production));
        assert_eq!(Tier::parse("SANDBOX"), Some(Tier::Sandbox));
        assert_eq!(Tier::parse("staging"), None);
    }
}
