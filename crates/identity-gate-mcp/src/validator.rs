// identity-gate-mcp/src/validator.rs
// ============================================================================
// Module: Tier Validator
// Description: Tier-aware safety gate with a tier-dependent cache policy.
// Purpose: Block destructive or sensitive operations against protected
//          resources before a tool's run function executes.
// Dependencies: identity-gate-client, thiserror
// ============================================================================

//! ## Overview
//! Each validation resolves the target resource's tier, from the cache when
//! a stable classification exists, otherwise through the downstream lookup.
//! Only stable tiers are written to the cache; volatile tiers are
//! re-classified on every call. A protected tier blocks reads and writes by
//! default, with a descriptor-level override permitting reads. A failed
//! lookup is a validation failure, never an implicit "unprotected".
//!
//! The cache lock is held only for map reads and writes, never across the
//! lookup network call, so concurrent first-time lookups for the same id
//! are not coalesced; the second insert is idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;

use identity_gate_client::ClassificationLookup;
use identity_gate_client::Tier;
use thiserror::Error;

// ============================================================================
// SECTION: Operation Kind
// ============================================================================

/// Kind of operation being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// The operation only reads downstream state.
    Read,
    /// The operation mutates downstream state.
    Write,
}

impl OperationKind {
    /// Returns a stable label for the operation kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tier validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The target resource is in a protected tier and the operation is
    /// blocked by policy.
    #[error("{operation} blocked: resource {resource_id} is in protected tier {tier}")]
    Protected {
        /// Target resource identifier.
        resource_id: String,
        /// Resolved tier label.
        tier: &'static str,
        /// Operation kind that was blocked.
        operation: &'static str,
    },
    /// The classification lookup failed; the gate fails closed.
    #[error("classification failed for resource {resource_id}: {reason}")]
    Lookup {
        /// Target resource identifier.
        resource_id: String,
        /// Stable failure description.
        reason: String,
    },
}

// ============================================================================
// SECTION: Cache Entry
// ============================================================================

/// Cached classification for a stable-tier resource.
#[derive(Debug, Clone)]
pub struct TierCacheEntry {
    /// Target resource identifier.
    pub resource_id: String,
    /// Cached tier.
    pub tier: Tier,
    /// Time the classification was cached.
    pub cached_at: SystemTime,
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Tier-aware safety validator with a tier-dependent cache.
///
/// # Invariants
/// - Cache entries exist only for tiers whose policy marks them cacheable.
/// - The cache lock is never held across the classification network call.
pub struct TierValidator {
    /// Downstream classification lookup.
    lookup: Arc<dyn ClassificationLookup>,
    /// Cached classifications keyed by resource id.
    cache: Mutex<BTreeMap<String, TierCacheEntry>>,
}

impl TierValidator {
    /// Creates a validator over the given lookup.
    #[must_use]
    pub fn new(lookup: Arc<dyn ClassificationLookup>) -> Self {
        Self {
            lookup,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Validates an operation against a target resource.
    ///
    /// `allow_protected_reads` is the descriptor-level override permitting
    /// reads against protected tiers.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the operation is blocked or the
    /// classification lookup fails.
    pub fn validate(
        &self,
        resource_id: &str,
        operation: OperationKind,
        allow_protected_reads: bool,
    ) -> Result<Tier, ValidationError> {
        let tier = self.classify(resource_id)?;
        if !tier.is_protected() {
            return Ok(tier);
        }
        if operation == OperationKind::Read && allow_protected_reads {
            return Ok(tier);
        }
        Err(ValidationError::Protected {
            resource_id: resource_id.to_string(),
            tier: tier.as_str(),
            operation: operation.as_str(),
        })
    }

    /// Resolves a resource's tier, consulting the cache first.
    fn classify(&self, resource_id: &str) -> Result<Tier, ValidationError> {
        if let Some(tier) = self.cached_tier(resource_id) {
            return Ok(tier);
        }
        let tier = self.lookup.resolve(resource_id).map_err(|err| ValidationError::Lookup {
            resource_id: resource_id.to_string(),
            reason: err.to_string(),
        })?;
        if tier.is_cacheable() {
            let mut cache = self.lock_cache()?;
            cache.insert(
                resource_id.to_string(),
                TierCacheEntry {
                    resource_id: resource_id.to_string(),
                    tier,
                    cached_at: SystemTime::now(),
                },
            );
        }
        Ok(tier)
    }

    /// Returns the cached tier for a resource id when present.
    #[must_use]
    pub fn cached_tier(&self, resource_id: &str) -> Option<Tier> {
        self.cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(resource_id).map(|entry| entry.tier))
    }

    /// Removes every cached classification.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    /// Removes a single cached classification.
    pub fn remove_from_cache(&self, resource_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(resource_id);
        }
    }

    /// Locks the cache, failing closed on a poisoned lock.
    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, TierCacheEntry>>, ValidationError> {
        self.cache.lock().map_err(|_| ValidationError::Lookup {
            resource_id: String::new(),
            reason: "tier cache lock poisoned".to_string(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
