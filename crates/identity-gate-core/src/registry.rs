// identity-gate-core/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Registry of tool descriptors and their run functions.
// Purpose: Hold the enumerable set of tools the dispatcher can route to.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The registry holds each tool's descriptor and run function keyed by the
//! tool's unique name. It is an explicit value constructed once at startup
//! and passed by reference to the dispatcher; there is no ambient global
//! state and no mutation after startup. Listing is atomic over the in-memory
//! map and returns descriptors in a stable but unspecified order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Descriptor Types
// ============================================================================

/// Safety-validation policy carried by a tool descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Default policy: the middleware gate applies in full.
    Enforce,
    /// Reads are permitted even against protected-tier resources.
    AllowProtectedReads,
    /// The tool carries no target resource and skips the gate entirely.
    Skip,
}

/// Immutable tool descriptor registered at startup.
///
/// # Invariants
/// - `name` uniquely identifies the tool in the registry.
/// - Descriptors are never mutated after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Short human-readable title.
    pub title: String,
    /// Tool description for clients.
    pub description: String,
    /// JSON schema for tool input.
    pub input_schema: Value,
    /// JSON schema for tool output.
    pub output_schema: Value,
    /// Whether the tool only reads downstream state.
    pub read_only: bool,
    /// Safety-validation policy override.
    pub validation: ValidationPolicy,
}

// ============================================================================
// SECTION: Tool Capability
// ============================================================================

/// Tool run errors surfaced to the dispatcher.
#[derive(Debug, Error)]
pub enum ToolRunError {
    /// Tool arguments failed the tool's own precondition.
    #[error("{0}")]
    Invalid(String),
    /// The wrapped downstream call failed.
    #[error("{message}")]
    Downstream {
        /// Downstream HTTP status when one was received.
        status: Option<u16>,
        /// Stable failure description.
        message: String,
    },
}

impl ToolRunError {
    /// Returns the downstream status code when one is available.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Downstream {
                status, ..
            } => *status,
            Self::Invalid(_) => None,
        }
    }
}

/// Tool capability: a descriptor plus a run function.
pub trait Tool: Send + Sync {
    /// Returns the tool's immutable descriptor.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Runs the tool against the supplied arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRunError`] when the arguments fail the tool's own
    /// precondition or the wrapped downstream call fails.
    fn run(&self, arguments: Value) -> Result<Value, ToolRunError>;
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A tool with the same name was already registered.
    #[error("tool already registered: {0}")]
    Duplicate(String),
}

/// Registry of tools keyed by unique name.
///
/// # Invariants
/// - Populated once at startup; not mutated afterwards in intended use.
#[derive(Default)]
pub struct ToolRegistry {
    /// Registered tools keyed by name.
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its descriptor name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name is already present.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.descriptor().name.clone();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Returns every registered descriptor.
    ///
    /// Order is stable across calls but unspecified; callers must not depend
    /// on it.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|tool| tool.descriptor().clone()).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
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

    use serde_json::Value;
    use serde_json::json;

    use super::RegistryError;
    use super::Tool;
    use super::ToolDescriptor;
    use super::ToolRegistry;
    use super::ToolRunError;
    use super::ValidationPolicy;

    struct StaticTool {
        descriptor: ToolDescriptor,
    }

    impl StaticTool {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ToolDescriptor {
                    name: name.to_string(),
                    title: name.to_string(),
                    description: "test tool".to_string(),
                    input_schema: json!({"type": "object"}),
                    output_schema: json!({"type": "object"}),
                    read_only: true,
                    validation: ValidationPolicy::Skip,
                },
            })
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

    #[test]
    fn register_rejects_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::named("user_get")).expect("first register failed");
        let result = registry.register(StaticTool::named("user_get"));
        assert!(matches!(result, Err(RegistryError::Duplicate(name)) if name == "user_get"));
    }

    #[test]
    fn list_returns_every_descriptor_without_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::named("b_tool")).expect("register failed");
        registry.register(StaticTool::named("a_tool")).expect("register failed");
        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        let mut names: Vec<_> = listed.iter().map(|d| d.name.clone()).collect();
        names.dedup();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn get_returns_not_found_for_unknown_name() {
        let registry = ToolRegistry::new();
        assert!(registry.get("missing").is_none());
    }
}
