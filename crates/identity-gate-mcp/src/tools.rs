// identity-gate-mcp/src/tools.rs
// ============================================================================
// Module: Gateway Tools
// Description: Tool definitions wrapping the downstream identity API.
// Purpose: Expose identity operations as enumerable, schema-described tools
//          registered with the dispatcher at startup.
// Dependencies: identity-gate-client, identity-gate-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every tool is a thin adapter: decode the call arguments, invoke one
//! downstream client method, return the raw response payload. Read-only
//! tools permit reads against protected tiers; mutating tools carry the
//! default enforcement policy. `environment_list` targets no single
//! environment and skips tier validation entirely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use identity_gate_client::ApiError;
use identity_gate_client::IdentityApiClient;
use identity_gate_core::RegistryError;
use identity_gate_core::Tool;
use identity_gate_core::ToolDescriptor;
use identity_gate_core::ToolRegistry;
use identity_gate_core::ToolRunError;
use identity_gate_core::ValidationPolicy;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Argument Types
// ============================================================================

/// Arguments addressing a single environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct EnvironmentArgs {
    /// Target environment identifier.
    environment_id: String,
}

/// Arguments addressing a user within an environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UserArgs {
    /// Target environment identifier.
    environment_id: String,
    /// Target user identifier.
    user_id: String,
}

/// Arguments creating a resource within an environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateArgs {
    /// Target environment identifier.
    environment_id: String,
    /// Resource representation forwarded downstream.
    body: Value,
}

/// Arguments updating a user within an environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UserUpdateArgs {
    /// Target environment identifier.
    environment_id: String,
    /// Target user identifier.
    user_id: String,
    /// Replacement user representation.
    body: Value,
}

/// Arguments addressing a group within an environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct GroupArgs {
    /// Target environment identifier.
    environment_id: String,
    /// Target group identifier.
    group_id: String,
}

/// Arguments addressing a population within an environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PopulationArgs {
    /// Target environment identifier.
    environment_id: String,
    /// Target population identifier.
    population_id: String,
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Run function shape shared by every tool.
type RunFn = fn(&IdentityApiClient, Value) -> Result<Value, ToolRunError>;

/// Tool adapter binding a descriptor to one downstream client call.
struct ApiTool {
    /// Immutable descriptor registered with the dispatcher.
    descriptor: ToolDescriptor,
    /// Shared downstream client.
    client: Arc<IdentityApiClient>,
    /// Decode-and-call run function.
    run: RunFn,
}

impl Tool for ApiTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn run(&self, arguments: Value) -> Result<Value, ToolRunError> {
        (self.run)(&self.client, arguments)
    }
}

/// Decodes tool arguments into a typed shape.
fn decode<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, ToolRunError> {
    serde_json::from_value(arguments)
        .map_err(|err| ToolRunError::Invalid(format!("invalid arguments: {err}")))
}

/// Maps a downstream client error onto a tool run error.
fn map_api_error(err: ApiError) -> ToolRunError {
    ToolRunError::Downstream {
        status: err.status(),
        message: err.to_string(),
    }
}

// ============================================================================
// SECTION: Schemas
// ============================================================================

/// Input schema for tools addressed by environment id only.
fn environment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "environmentId": {"type": "string"}
        },
        "required": ["environmentId"],
        "additionalProperties": false
    })
}

/// Input schema for tools addressed by environment and a child resource id.
fn child_schema(id_field: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "environmentId": {"type": "string"},
            id_field: {"type": "string"}
        },
        "required": ["environmentId", id_field],
        "additionalProperties": false
    })
}

/// Input schema for creation tools carrying a resource body.
fn create_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "environmentId": {"type": "string"},
            "body": {"type": "object"}
        },
        "required": ["environmentId", "body"],
        "additionalProperties": false
    })
}

/// Input schema for the user update tool.
fn user_update_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "environmentId": {"type": "string"},
            "userId": {"type": "string"},
            "body": {"type": "object"}
        },
        "required": ["environmentId", "userId", "body"],
        "additionalProperties": false
    })
}

/// Output schema shared by tools returning raw downstream payloads.
fn passthrough_schema() -> Value {
    json!({"type": "object"})
}

// ============================================================================
// SECTION: Descriptors
// ============================================================================

/// Builds a descriptor with the shared output schema.
fn descriptor(
    name: &str,
    title: &str,
    description: &str,
    input_schema: Value,
    read_only: bool,
    validation: ValidationPolicy,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        input_schema,
        output_schema: passthrough_schema(),
        read_only,
        validation,
    }
}

// ============================================================================
// SECTION: Run Functions
// ============================================================================

/// Reads a user.
fn run_user_get(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: UserArgs = decode(arguments)?;
    client.get_user(&args.environment_id, &args.user_id).map_err(map_api_error)
}

/// Creates a user.
fn run_user_create(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: CreateArgs = decode(arguments)?;
    client.create_user(&args.environment_id, &args.body).map_err(map_api_error)
}

/// Updates a user.
fn run_user_update(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: UserUpdateArgs = decode(arguments)?;
    client
        .update_user(&args.environment_id, &args.user_id, &args.body)
        .map_err(map_api_error)
}

/// Deletes a user.
fn run_user_delete(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: UserArgs = decode(arguments)?;
    client.delete_user(&args.environment_id, &args.user_id).map_err(map_api_error)
}

/// Reads a group.
fn run_group_get(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: GroupArgs = decode(arguments)?;
    client.get_group(&args.environment_id, &args.group_id).map_err(map_api_error)
}

/// Creates a group.
fn run_group_create(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: CreateArgs = decode(arguments)?;
    client.create_group(&args.environment_id, &args.body).map_err(map_api_error)
}

/// Deletes a group.
fn run_group_delete(client: &IdentityApiClient, arguments: Value) -> Result<Value, ToolRunError> {
    let args: GroupArgs = decode(arguments)?;
    client.delete_group(&args.environment_id, &args.group_id).map_err(map_api_error)
}

/// Lists populations.
fn run_population_list(
    client: &IdentityApiClient,
    arguments: Value,
) -> Result<Value, ToolRunError> {
    let args: EnvironmentArgs = decode(arguments)?;
    client.list_populations(&args.environment_id).map_err(map_api_error)
}

/// Creates a population.
fn run_population_create(
    client: &IdentityApiClient,
    arguments: Value,
) -> Result<Value, ToolRunError> {
    let args: CreateArgs = decode(arguments)?;
    client.create_population(&args.environment_id, &args.body).map_err(map_api_error)
}

/// Deletes a population.
fn run_population_delete(
    client: &IdentityApiClient,
    arguments: Value,
) -> Result<Value, ToolRunError> {
    let args: PopulationArgs = decode(arguments)?;
    client
        .delete_population(&args.environment_id, &args.population_id)
        .map_err(map_api_error)
}

/// Lists environments.
fn run_environment_list(
    client: &IdentityApiClient,
    _arguments: Value,
) -> Result<Value, ToolRunError> {
    client.list_environments().map_err(map_api_error)
}

/// Reads an environment.
fn run_environment_get(
    client: &IdentityApiClient,
    arguments: Value,
) -> Result<Value, ToolRunError> {
    let args: EnvironmentArgs = decode(arguments)?;
    client.get_environment(&args.environment_id).map_err(map_api_error)
}

// ============================================================================
// SECTION: Registry Construction
// ============================================================================

/// Builds the full tool registry over a shared downstream client.
///
/// # Errors
///
/// Returns [`RegistryError`] when two definitions share a name, which is a
/// startup bug rather than a runtime condition.
pub fn build_registry(client: &Arc<IdentityApiClient>) -> Result<ToolRegistry, RegistryError> {
    let definitions: Vec<(ToolDescriptor, RunFn)> = vec![
        (
            descriptor(
                "user_get",
                "Read user",
                "Reads a single user from an environment.",
                child_schema("userId"),
                true,
                ValidationPolicy::AllowProtectedReads,
            ),
            run_user_get,
        ),
        (
            descriptor(
                "user_create",
                "Create user",
                "Creates a user in an environment.",
                create_schema(),
                false,
                ValidationPolicy::Enforce,
            ),
            run_user_create,
        ),
        (
            descriptor(
                "user_update",
                "Update user",
                "Replaces a user's representation.",
                user_update_schema(),
                false,
                ValidationPolicy::Enforce,
            ),
            run_user_update,
        ),
        (
            descriptor(
                "user_delete",
                "Delete user",
                "Deletes a user from an environment.",
                child_schema("userId"),
                false,
                ValidationPolicy::Enforce,
            ),
            run_user_delete,
        ),
        (
            descriptor(
                "group_get",
                "Read group",
                "Reads a single group from an environment.",
                child_schema("groupId"),
                true,
                ValidationPolicy::AllowProtectedReads,
            ),
            run_group_get,
        ),
        (
            descriptor(
                "group_create",
                "Create group",
                "Creates a group in an environment.",
                create_schema(),
                false,
                ValidationPolicy::Enforce,
            ),
            run_group_create,
        ),
        (
            descriptor(
                "group_delete",
                "Delete group",
                "Deletes a group from an environment.",
                child_schema("groupId"),
                false,
                ValidationPolicy::Enforce,
            ),
            run_group_delete,
        ),
        (
            descriptor(
                "population_list",
                "List populations",
                "Lists populations in an environment.",
                environment_schema(),
                true,
                ValidationPolicy::AllowProtectedReads,
            ),
            run_population_list,
        ),
        (
            descriptor(
                "population_create",
                "Create population",
                "Creates a population in an environment.",
                create_schema(),
                false,
                ValidationPolicy::Enforce,
            ),
            run_population_create,
        ),
        (
            descriptor(
                "population_delete",
                "Delete population",
                "Deletes a population from an environment.",
                child_schema("populationId"),
                false,
                ValidationPolicy::Enforce,
            ),
            run_population_delete,
        ),
        (
            descriptor(
                "environment_list",
                "List environments",
                "Lists environments visible to the configured client.",
                json!({"type": "object", "properties": {}, "additionalProperties": false}),
                true,
                ValidationPolicy::Skip,
            ),
            run_environment_list,
        ),
        (
            descriptor(
                "environment_get",
                "Read environment",
                "Reads a single environment, including its tier.",
                environment_schema(),
                true,
                ValidationPolicy::AllowProtectedReads,
            ),
            run_environment_get,
        ),
    ];

    let mut registry = ToolRegistry::new();
    for (descriptor, run) in definitions {
        registry.register(Arc::new(ApiTool {
            descriptor,
            client: Arc::clone(client),
            run,
        }))?;
    }
    Ok(registry)
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

    use serde_json::json;

    use super::ToolRunError;
    use super::UserArgs;
    use super::decode;

    #[test]
    fn decode_rejects_unknown_argument_fields() {
        let result: Result<UserArgs, _> = decode(json!({
            "environmentId": "env-1",
            "userId": "u-1",
            "extra": true
        }));
        assert!(matches!(result, Err(ToolRunError::Invalid(_))));
    }

    #[test]
    fn decode_accepts_camel_case_arguments() {
        let args: UserArgs = decode(json!({
            "environmentId": "env-1",
            "userId": "u-1"
        }))
        .expect("decode failed");
        assert_eq!(args.environment_id, "env-1");
        assert_eq!(args.user_id, "u-1");
    }

    #[test]
    fn missing_required_argument_is_invalid() {
        let result: Result<UserArgs, _> = decode(json!({"environmentId": "env-1"}));
        assert!(matches!(result, Err(ToolRunError::Invalid(_))));
    }
}
