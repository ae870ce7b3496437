// identity-gate-mcp/src/config.rs
// ============================================================================
// Module: Gateway Configuration
// Description: Configuration loading and validation for the gateway.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits and a
//! validation pass that fails closed. Missing or invalid configuration never
//! degrades to permissive defaults: HTTP transport requires either a shared
//! secret of sane length or an explicit insecure opt-in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "identity-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "IDENTITY_GATE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Minimum shared secret length in bytes.
const MIN_SHARED_SECRET_LENGTH: usize = 16;
/// Maximum shared secret length in bytes.
const MAX_SHARED_SECRET_LENGTH: usize = 256;
/// Default maximum request body size in bytes.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Maximum allowed request body size in bytes.
const MAX_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Default downstream request timeout in milliseconds.
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Minimum downstream request timeout in milliseconds.
const MIN_REQUEST_TIMEOUT_MS: u64 = 500;
/// Maximum downstream request timeout in milliseconds.
const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Server transport configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Downstream identity service configuration.
    pub downstream: DownstreamConfig,
    /// Tier validation configuration.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Transport selection for the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTransport {
    /// Line-oriented stdio transport.
    Stdio,
    /// HTTP transport.
    Http,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Selected transport.
    #[serde(default = "default_transport")]
    pub transport: ServerTransport,
    /// Bind address for the HTTP transport.
    #[serde(default)]
    pub bind: Option<String>,
    /// Shared secret required on protected HTTP routes.
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Disables the shared-secret check for local/testing use.
    #[serde(default)]
    pub insecure: bool,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            bind: None,
            shared_secret: None,
            insecure: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Downstream identity service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DownstreamConfig {
    /// Base URL of the identity API.
    pub api_base_url: String,
    /// Base URL of the authorization server.
    pub auth_base_url: String,
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Downstream request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Tier validation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Whether the tier validation gate is active.
    #[serde(default = "default_validation_enabled")]
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: default_validation_enabled(),
        }
    }
}

/// Default transport selection.
const fn default_transport() -> ServerTransport {
    ServerTransport::Stdio
}

/// Default maximum request body size.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default downstream request timeout.
const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Validation is on unless explicitly disabled.
const fn default_validation_enabled() -> bool {
    true
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("config read failed: {0}")]
    Io(String),
    /// The config file exceeded the size limit.
    #[error("config file too large")]
    TooLarge,
    /// The config file was not valid TOML.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// The config was well-formed but invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl GatewayConfig {
    /// Loads configuration from an explicit path, the environment override,
    /// or the default filename, in that order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, oversized,
    /// unparseable, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved: PathBuf = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => env::var(CONFIG_ENV_VAR)
                .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from),
        };
        let metadata = fs::metadata(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge);
        }
        let raw = fs::read_to_string(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        let config: Self =
            toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, failing closed on ambiguity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.downstream.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    /// Validates transport and secret settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.transport == ServerTransport::Http {
            let bind = self
                .bind
                .as_ref()
                .ok_or_else(|| ConfigError::Invalid("http transport requires server.bind".to_string()))?;
            bind.parse::<SocketAddr>()
                .map_err(|_| ConfigError::Invalid("server.bind is not a socket address".to_string()))?;
            match (&self.shared_secret, self.insecure) {
                (Some(_), true) => {
                    return Err(ConfigError::Invalid(
                        "server.shared_secret and server.insecure are mutually exclusive"
                            .to_string(),
                    ));
                }
                (None, false) => {
                    return Err(ConfigError::Invalid(
                        "http transport requires server.shared_secret or explicit server.insecure"
                            .to_string(),
                    ));
                }
                (Some(secret), false) => {
                    if secret.len() < MIN_SHARED_SECRET_LENGTH
                        || secret.len() > MAX_SHARED_SECRET_LENGTH
                    {
                        return Err(ConfigError::Invalid(
                            "server.shared_secret length out of range".to_string(),
                        ));
                    }
                }
                (None, true) => {}
            }
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid("server.max_body_bytes out of range".to_string()));
        }
        Ok(())
    }
}

impl DownstreamConfig {
    /// Validates downstream endpoints and credentials.
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("downstream.api_base_url", &self.api_base_url),
            ("downstream.auth_base_url", &self.auth_base_url),
        ] {
            let url = Url::parse(value)
                .map_err(|_| ConfigError::Invalid(format!("{field} is not a valid url")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Invalid(format!("{field} must be http or https")));
            }
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Invalid("downstream.client_id must not be empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "downstream.client_secret must not be empty".to_string(),
            ));
        }
        if self.request_timeout_ms < MIN_REQUEST_TIMEOUT_MS
            || self.request_timeout_ms > MAX_REQUEST_TIMEOUT_MS
        {
            return Err(ConfigError::Invalid(
                "downstream.request_timeout_ms out of range".to_string(),
            ));
        }
        Ok(())
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
        reason = "Test-only panic-based assertions and fixtures."
    )]

    use std::io::Write;

    use super::ConfigError;
    use super::GatewayConfig;

    fn parse(raw: &str) -> Result<GatewayConfig, ConfigError> {
        let config: GatewayConfig =
            toml::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    const STDIO_CONFIG: &str = r#"
        [downstream]
        api_base_url = "https://api.example.test/v1"
        auth_base_url = "https://auth.example.test"
        client_id = "client-1"
        client_secret = "secret-1"
    "#;

    #[test]
    fn stdio_config_with_defaults_is_valid() {
        let config = parse(STDIO_CONFIG).expect("config invalid");
        assert!(config.validation.enabled);
        assert!(config.server.shared_secret.is_none());
    }

    #[test]
    fn http_transport_requires_bind_address() {
        let raw = format!(
            "[server]\ntransport = \"http\"\ninsecure = true\n{STDIO_CONFIG}"
        );
        let result = parse(&raw);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn http_transport_requires_secret_or_insecure_opt_in() {
        let raw = format!(
            "[server]\ntransport = \"http\"\nbind = \"127.0.0.1:8080\"\n{STDIO_CONFIG}"
        );
        let result = parse(&raw);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn short_shared_secret_is_rejected() {
        let raw = format!(
            "[server]\ntransport = \"http\"\nbind = \"127.0.0.1:8080\"\nshared_secret = \"short\"\n{STDIO_CONFIG}"
        );
        let result = parse(&raw);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn insecure_mode_with_secret_is_contradictory() {
        let raw = format!(
            "[server]\ntransport = \"http\"\nbind = \"127.0.0.1:8080\"\ninsecure = true\nshared_secret = \"0123456789abcdef\"\n{STDIO_CONFIG}"
        );
        let result = parse(&raw);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn non_http_downstream_url_is_rejected() {
        let raw = r#"
            [downstream]
            api_base_url = "ftp://api.example.test"
            auth_base_url = "https://auth.example.test"
            client_id = "client-1"
            client_secret = "secret-1"
        "#;
        assert!(matches!(parse(raw), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reads_validated_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile failed");
        file.write_all(STDIO_CONFIG.as_bytes()).expect("write failed");
        let config = GatewayConfig::load(Some(file.path())).expect("load failed");
        assert_eq!(config.downstream.client_id, "client-1");
    }
}
