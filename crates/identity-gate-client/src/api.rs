// identity-gate-client/src/api.rs
// ============================================================================
// Module: Identity API Client
// Description: Domain operations against the downstream identity service.
// Purpose: Wrap every outbound call with credential attachment and a single
//          refresh-and-retry on unauthorized responses.
// Dependencies: reqwest, serde_json, thiserror, url
// ============================================================================

//! ## Overview
//! One method per domain operation, each a thin wrapper over a shared
//! execute path: attach the current token, perform the call, and on an
//! unauthorized response discard the body, refresh once through the
//! credential manager, and retry exactly once. A second unauthorized
//! response surfaces as an error without further retries. Response bodies
//! are read with a hard size bound.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::auth::AuthError;
use crate::auth::CredentialManager;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum downstream response size (bytes).
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default downstream request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum length of a single path segment (resource identifier).
const MAX_SEGMENT_LENGTH: usize = 256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Downstream API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential acquisition or refresh failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// The retried request was rejected again; no second refresh occurs.
    #[error("unauthorized after token refresh")]
    Unauthorized,
    /// The request could not be sent or the response could not be read.
    #[error("downstream request failed: {0}")]
    Transport(String),
    /// The downstream service answered with a non-success status.
    #[error("downstream returned status {status}")]
    Status {
        /// HTTP status code returned by the downstream service.
        status: u16,
        /// Bounded response body for diagnostics.
        body: String,
    },
    /// The response body was not valid JSON.
    #[error("invalid downstream response: {0}")]
    Decode(String),
    /// A caller-supplied resource identifier was unusable.
    #[error("invalid resource identifier: {0}")]
    InvalidIdentifier(String),
}

impl ApiError {
    /// Returns the downstream HTTP status when one was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status {
                status, ..
            } => Some(*status),
            Self::Unauthorized => Some(401),
            Self::Auth(_) | Self::Transport(_) | Self::Decode(_) | Self::InvalidIdentifier(_) => {
                None
            }
        }
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Identity API client configuration.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the identity API.
    pub api_base_url: String,
    /// Downstream request timeout.
    pub request_timeout: Duration,
    /// Maximum downstream response size (bytes).
    pub max_body_bytes: usize,
}

impl ApiClientConfig {
    /// Builds a configuration with default timeout and body limits.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Downstream identity API client.
pub struct IdentityApiClient {
    /// Blocking HTTP client for downstream calls.
    http: Client,
    /// Validated base URL of the identity API, without a trailing slash.
    base_url: String,
    /// Credential lifecycle manager.
    credentials: Arc<CredentialManager>,
    /// Maximum downstream response size (bytes).
    max_body_bytes: usize,
}

impl IdentityApiClient {
    /// Builds a client from configuration and a credential manager.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        config: ApiClientConfig,
        credentials: Arc<CredentialManager>,
    ) -> Result<Self, ApiError> {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|_| ApiError::Transport("invalid api base url".to_string()))?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|_| ApiError::Transport("http client build failed".to_string()))?;
        Ok(Self {
            http,
            base_url,
            credentials,
            max_body_bytes: config.max_body_bytes,
        })
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Reads a user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn get_user(&self, environment_id: &str, user_id: &str) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "users", user_id])?;
        self.execute(Method::GET, &path, None)
    }

    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn create_user(&self, environment_id: &str, body: &Value) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "users"])?;
        self.execute(Method::POST, &path, Some(body))
    }

    /// Updates a user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn update_user(
        &self,
        environment_id: &str,
        user_id: &str,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "users", user_id])?;
        self.execute(Method::PUT, &path, Some(body))
    }

    /// Deletes a user.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn delete_user(&self, environment_id: &str, user_id: &str) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "users", user_id])?;
        self.execute(Method::DELETE, &path, None)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Reads a group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn get_group(&self, environment_id: &str, group_id: &str) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "groups", group_id])?;
        self.execute(Method::GET, &path, None)
    }

    /// Creates a group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn create_group(&self, environment_id: &str, body: &Value) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "groups"])?;
        self.execute(Method::POST, &path, Some(body))
    }

    /// Deletes a group.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn delete_group(&self, environment_id: &str, group_id: &str) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "groups", group_id])?;
        self.execute(Method::DELETE, &path, None)
    }

    // ------------------------------------------------------------------
    // Populations
    // ------------------------------------------------------------------

    /// Lists populations in an environment.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn list_populations(&self, environment_id: &str) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "populations"])?;
        self.execute(Method::GET, &path, None)
    }

    /// Creates a population.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn create_population(&self, environment_id: &str, body: &Value) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "populations"])?;
        self.execute(Method::POST, &path, Some(body))
    }

    /// Deletes a population.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn delete_population(
        &self,
        environment_id: &str,
        population_id: &str,
    ) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id, "populations", population_id])?;
        self.execute(Method::DELETE, &path, None)
    }

    // ------------------------------------------------------------------
    // Environments
    // ------------------------------------------------------------------

    /// Lists environments visible to the client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn list_environments(&self) -> Result<Value, ApiError> {
        self.execute(Method::GET, "environments", None)
    }

    /// Reads a single environment.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the downstream call fails.
    pub fn get_environment(&self, environment_id: &str) -> Result<Value, ApiError> {
        let path = join_path(&["environments", environment_id])?;
        self.execute(Method::GET, &path, None)
    }

    // ------------------------------------------------------------------
    // Execute path
    // ------------------------------------------------------------------

    /// Executes a downstream call with credential attachment and a single
    /// refresh-and-retry on an unauthorized response.
    fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let (token, generation) = self.credentials.token()?;
        let response = self.send(method.clone(), path, body, &token)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.decode(response);
        }
        // Unauthorized: discard the body, refresh once, retry once.
        drop(response);
        let token = self.credentials.refresh(generation)?;
        let retry = self.send(method, path, body, &token)?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        self.decode(retry)
    }

    /// Sends a single request with the given token attached.
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, ApiError> {
        let url = format!("{}/{path}", self.base_url);
        let mut builder = self.http.request(method, &url).bearer_auth(token);
        if let Some(payload) = body {
            builder = builder.json(payload);
        }
        builder.send().map_err(|err| {
            if err.is_timeout() {
                ApiError::Transport("downstream request timed out".to_string())
            } else {
                ApiError::Transport("downstream request failed".to_string())
            }
        })
    }

    /// Decodes a downstream response into a JSON payload.
    fn decode(&self, mut response: Response) -> Result<Value, ApiError> {
        let status = response.status();
        let bytes = read_bounded_body(&mut response, self.max_body_bytes)?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|_| ApiError::Decode("response body is not valid json".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Joins validated path segments into a relative request path.
fn join_path(segments: &[&str]) -> Result<String, ApiError> {
    let mut validated = Vec::with_capacity(segments.len());
    for segment in segments {
        validated.push(validate_segment(segment)?);
    }
    Ok(validated.join("/"))
}

/// Validates a caller-supplied path segment.
///
/// Identifiers are restricted to a conservative character set so they cannot
/// alter the request path.
fn validate_segment(segment: &str) -> Result<&str, ApiError> {
    if segment.is_empty() || segment.len() > MAX_SEGMENT_LENGTH {
        return Err(ApiError::InvalidIdentifier("identifier length out of range".to_string()));
    }
    if !segment.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_') {
        return Err(ApiError::InvalidIdentifier(format!(
            "identifier contains unsupported characters: {segment}"
        )));
    }
    Ok(segment)
}

/// Reads a response body with a hard size bound.
fn read_bounded_body(response: &mut Response, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    let max_bytes_u64 = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if let Some(length) = response.content_length()
        && length > max_bytes_u64
    {
        return Err(ApiError::Transport("downstream response too large".to_string()));
    }
    let mut limited = response.take(max_bytes_u64.saturating_add(1));
    let mut buf = Vec::new();
    limited
        .read_to_end(&mut buf)
        .map_err(|_| ApiError::Transport("downstream response read failed".to_string()))?;
    if buf.len() > max_bytes {
        return Err(ApiError::Transport("downstream response too large".to_string()));
    }
    Ok(buf)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
