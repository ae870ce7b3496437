// identity-gate-core/src/protocol.rs
// ============================================================================
// Module: Message Codec
// Description: Versioned request/response envelope parsing and serialization.
// Purpose: Decode untrusted wire bytes and encode responses deterministically.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The codec parses raw bytes into the versioned envelope exchanged between
//! the assistant client and the gateway, and serializes responses back out.
//! Malformed bytes produce a parse error; a well-formed document with a
//! missing or mismatched protocol version tag, or an empty method, produces
//! an invalid-request error. Encoding failures degrade to a static fallback
//! error frame rather than silence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Protocol version tag required on every envelope.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Static error frame emitted when response serialization fails.
const FALLBACK_ERROR_FRAME: &str = r#"{"version":"2.0","id":null,"error":{"code":-32603,"message":"response serialization failed"}}"#;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Enumerated protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Raw bytes were not a well-formed envelope.
    ParseError,
    /// Envelope was well-formed but violated protocol requirements.
    InvalidRequest,
    /// Method or tool name is not known to the gateway.
    MethodNotFound,
    /// Request parameters were missing or malformed.
    InvalidParams,
    /// Request failed inside the gateway or a tool run function.
    Internal,
}

impl ErrorCode {
    /// Returns the wire integer for the error code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
        }
    }
}

// ============================================================================
// SECTION: Envelope Types
// ============================================================================

/// Decoded request envelope.
///
/// # Invariants
/// - `id` is caller-supplied and opaque; it round-trips unchanged into the
///   response, including an explicit null.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// Protocol version tag.
    pub version: String,
    /// Caller-supplied request identifier.
    #[serde(default)]
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Structured method parameters.
    #[serde(default)]
    pub params: Value,
}

/// Response envelope carrying either a result or an error.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Protocol version tag.
    pub version: &'static str,
    /// Request identifier echoed from the request.
    pub id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

/// Error payload for failed requests.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    /// Enumerated error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// Builds a success response echoing the request id.
    #[must_use]
    pub const fn success(id: Value, result: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response echoing the request id.
    #[must_use]
    pub fn failure(id: Value, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::failure_with_data(id, code, message, None)
    }

    /// Builds an error response with structured diagnostics attached.
    #[must_use]
    pub fn failure_with_data(
        id: Value,
        code: ErrorCode,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            result: None,
            error: Some(ErrorObject {
                code: code.code(),
                message: message.into(),
                data,
            }),
        }
    }

    /// Builds the response for a decode failure.
    ///
    /// Parse errors are keyed to a null id because no id could be recovered
    /// from the malformed bytes; invalid requests echo the recovered id.
    #[must_use]
    pub fn from_decode_error(error: DecodeError) -> Self {
        match error {
            DecodeError::Parse(message) => {
                Self::failure(Value::Null, ErrorCode::ParseError, message)
            }
            DecodeError::InvalidRequest {
                id,
                reason,
            } => Self::failure(id, ErrorCode::InvalidRequest, reason),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope decode errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Raw bytes were not a well-formed envelope document.
    #[error("parse error: {0}")]
    Parse(String),
    /// Envelope was well-formed but violated protocol requirements.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Request identifier recovered from the envelope.
        id: Value,
        /// Reason the envelope was rejected.
        reason: String,
    },
}

// ============================================================================
// SECTION: Codec Functions
// ============================================================================

/// Decodes raw bytes into a request envelope.
///
/// # Errors
///
/// Returns [`DecodeError::Parse`] for malformed bytes and
/// [`DecodeError::InvalidRequest`] when the protocol version tag is absent or
/// mismatched or the method is empty.
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|_| DecodeError::Parse("invalid request envelope".to_string()))?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(DecodeError::InvalidRequest {
            id: envelope.id,
            reason: format!("unsupported protocol version: {}", envelope.version),
        });
    }
    if envelope.method.is_empty() {
        return Err(DecodeError::InvalidRequest {
            id: envelope.id,
            reason: "method must not be empty".to_string(),
        });
    }
    Ok(envelope)
}

/// Serializes a response envelope deterministically.
///
/// Serialization failures degrade to a static generic error frame so the
/// caller always receives a response.
#[must_use]
pub fn encode(response: &Response) -> Vec<u8> {
    serde_json::to_vec(response).unwrap_or_else(|_| FALLBACK_ERROR_FRAME.as_bytes().to_vec())
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
        reason = "Test-only panic-based assertions."
    )]

    use serde_json::Value;
    use serde_json::json;

    use super::DecodeError;
    use super::ErrorCode;
    use super::FALLBACK_ERROR_FRAME;
    use super::Response;
    use super::decode;
    use super::encode;

    #[test]
    fn decode_accepts_minimal_envelope() {
        let bytes = br#"{"version":"2.0","id":7,"method":"tools/list","params":{}}"#;
        let envelope = decode(bytes).expect("decode failed");
        assert_eq!(envelope.id, json!(7));
        assert_eq!(envelope.method, "tools/list");
    }

    #[test]
    fn decode_defaults_missing_id_and_params_to_null() {
        let bytes = br#"{"version":"2.0","method":"initialize"}"#;
        let envelope = decode(bytes).expect("decode failed");
        assert_eq!(envelope.id, Value::Null);
        assert_eq!(envelope.params, Value::Null);
    }

    #[test]
    fn decode_rejects_malformed_bytes_as_parse_error() {
        let result = decode(b"{not json");
        assert!(matches!(result, Err(DecodeError::Parse(_))));
    }

    #[test]
    fn decode_rejects_version_mismatch_with_recovered_id() {
        let bytes = br#"{"version":"1.0","id":3,"method":"tools/list"}"#;
        match decode(bytes) {
            Err(DecodeError::InvalidRequest {
                id, ..
            }) => assert_eq!(id, json!(3)),
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_empty_method() {
        let bytes = br#"{"version":"2.0","id":1,"method":""}"#;
        assert!(matches!(decode(bytes), Err(DecodeError::InvalidRequest { .. })));
    }

    #[test]
    fn response_id_round_trips_including_null() {
        for id in [Value::Null, json!(1), json!("abc")] {
            let response = Response::success(id.clone(), json!({}));
            let bytes = encode(&response);
            let value: Value = serde_json::from_slice(&bytes).expect("encode produced bad json");
            assert_eq!(value["id"], id);
            assert_eq!(value["version"], json!("2.0"));
        }
    }

    #[test]
    fn parse_error_response_is_keyed_to_null_id() {
        let response =
            Response::from_decode_error(DecodeError::Parse("invalid request envelope".to_string()));
        assert_eq!(response.id, Value::Null);
        let error = response.error.expect("missing error payload");
        assert_eq!(error.code, ErrorCode::ParseError.code());
    }

    #[test]
    fn fallback_frame_is_well_formed() {
        let value: Value =
            serde_json::from_str(FALLBACK_ERROR_FRAME).expect("fallback frame not json");
        assert_eq!(value["error"]["code"], json!(-32603));
        assert_eq!(value["id"], Value::Null);
    }

    #[test]
    fn failure_omits_result_field() {
        let response = Response::failure(json!(9), ErrorCode::MethodNotFound, "method not found");
        let bytes = encode(&response);
        let value: Value = serde_json::from_slice(&bytes).expect("encode produced bad json");
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], json!(-32601));
    }
}
