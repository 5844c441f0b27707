//! Request and Response message types.
//!
//! Defines the envelope of a command sent to the browser and of the reply
//! that answers it.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Request
// ============================================================================

/// A command request from local end to the browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Domain.method",
///   "params": { ... },
///   "sessionId": "optional-flat-session"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    /// Unique identifier for request/response correlation.
    pub id: RequestId,

    /// Command name in `Domain.method` format.
    pub method: &'a str,

    /// Command parameters. Omitted from the wire when `null`.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: &'a Value,

    /// Flat session the command is scoped to.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a SessionId>,
}

impl<'a> Request<'a> {
    /// Creates a request on the root connection.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, method: &'a str, params: &'a Value) -> Self {
        Self {
            id,
            method,
            params,
            session_id: None,
        }
    }

    /// Scopes the request to a flat session.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: Option<&'a SessionId>) -> Self {
        self.session_id = session_id;
        self
    }
}

// ============================================================================
// Response
// ============================================================================

/// A reply from the browser to a command.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": 7, "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the command `id`.
    pub id: RequestId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error details (if error).
    #[serde(default)]
    pub error: Option<RemoteError>,

    /// Session the reply was sent from. Not needed for correlation.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Response {
    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// A reply carrying neither field resolves to `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the response was an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::protocol(error.code, error.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// Error object carried by a failed reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    /// Error code.
    pub code: i64,

    /// Human readable message.
    #[serde(default)]
    pub message: String,

    /// Additional details, when provided.
    #[serde(default)]
    pub data: Option<Value>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let params = json!({"url": "https://example.com"});
        let request = Request::new(RequestId::new(3), "Page.navigate", &params);
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            json,
            json!({"id": 3, "method": "Page.navigate", "params": {"url": "https://example.com"}})
        );
    }

    #[test]
    fn test_request_with_session() {
        let params = Value::Null;
        let session_id = SessionId::from("S1");
        let request =
            Request::new(RequestId::new(9), "Runtime.enable", &params).with_session(Some(&session_id));
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json, json!({"id": 9, "method": "Runtime.enable", "sessionId": "S1"}));
    }

    #[test]
    fn test_success_response() {
        let response: Response =
            serde_json::from_str(r#"{"id": 1, "result": {"frameId": "F"}}"#).expect("parse");
        assert!(!response.is_error());

        let result = response.into_result().expect("should succeed");
        assert_eq!(result, json!({"frameId": "F"}));
    }

    #[test]
    fn test_error_response() {
        let response: Response = serde_json::from_str(
            r#"{"id": 2, "error": {"code": -32000, "message": "No target with given id"}}"#,
        )
        .expect("parse");
        assert!(response.is_error());

        let err = response.into_result().unwrap_err();
        assert!(matches!(err, Error::Protocol { code: -32000, ref message } if message == "No target with given id"));
    }

    #[test]
    fn test_empty_response_is_null() {
        let response: Response =
            serde_json::from_str(r#"{"id": 5, "sessionId": "S"}"#).expect("parse");
        assert_eq!(response.session_id, Some(SessionId::from("S")));
        assert_eq!(response.into_result().expect("ok"), Value::Null);
    }
}
