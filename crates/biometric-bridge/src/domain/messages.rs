//! Client-facing message types.
//!
//! Every request a client sends, over WebSocket or HTTP, is answered with one
//! [`ClientResponse`] envelope:
//!
//! ```json
//! {"success":true,"action":"VERIFY_BIOMETRIC","payload":{"status":"VERIFIED","voterId":"V123"}}
//! {"success":false,"error":"Timeout waiting for device"}
//! ```
//!
//! If the client supplied a `requestId`, it is echoed back unchanged so that
//! clients pipelining several requests over one socket can match replies.
//!
//! Device replies pushed on the broadcast feed are *not* wrapped: sessions
//! receive the raw device JSON object.

use biometric_core::DeviceAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a request failed.  Drives the HTTP status code; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request was rejected before touching the device.
    Validation,
    /// The device did not answer before the deadline.
    Timeout,
    /// Writing the command to the link failed.
    Transport,
    /// The serial link is closed.
    LinkClosed,
    /// Another request is in flight and the busy policy is `reject`.
    Busy,
}

/// The envelope returned for every client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<DeviceAction>,

    /// The device reply object, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Human-readable failure reason, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Echo of the client's `requestId`, if any.
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<Value>,

    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl ClientResponse {
    /// A success envelope carrying the device's reply.
    pub fn success(action: DeviceAction, payload: Value) -> Self {
        Self {
            success: true,
            action: Some(action),
            payload: Some(payload),
            error: None,
            request_id: None,
            failure: None,
        }
    }

    /// A failure envelope.
    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            payload: None,
            error: Some(error.into()),
            request_id: None,
            failure: Some(kind),
        }
    }

    /// Attaches the client's correlation id.
    pub fn with_request_id(mut self, request_id: Option<Value>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Serializes the envelope for a WebSocket text frame.
    pub fn to_json(&self) -> String {
        // Serializing a struct of strings, bools and `Value`s cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to serialize response"}"#.to_string()
        })
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `"ok"` while the serial link is open, `"degraded"` otherwise.
    pub status: String,
    pub link_open: bool,
    /// Number of connected WebSocket sessions.
    pub sessions: usize,
}

impl HealthReport {
    pub fn new(link_open: bool, sessions: usize) -> Self {
        Self {
            status: if link_open { "ok" } else { "degraded" }.to_string(),
            link_open,
            sessions,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        // Arrange
        let resp = ClientResponse::success(
            DeviceAction::VerifyBiometric,
            json!({"status": "VERIFIED", "voterId": "V123"}),
        );

        // Act
        let value: Value = serde_json::from_str(&resp.to_json()).unwrap();

        // Assert
        assert_eq!(
            value,
            json!({
                "success": true,
                "action": "VERIFY_BIOMETRIC",
                "payload": {"status": "VERIFIED", "voterId": "V123"}
            })
        );
    }

    #[test]
    fn test_failure_envelope_omits_empty_fields() {
        let resp = ClientResponse::failure(FailureKind::Validation, "voterId is required");
        let value: Value = serde_json::from_str(&resp.to_json()).unwrap();
        assert_eq!(value, json!({"success": false, "error": "voterId is required"}));
    }

    #[test]
    fn test_failure_kind_is_not_serialized() {
        let resp = ClientResponse::failure(FailureKind::Timeout, "Timeout waiting for device");
        assert!(!resp.to_json().contains("failure"));
        assert_eq!(resp.failure, Some(FailureKind::Timeout));
    }

    #[test]
    fn test_request_id_is_echoed_as_camel_case() {
        let resp = ClientResponse::failure(FailureKind::Busy, "Device busy")
            .with_request_id(Some(json!(42)));
        let value: Value = serde_json::from_str(&resp.to_json()).unwrap();
        assert_eq!(value["requestId"], 42);
    }

    #[test]
    fn test_health_report_status() {
        assert_eq!(HealthReport::new(true, 2).status, "ok");
        assert_eq!(HealthReport::new(false, 0).status, "degraded");
    }
}
