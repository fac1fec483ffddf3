//! Request dispatcher: client text in, [`ClientResponse`] out.
//!
//! # Accepted input
//!
//! The voting front-end and older tools disagree on the request format, so the
//! dispatcher accepts all of them:
//!
//! | Input                                              | Meaning                  |
//! |----------------------------------------------------|--------------------------|
//! | `{"action":"VERIFY_BIOMETRIC","voterId":"V123"}`   | canonical envelope       |
//! | `{"type":"verify","voterId":"V123"}`               | front-end envelope       |
//! | `{"action":"enroll","voterId":42,"requestId":"a"}` | numeric id, echoed id    |
//! | `"AUTHENTICATE"`                                   | JSON string holding a token |
//! | `VERIFY_BIOMETRIC V123`                            | bare text                |
//!
//! Action names are case-insensitive.  Everything that fails validation is
//! answered immediately and never reaches the device.

use biometric_core::{CommandError, DeviceAction, DeviceCommand, DeviceReply};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::device_port::{DeviceRequester, GatewayError};
use crate::domain::config::ActionTimeouts;
use crate::domain::messages::{ClientResponse, FailureKind};

/// Reasons a client request is rejected before reaching the device.
///
/// The `Display` text is exactly what the client sees in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Unrecognized input")]
    UnrecognizedInput,

    #[error("action is required")]
    MissingAction,

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("voterId is required")]
    MissingSubject,

    #[error("voterId contains invalid characters")]
    InvalidSubject,
}

impl From<CommandError> for DispatchError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::MissingSubject { .. } => DispatchError::MissingSubject,
            CommandError::InvalidSubject => DispatchError::InvalidSubject,
        }
    }
}

/// A parsed client message: the validated command (or why it is invalid) and
/// the client's correlation id, which is echoed even on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCommand {
    pub request_id: Option<Value>,
    pub command: Result<DeviceCommand, DispatchError>,
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses one client message.  Never touches the device.
pub fn parse_client_message(raw: &str) -> InboundCommand {
    let text = raw.trim();

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => InboundCommand {
            request_id: map.get("requestId").filter(|v| !v.is_null()).cloned(),
            command: parse_envelope(&map),
        },
        Ok(Value::String(token)) => InboundCommand {
            request_id: None,
            command: parse_bare(&token),
        },
        Ok(_) => InboundCommand {
            request_id: None,
            command: Err(DispatchError::UnrecognizedInput),
        },
        Err(_) => InboundCommand {
            request_id: None,
            command: parse_bare(text),
        },
    }
}

fn parse_envelope(map: &Map<String, Value>) -> Result<DeviceCommand, DispatchError> {
    let name = match map.get("action").or_else(|| map.get("type")) {
        None | Some(Value::Null) => return Err(DispatchError::MissingAction),
        Some(Value::String(s)) if s.trim().is_empty() => return Err(DispatchError::MissingAction),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(DispatchError::UnknownAction(other.to_string())),
    };

    let action =
        DeviceAction::from_name(&name).ok_or(DispatchError::UnknownAction(name))?;

    let subject = match map.get("voterId").or_else(|| map.get("voter_id")) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(_) if action.requires_subject() => return Err(DispatchError::InvalidSubject),
        Some(_) => None,
    };

    Ok(DeviceCommand::new(action, subject)?)
}

/// `ACTION` or `ACTION SUBJECT`.
fn parse_bare(text: &str) -> Result<DeviceCommand, DispatchError> {
    let text = text.trim();
    let (token, rest) = match text.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (text, ""),
    };

    let action = DeviceAction::from_name(token).ok_or(DispatchError::UnrecognizedInput)?;
    let subject = (!rest.is_empty()).then(|| rest.to_string());

    Ok(DeviceCommand::new(action, subject)?)
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Validates client requests and runs them against the device with the
/// per-action deadline.
#[derive(Debug, Clone)]
pub struct Dispatcher<R> {
    requester: R,
    timeouts: ActionTimeouts,
}

impl<R: DeviceRequester> Dispatcher<R> {
    pub fn new(requester: R, timeouts: ActionTimeouts) -> Self {
        Self {
            requester,
            timeouts,
        }
    }

    /// Handles one raw client message and shapes the outcome into an envelope.
    pub async fn handle(&self, raw: &str) -> ClientResponse {
        let inbound = parse_client_message(raw);

        let response = match inbound.command {
            Ok(command) => self.execute(command).await,
            Err(e) => {
                debug!("rejected client request: {e}");
                ClientResponse::failure(FailureKind::Validation, e.to_string())
            }
        };

        response.with_request_id(inbound.request_id)
    }

    /// Runs an already-validated command and returns the raw device reply.
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`] from the device port.
    pub async fn dispatch(&self, command: DeviceCommand) -> Result<DeviceReply, GatewayError> {
        let deadline = self.timeouts.for_action(command.action());
        info!(action = %command.action(), ?deadline, "dispatching device request");
        debug!(subject = ?command.subject(), "request subject");
        self.requester.request(command, deadline).await
    }

    async fn execute(&self, command: DeviceCommand) -> ClientResponse {
        let action = command.action();
        match self.dispatch(command).await {
            Ok(reply) => ClientResponse::success(action, reply.into_value()),
            Err(e) => {
                warn!(%action, "device request failed: {e}");
                ClientResponse::failure(e.failure_kind(), e.client_message())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
