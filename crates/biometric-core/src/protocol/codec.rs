//! Device message codec.
//!
//! Two directions, two functions:
//!
//! ```text
//! Device → Bridge:  Frame          → decode_reply()   → DeviceReply
//! Bridge → Device:  DeviceCommand  → encode_command() → b"...\n"
//! ```
//!
//! # Decoding failures are expected
//!
//! The firmware shares its serial console between protocol replies and human
//! diagnostics (`"Waiting for finger..."`, `"Error image2Tz"`).  Those lines
//! are not JSON and decode to a [`CodecError`].  Callers log and drop them; a
//! decode failure must never be mistaken for a reply.

use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::framer::Frame;
use super::messages::{DeviceCommand, DeviceReply, WireMode};

/// Errors produced while decoding a device line or encoding a command.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not valid UTF-8.
    #[error("device line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The frame is text but not JSON.
    #[error("device line is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame is JSON, but not an object.
    #[error("device line is JSON but not an object")]
    NotAnObject,

    /// The command could not be serialized.
    #[error("failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),
}

// ── Device → Bridge ───────────────────────────────────────────────────────────

/// Decodes one framed line into a [`DeviceReply`].
///
/// # Errors
///
/// Returns [`CodecError::InvalidUtf8`], [`CodecError::InvalidJson`] or
/// [`CodecError::NotAnObject`]; the frame should then be dropped.
///
/// # Example
///
/// ```rust
/// use biometric_core::{decode_reply, Frame};
///
/// let reply = decode_reply(&Frame::from(r#"{"status":"VERIFIED","voterId":"V123"}"#)).unwrap();
/// assert_eq!(reply.status(), Some("VERIFIED"));
///
/// assert!(decode_reply(&Frame::from("NOT JSON GARBAGE")).is_err());
/// ```
pub fn decode_reply(frame: &Frame) -> Result<DeviceReply, CodecError> {
    let text = std::str::from_utf8(frame.as_bytes())?;
    let value: Value = serde_json::from_str(text.trim()).map_err(CodecError::InvalidJson)?;
    DeviceReply::new(value, Instant::now()).ok_or(CodecError::NotAnObject)
}

// ── Bridge → Device ───────────────────────────────────────────────────────────

/// JSON envelope written to the device in [`WireMode::Json`].
#[derive(Serialize)]
struct WireEnvelope<'a> {
    action: &'a str,
    #[serde(rename = "voterId", skip_serializing_if = "Option::is_none")]
    voter_id: Option<&'a str>,
}

/// Encodes `command` as exactly one newline-terminated line.
///
/// | Mode   | Enroll V7                                          | Authenticate              |
/// |--------|----------------------------------------------------|---------------------------|
/// | `Bare` | `ENROLL_BIOMETRIC\n`                               | `AUTHENTICATE\n`          |
/// | `Text` | `ENROLL_BIOMETRIC V7\n`                            | `AUTHENTICATE\n`          |
/// | `Json` | `{"action":"ENROLL_BIOMETRIC","voterId":"V7"}\n`   | `{"action":"AUTHENTICATE"}\n` |
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if JSON serialization fails.
pub fn encode_command(command: &DeviceCommand, mode: WireMode) -> Result<Vec<u8>, CodecError> {
    let action = command.action().as_str();
    let mut line = match (mode, command.subject()) {
        (WireMode::Bare, _) | (WireMode::Text, None) => action.as_bytes().to_vec(),
        (WireMode::Text, Some(subject)) => format!("{action} {subject}").into_bytes(),
        (WireMode::Json, voter_id) => serde_json::to_vec(&WireEnvelope { action, voter_id })
            .map_err(CodecError::Encode)?,
    };
    line.push(b'\n');
    Ok(line)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
