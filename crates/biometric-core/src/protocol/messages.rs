//! Message types exchanged with the biometric device.
//!
//! # Direction
//!
//! ```text
//! Bridge → Device:  DeviceCommand  (action token + optional voter id)
//! Device → Bridge:  DeviceReply    (one JSON object per line)
//! ```
//!
//! The device understands exactly four actions.  Two of them operate on a
//! specific voter (enroll and verify) and therefore need a subject; the other
//! two act on the device as a whole.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ── Device actions ────────────────────────────────────────────────────────────

/// The set of actions the device firmware recognises.
///
/// The serde representation is the upper-case wire token, e.g.
/// `"VERIFY_BIOMETRIC"`, which is also what clients see in the `action` field
/// of a success envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceAction {
    /// Capture a fingerprint and report whether it matches any stored template.
    #[serde(rename = "AUTHENTICATE")]
    Authenticate,
    /// Capture a fingerprint twice and store it for the given voter.
    #[serde(rename = "ENROLL_BIOMETRIC")]
    EnrollBiometric,
    /// Capture a fingerprint and check it against the given voter.
    #[serde(rename = "VERIFY_BIOMETRIC")]
    VerifyBiometric,
    /// Erase every stored template on the sensor.
    #[serde(rename = "CLEAR_BIOMETRIC_DB")]
    ClearBiometricDb,
}

impl DeviceAction {
    /// All recognised actions, in wire-token order.
    pub const ALL: [DeviceAction; 4] = [
        DeviceAction::Authenticate,
        DeviceAction::EnrollBiometric,
        DeviceAction::VerifyBiometric,
        DeviceAction::ClearBiometricDb,
    ];

    /// Returns the upper-case wire token for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceAction::Authenticate => "AUTHENTICATE",
            DeviceAction::EnrollBiometric => "ENROLL_BIOMETRIC",
            DeviceAction::VerifyBiometric => "VERIFY_BIOMETRIC",
            DeviceAction::ClearBiometricDb => "CLEAR_BIOMETRIC_DB",
        }
    }

    /// Returns `true` when the action operates on a specific voter.
    pub fn requires_subject(self) -> bool {
        matches!(
            self,
            DeviceAction::EnrollBiometric | DeviceAction::VerifyBiometric
        )
    }

    /// Resolves a client-supplied action name.
    ///
    /// Matching is case-insensitive and accepts the short names used by the
    /// voting front-end (`"verify"`, `"enroll"`, `"authenticate"`, `"clear"`)
    /// in addition to the full wire tokens.
    ///
    /// ```rust
    /// use biometric_core::DeviceAction;
    ///
    /// assert_eq!(DeviceAction::from_name("verify"), Some(DeviceAction::VerifyBiometric));
    /// assert_eq!(DeviceAction::from_name("Enroll_Biometric"), Some(DeviceAction::EnrollBiometric));
    /// assert_eq!(DeviceAction::from_name("reboot"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if let Some(action) = Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(name))
        {
            return Some(action);
        }
        match name.to_ascii_lowercase().as_str() {
            "authenticate" | "auth" => Some(DeviceAction::Authenticate),
            "enroll" => Some(DeviceAction::EnrollBiometric),
            "verify" => Some(DeviceAction::VerifyBiometric),
            "clear" => Some(DeviceAction::ClearBiometricDb),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Reasons a [`DeviceCommand`] cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Enroll and verify need a non-blank voter id.
    #[error("{action} requires a voter id")]
    MissingSubject { action: DeviceAction },

    /// The voter id contains whitespace or control characters, which would
    /// corrupt the line-oriented wire format.
    #[error("voter id contains invalid characters")]
    InvalidSubject,
}

/// A validated command ready to be written to the device.
///
/// Construction goes through [`DeviceCommand::new`], which enforces the
/// subject rules, so every value of this type can be encoded without further
/// checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    action: DeviceAction,
    subject: Option<String>,
}

impl DeviceCommand {
    /// Builds a command, validating the subject against the action.
    ///
    /// - Enroll/verify: the subject is trimmed and must be non-empty.
    /// - Authenticate/clear: any subject is discarded.
    ///
    /// # Errors
    ///
    /// [`CommandError::MissingSubject`] when a required subject is absent or
    /// blank, [`CommandError::InvalidSubject`] when it contains whitespace or
    /// control characters.
    pub fn new(action: DeviceAction, subject: Option<String>) -> Result<Self, CommandError> {
        if !action.requires_subject() {
            return Ok(Self {
                action,
                subject: None,
            });
        }

        let subject = subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(CommandError::MissingSubject { action })?;

        if subject
            .chars()
            .any(|c| c.is_control() || c.is_whitespace())
        {
            return Err(CommandError::InvalidSubject);
        }

        Ok(Self {
            action,
            subject: Some(subject),
        })
    }

    /// The action to perform.
    pub fn action(&self) -> DeviceAction {
        self.action
    }

    /// The voter id, present only for enroll and verify.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

// ── Wire mode ─────────────────────────────────────────────────────────────────

/// How commands are serialized onto the serial link.
///
/// The mode is fixed by configuration; the device never negotiates it.
///
/// | Mode   | Example line                                         |
/// |--------|------------------------------------------------------|
/// | `Bare` | `AUTHENTICATE`                                       |
/// | `Text` | `VERIFY_BIOMETRIC V123`                              |
/// | `Json` | `{"action":"VERIFY_BIOMETRIC","voterId":"V123"}`     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireMode {
    /// The action token alone; subjects are not transmitted.
    Bare,
    /// The action token followed by a space and the subject, if any.
    Text,
    /// A one-line JSON envelope with `action` and optional `voterId`.
    #[default]
    Json,
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireMode::Bare => "bare",
            WireMode::Text => "text",
            WireMode::Json => "json",
        })
    }
}

impl FromStr for WireMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bare" => Ok(WireMode::Bare),
            "text" => Ok(WireMode::Text),
            "json" => Ok(WireMode::Json),
            other => Err(format!(
                "unknown wire mode '{other}' (expected bare, text or json)"
            )),
        }
    }
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// One JSON object received from the device, stamped with the moment it was
/// decoded from a complete frame.
///
/// The bridge does not interpret replies beyond a few convenience accessors;
/// the raw object is what clients receive as `payload` and on the broadcast
/// feed.
#[derive(Debug, Clone)]
pub struct DeviceReply {
    value: Value,
    framed_at: Instant,
}

impl DeviceReply {
    /// Wraps a JSON object received at `framed_at`.
    ///
    /// Returns `None` when `value` is not an object.
    pub fn new(value: Value, framed_at: Instant) -> Option<Self> {
        value.is_object().then_some(Self { value, framed_at })
    }

    /// The parsed JSON object.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the reply and returns the JSON object.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// When the frame carrying this reply was decoded.
    pub fn framed_at(&self) -> Instant {
        self.framed_at
    }

    /// The reply's tag: the `type` field, falling back to `action`.
    pub fn kind(&self) -> Option<&str> {
        self.str_field("type").or_else(|| self.str_field("action"))
    }

    /// The `status` field, e.g. `"VERIFIED"`.
    pub fn status(&self) -> Option<&str> {
        self.str_field("status")
    }

    /// The voter id the device reported, from `voterId` or `voter_id`.
    ///
    /// Numeric ids are rendered as strings.
    pub fn voter_id(&self) -> Option<String> {
        let raw = self
            .value
            .get("voterId")
            .or_else(|| self.value.get("voter_id"))?;
        match raw {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }
}

impl PartialEq for DeviceReply {
    /// Replies compare by content; the arrival timestamp is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
