//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup (defaults, then an optional TOML file, then CLI
//! flags and `BIO_*` environment variables) and never changes afterwards.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the bridge easy to embed in tests.
//! The infrastructure layer and `main.rs` are responsible for populating it.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use biometric_core::{DeviceAction, WireMode, DEFAULT_MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};

/// Default serial device path for the current platform.
#[cfg(windows)]
pub const DEFAULT_SERIAL_PATH: &str = "COM3";
/// Default serial device path for the current platform.
#[cfg(not(windows))]
pub const DEFAULT_SERIAL_PATH: &str = "/dev/ttyUSB0";

/// Default baud rate of the device firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// ── Busy policy ───────────────────────────────────────────────────────────────

/// What the device gateway does when a request arrives while another one is
/// still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait in arrival order behind the in-flight request.
    #[default]
    Queue,
    /// Fail immediately with "Device busy".
    Reject,
}

impl fmt::Display for BusyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusyPolicy::Queue => "queue",
            BusyPolicy::Reject => "reject",
        })
    }
}

impl FromStr for BusyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(BusyPolicy::Queue),
            "reject" => Ok(BusyPolicy::Reject),
            other => Err(format!(
                "unknown busy policy '{other}' (expected queue or reject)"
            )),
        }
    }
}

// ── Per-action deadlines ──────────────────────────────────────────────────────

/// How long the bridge waits for the device to answer each action.
///
/// Enrollment takes two finger placements, so it gets the longest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTimeouts {
    pub authenticate: Duration,
    pub enroll: Duration,
    pub verify: Duration,
    pub clear: Duration,
}

impl ActionTimeouts {
    /// Returns the deadline configured for `action`.
    pub fn for_action(&self, action: DeviceAction) -> Duration {
        match action {
            DeviceAction::Authenticate => self.authenticate,
            DeviceAction::EnrollBiometric => self.enroll,
            DeviceAction::VerifyBiometric => self.verify,
            DeviceAction::ClearBiometricDb => self.clear,
        }
    }
}

impl Default for ActionTimeouts {
    fn default() -> Self {
        Self {
            authenticate: Duration::from_millis(5_000),
            enroll: Duration::from_millis(15_000),
            verify: Duration::from_millis(8_000),
            clear: Duration::from_millis(5_000),
        }
    }
}

// ── BridgeConfig ──────────────────────────────────────────────────────────────

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use biometric_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 5001);
/// assert_eq!(cfg.http_bind_addr.port(), 5000);
/// assert_eq!(cfg.baud_rate, 115_200);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Path of the serial device (`/dev/ttyUSB0`, `COM3`, ...).
    pub serial_path: String,

    /// Serial baud rate.  The firmware runs at 115200 8N1.
    pub baud_rate: u32,

    /// How commands are serialized onto the link.
    pub wire_mode: WireMode,

    /// Queue or reject requests that arrive while the device is busy.
    pub busy_policy: BusyPolicy,

    /// Address the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Address the HTTP API binds to.
    pub http_bind_addr: SocketAddr,

    /// Per-action reply deadlines.
    pub timeouts: ActionTimeouts,

    /// Longest device line accepted before the framer discards it.
    pub max_frame_len: usize,

    /// How often each WebSocket session is pinged to detect dead peers.
    pub ping_interval: Duration,
}

impl BridgeConfig {
    /// Checks values that would make the bridge unusable.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.serial_path.trim().is_empty() {
            return Err("serial path must not be empty".to_string());
        }
        if self.baud_rate == 0 {
            return Err("baud rate must be greater than zero".to_string());
        }
        if self.max_frame_len == 0 {
            return Err("max frame length must be greater than zero".to_string());
        }
        if self.ping_interval.is_zero() {
            return Err("ping interval must be greater than zero".to_string());
        }
        for action in DeviceAction::ALL {
            if self.timeouts.for_action(action).is_zero() {
                return Err(format!("timeout for {action} must be greater than zero"));
            }
        }
        if self.ws_bind_addr == self.http_bind_addr {
            return Err(format!(
                "WebSocket and HTTP servers cannot share {}",
                self.ws_bind_addr
            ));
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    /// Returns a `BridgeConfig` suitable for local development.
    ///
    /// | Field           | Default                       |
    /// |-----------------|-------------------------------|
    /// | serial_path     | `/dev/ttyUSB0` (`COM3` on Windows) |
    /// | baud_rate       | 115200                        |
    /// | wire_mode       | `json`                        |
    /// | busy_policy     | `queue`                       |
    /// | ws_bind_addr    | `0.0.0.0:5001`                |
    /// | http_bind_addr  | `0.0.0.0:5000`                |
    /// | max_frame_len   | 4096                          |
    /// | ping_interval   | 30 seconds                    |
    fn default() -> Self {
        Self {
            serial_path: DEFAULT_SERIAL_PATH.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            wire_mode: WireMode::default(),
            busy_policy: BusyPolicy::default(),
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            http_bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            timeouts: ActionTimeouts::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            ping_interval: Duration::from_secs(30),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
