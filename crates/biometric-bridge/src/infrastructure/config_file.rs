//! Optional TOML configuration file.
//!
//! Passed with `--config <PATH>` (or `BIO_CONFIG`).  Every field has a
//! default, so a file only needs the values that differ:
//!
//! ```toml
//! [serial]
//! path = "/dev/ttyACM0"
//! baud_rate = 115200
//! wire_mode = "json"        # bare | text | json
//! max_frame_len = 4096
//!
//! [network]
//! bind_address = "0.0.0.0"
//! ws_port = 5001
//! http_port = 5000
//! ping_interval_secs = 30
//!
//! [timeouts]
//! authenticate_ms = 5000
//! enroll_ms = 15000
//! verify_ms = 8000
//! clear_ms = 5000
//!
//! [gateway]
//! busy_policy = "queue"     # queue | reject
//! ```
//!
//! Command-line flags given explicitly override values from the file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use biometric_core::{WireMode, DEFAULT_MAX_FRAME_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{
    ActionTimeouts, BridgeConfig, BusyPolicy, DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PATH,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub serial: SerialSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSection {
    #[serde(default = "default_serial_path")]
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub wire_mode: WireMode,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// Reply deadlines in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_authenticate_ms")]
    pub authenticate_ms: u64,
    #[serde(default = "default_enroll_ms")]
    pub enroll_ms: u64,
    #[serde(default = "default_verify_ms")]
    pub verify_ms: u64,
    #[serde(default = "default_clear_ms")]
    pub clear_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

fn default_serial_path() -> String {
    DEFAULT_SERIAL_PATH.to_string()
}
fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    5001
}
fn default_http_port() -> u16 {
    5000
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_authenticate_ms() -> u64 {
    5_000
}
fn default_enroll_ms() -> u64 {
    15_000
}
fn default_verify_ms() -> u64 {
    8_000
}
fn default_clear_ms() -> u64 {
    5_000
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            path: default_serial_path(),
            baud_rate: default_baud_rate(),
            wire_mode: WireMode::default(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ws_port: default_ws_port(),
            http_port: default_http_port(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            authenticate_ms: default_authenticate_ms(),
            enroll_ms: default_enroll_ms(),
            verify_ms: default_verify_ms(),
            clear_ms: default_clear_ms(),
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the TOML is malformed or has wrongly typed
    /// values.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Converts the file layout into a validated [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an unparseable bind address or any value
    /// rejected by [`BridgeConfig::validate`].
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let ip: IpAddr =
            self.network
                .bind_address
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    field: "network.bind_address",
                    reason: format!("'{}' is not an IP address", self.network.bind_address),
                })?;

        let config = BridgeConfig {
            serial_path: self.serial.path,
            baud_rate: self.serial.baud_rate,
            wire_mode: self.serial.wire_mode,
            busy_policy: self.gateway.busy_policy,
            ws_bind_addr: SocketAddr::new(ip, self.network.ws_port),
            http_bind_addr: SocketAddr::new(ip, self.network.http_port),
            timeouts: ActionTimeouts {
                authenticate: Duration::from_millis(self.timeouts.authenticate_ms),
                enroll: Duration::from_millis(self.timeouts.enroll_ms),
                verify: Duration::from_millis(self.timeouts.verify_ms),
                clear: Duration::from_millis(self.timeouts.clear_ms),
            },
            max_frame_len: self.serial.max_frame_len,
            ping_interval: Duration::from_secs(self.network.ping_interval_secs),
        };

        config.validate().map_err(|reason| ConfigError::Invalid {
            field: "config",
            reason,
        })?;
        Ok(config)
    }
}

/// Reads and parses the config file at `path`.
///
/// Unlike a default config location, an explicitly named file must exist.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// it is not valid TOML for this schema.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        // Arrange / Act
        let cfg = FileConfig::from_toml("").unwrap().into_bridge_config().unwrap();

        // Assert
        let defaults = BridgeConfig::default();
        assert_eq!(cfg.serial_path, defaults.serial_path);
        assert_eq!(cfg.ws_bind_addr, defaults.ws_bind_addr);
        assert_eq!(cfg.http_bind_addr, defaults.http_bind_addr);
        assert_eq!(cfg.timeouts, defaults.timeouts);
        assert_eq!(cfg.max_frame_len, 4096);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let text = r#"
            [serial]
            path = "/dev/ttyACM0"
            wire_mode = "text"

            [timeouts]
            verify_ms = 12000

            [gateway]
            busy_policy = "reject"
        "#;

        let cfg = FileConfig::from_toml(text).unwrap().into_bridge_config().unwrap();

        assert_eq!(cfg.serial_path, "/dev/ttyACM0");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.wire_mode, WireMode::Text);
        assert_eq!(cfg.timeouts.verify, Duration::from_millis(12_000));
        assert_eq!(cfg.timeouts.enroll, Duration::from_millis(15_000));
        assert_eq!(cfg.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    fn test_custom_ports_share_bind_address() {
        let text = r#"
            [network]
            bind_address = "127.0.0.1"
            ws_port = 9001
            http_port = 9000
        "#;
        let cfg = FileConfig::from_toml(text).unwrap().into_bridge_config().unwrap();
        assert_eq!(cfg.ws_bind_addr.to_string(), "127.0.0.1:9001");
        assert_eq!(cfg.http_bind_addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = FileConfig::from_toml("[serial\npath = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_wire_mode_is_parse_error() {
        let err = FileConfig::from_toml("[serial]\nwire_mode = \"xml\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_bad_bind_address_is_invalid() {
        let file = FileConfig::from_toml("[network]\nbind_address = \"not.an.ip\"").unwrap();
        let err = file.into_bridge_config().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "network.bind_address",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let file = FileConfig::from_toml("[timeouts]\nclear_ms = 0").unwrap();
        assert!(file.into_bridge_config().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/biometric-bridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_config_reads_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!(
            "biometric-bridge-test-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "[serial]\nbaud_rate = 57600\n").unwrap();

        // Act
        let file = load_config(&path);
        std::fs::remove_file(&path).unwrap();

        // Assert
        assert_eq!(file.unwrap().serial.baud_rate, 57_600);
    }
}
