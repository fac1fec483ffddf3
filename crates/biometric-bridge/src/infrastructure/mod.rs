//! Infrastructure layer for biometric-bridge.
//!
//! Everything that does I/O lives here:
//!
//! - Opening the serial port and reading/writing the device link
//! - Serializing access to the device and correlating replies
//! - Tracking connected sessions and fanning out broadcasts
//! - Accepting WebSocket connections and serving the HTTP API
//! - Loading the optional TOML config file
//!
//! Request validation and response shaping are *not* here; they belong to the
//! application layer.

pub mod config_file;
pub mod context;
pub mod device_gateway;
pub mod http_api;
pub mod serial_link;
pub mod session_hub;
pub mod ws_server;

pub use context::BridgeContext;
pub use device_gateway::{run_reader, DeviceGateway};
pub use http_api::run_http_server;
pub use serial_link::SerialLink;
pub use session_hub::{pump_broadcasts, SessionHub};
pub use ws_server::run_server;
