//! Domain layer for biometric-bridge.
//!
//! Pure types with no dependencies on I/O, networking, or an async runtime:
//!
//! - Runtime configuration ([`BridgeConfig`] and its parts)
//! - The client-facing response envelope and health report
//!
//! Anything that opens a port, reads a file, or spawns a task belongs in
//! `infrastructure`.

pub mod config;
pub mod messages;

pub use config::{ActionTimeouts, BridgeConfig, BusyPolicy};
pub use messages::{ClientResponse, FailureKind, HealthReport};
