//! biometric-bridge library crate.
//!
//! This crate multiplexes a single serial link to a fingerprint device across
//! any number of network clients.  Clients talk JSON over WebSocket (or plain
//! HTTP); the device talks newline-delimited lines over a UART.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser / voting app (JSON over WebSocket or HTTP)
//!         ↕
//! [biometric-bridge]
//!   ├── domain/           Pure types: BridgeConfig, ClientResponse
//!   ├── application/      Request dispatcher + the DeviceRequester port
//!   └── infrastructure/
//!         ├── device_gateway/ Single-outstanding request/reply over the link
//!         ├── session_hub/    Connected clients and broadcast fan-out
//!         ├── ws_server/      WebSocket accept loop (tokio-tungstenite)
//!         ├── http_api/       axum routes
//!         ├── serial_link/    tokio-serial port handling
//!         └── config_file/    Optional TOML configuration
//!         ↕
//! Fingerprint device (line protocol over serial, 115200 8N1)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `biometric-core`; it reaches the
//!   device only through the [`application::DeviceRequester`] trait, so it can
//!   be tested with a mock.
//! - `infrastructure` depends on all other layers plus `tokio`, `tungstenite`,
//!   `axum` and `tokio-serial`.

/// Domain layer: configuration and client-facing message types (no I/O).
pub mod domain;

/// Application layer: client request validation and dispatch.
pub mod application;

/// Infrastructure layer: serial link, device gateway, sessions, servers.
pub mod infrastructure;
