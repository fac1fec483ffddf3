//! Application layer for biometric-bridge.
//!
//! Knows *what* to do with a client request (validate it, pick a deadline,
//! shape the result) but delegates *how* the device is reached to the
//! infrastructure layer through [`DeviceRequester`].
//!
//! Sockets, serial ports and task spawning do not belong here.

pub mod device_port;
pub mod dispatcher;

pub use device_port::{DeviceRequester, GatewayError};
pub use dispatcher::{parse_client_message, DispatchError, Dispatcher, InboundCommand};
