//! # biometric-core
//!
//! Shared protocol library for the biometric serial bridge.  It turns the raw
//! byte stream coming off the device's serial link into typed replies, and
//! turns typed commands into the single line the device expects.
//!
//! This crate has no dependencies on sockets, serial ports, or an async
//! runtime.  Everything here is a plain function or a small state machine, so
//! it can be exercised byte-by-byte in unit tests.
//!
//! # Architecture overview
//!
//! ```text
//! serial bytes ──► LineFramer ──► Frame ──► decode_reply ──► DeviceReply
//!
//! DeviceCommand ──► encode_command(WireMode) ──► one newline-terminated line
//! ```
//!
//! - **`protocol::framer`** – reconstructs newline-delimited frames from
//!   arbitrarily chunked reads, with a hard bound on the buffered fragment.
//! - **`protocol::codec`** – JSON decoding of device lines and wire encoding of
//!   commands.
//! - **`protocol::messages`** – the recognised device actions, commands, wire
//!   modes and replies.
//! - **`protocol::sequence`** – identifiers for in-flight device requests.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `biometric_core::LineFramer` instead of the full module path.
pub use protocol::codec::{decode_reply, encode_command, CodecError};
pub use protocol::framer::{Frame, LineFramer, DEFAULT_MAX_FRAME_LEN};
pub use protocol::messages::{CommandError, DeviceAction, DeviceCommand, DeviceReply, WireMode};
pub use protocol::sequence::{RequestCounter, RequestId};
