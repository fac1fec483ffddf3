//! Protocol module: line framing, the device message codec, and message types.

pub mod codec;
pub mod framer;
pub mod messages;
pub mod sequence;

pub use codec::{decode_reply, encode_command, CodecError};
pub use framer::{Frame, LineFramer, DEFAULT_MAX_FRAME_LEN};
pub use messages::*;
pub use sequence::{RequestCounter, RequestId};
