//! The device port: how the application layer reaches the device.
//!
//! The dispatcher depends only on [`DeviceRequester`].  The infrastructure
//! layer's `DeviceGateway` implements it over a real serial link; tests use a
//! mock.

use std::time::Duration;

use async_trait::async_trait;
use biometric_core::{DeviceCommand, DeviceReply};
use thiserror::Error;

use crate::domain::messages::FailureKind;

/// Failures of a device request.
///
/// Decode failures of device lines are deliberately absent: they are logged
/// and dropped by the reader and never reach a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Writing or flushing the command failed.
    #[error("failed to write to device: {0}")]
    Transport(String),

    /// The serial link is closed, or closed while the request was waiting.
    #[error("device link is closed")]
    LinkClosed,

    /// No reply arrived within the deadline.
    #[error("no reply from device within {0:?}")]
    Timeout(Duration),

    /// Another request is in flight and the busy policy rejects new ones.
    #[error("device is busy with another request")]
    Busy,
}

impl GatewayError {
    /// The message shown to clients in a failure envelope.
    pub fn client_message(&self) -> &'static str {
        match self {
            GatewayError::Transport(_) => "Failed to write to device",
            GatewayError::LinkClosed => "Device link unavailable",
            GatewayError::Timeout(_) => "Timeout waiting for device",
            GatewayError::Busy => "Device busy",
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GatewayError::Transport(_) => FailureKind::Transport,
            GatewayError::LinkClosed => FailureKind::LinkClosed,
            GatewayError::Timeout(_) => FailureKind::Timeout,
            GatewayError::Busy => FailureKind::Busy,
        }
    }
}

/// Serialized access to the device: one command out, the next reply back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRequester: Send + Sync {
    /// Sends `command` and waits up to `deadline` for the device's reply.
    async fn request(
        &self,
        command: DeviceCommand,
        deadline: Duration,
    ) -> Result<DeviceReply, GatewayError>;
}
