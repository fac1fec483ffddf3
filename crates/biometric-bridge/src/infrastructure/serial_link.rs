//! The serial link to the fingerprint device.
//!
//! The device is a microcontroller on a USB-UART adapter running at 115200
//! baud, 8 data bits, no parity, one stop bit, no flow control.  The link has
//! no framing of its own; that is the job of `biometric_core::LineFramer`.
//!
//! The port is opened exactly once at startup and split into a read half (for
//! the reader task) and a write half (owned by the device gateway).

use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use thiserror::Error;
use tracing::info;

/// Errors opening the serial link.  All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum SerialLinkError {
    /// Nothing is attached at `path`.
    #[error("serial device not found at {path}")]
    NotFound { path: String },

    /// The device exists but could not be opened (busy, permissions, ...).
    #[error("failed to open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
}

/// An open serial connection to the device.
#[derive(Debug)]
pub struct SerialLink {
    path: String,
    baud_rate: u32,
    port: SerialStream,
}

impl SerialLink {
    /// Opens `path` at `baud_rate`, 8N1, without flow control.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SerialLinkError::NotFound`] if no device is attached at `path`,
    /// [`SerialLinkError::Open`] for any other failure.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, SerialLinkError> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| match e.kind() {
                tokio_serial::ErrorKind::NoDevice => SerialLinkError::NotFound {
                    path: path.to_string(),
                },
                tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    SerialLinkError::NotFound {
                        path: path.to_string(),
                    }
                }
                _ => SerialLinkError::Open {
                    path: path.to_string(),
                    source: e,
                },
            })?;

        info!("serial link open on {path} at {baud_rate} baud");

        Ok(Self {
            path: path.to_string(),
            baud_rate,
            port,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Splits the link into independently owned read and write halves.
    pub fn into_split(self) -> (ReadHalf<SerialStream>, WriteHalf<SerialStream>) {
        tokio::io::split(self.port)
    }
}
