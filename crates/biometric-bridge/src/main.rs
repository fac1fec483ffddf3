//! Biometric bridge: entry point.
//!
//! This binary owns the serial link to a fingerprint scanner and exposes the
//! device to any number of clients over WebSocket and HTTP.  Only one command
//! is ever outstanding on the device; every JSON reply the device prints is
//! broadcast to all connected WebSocket clients.
//!
//! # Usage
//!
//! ```text
//! biometric-bridge [OPTIONS]
//!
//! Options:
//!   --config        <PATH>  TOML config file
//!   --serial-path   <PATH>  Serial device [default: /dev/ttyUSB0, COM3 on Windows]
//!   --baud-rate     <BAUD>  Line speed [default: 115200]
//!   --wire-mode     <MODE>  bare | text | json [default: json]
//!   --busy-policy   <POL>   queue | reject [default: queue]
//!   --bind          <IP>    Address for both listeners [default: 0.0.0.0]
//!   --ws-port       <PORT>  WebSocket port [default: 5001]
//!   --http-port     <PORT>  HTTP API port [default: 5000]
//! ```
//!
//! # Environment variable overrides
//!
//! Every flag can also be set with an environment variable.  Flags win over
//! variables, and both win over the config file.
//!
//! | Variable                 | Flag                   |
//! |--------------------------|------------------------|
//! | `BIO_CONFIG`             | `--config`             |
//! | `BIO_SERIAL_PATH`        | `--serial-path`        |
//! | `BIO_BAUD_RATE`          | `--baud-rate`          |
//! | `BIO_WIRE_MODE`          | `--wire-mode`          |
//! | `BIO_BUSY_POLICY`        | `--busy-policy`        |
//! | `BIO_BIND`               | `--bind`               |
//! | `BIO_WS_PORT`            | `--ws-port`            |
//! | `BIO_HTTP_PORT`          | `--http-port`          |
//! | `BIO_AUTH_TIMEOUT_MS`    | `--auth-timeout-ms`    |
//! | `BIO_ENROLL_TIMEOUT_MS`  | `--enroll-timeout-ms`  |
//! | `BIO_VERIFY_TIMEOUT_MS`  | `--verify-timeout-ms`  |
//! | `BIO_CLEAR_TIMEOUT_MS`   | `--clear-timeout-ms`   |
//! | `BIO_MAX_FRAME_LEN`      | `--max-frame-len`      |
//! | `BIO_PING_INTERVAL`      | `--ping-interval`      |
//!
//! # Architecture overview
//!
//! ```text
//! Voting front-end  (JSON over WebSocket :5001, HTTP :5000)
//!       ↕
//! biometric-bridge  ← this process
//!   domain/          BridgeConfig, client envelopes
//!   application/     parse + validate requests, DeviceRequester port
//!   infrastructure/
//!     ws_server/     WebSocket sessions
//!     http_api/      /authenticate, /command, /health
//!     device_gateway/ one-at-a-time exchange + reply broadcast
//!     serial_link/   open the port
//!       ↕
//! Fingerprint scanner  (newline-terminated text over serial)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use biometric_core::{LineFramer, WireMode};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use biometric_bridge::domain::{BridgeConfig, BusyPolicy};
use biometric_bridge::infrastructure::config_file::{load_config, FileConfig};
use biometric_bridge::infrastructure::{
    pump_broadcasts, run_http_server, run_reader, run_server, BridgeContext, DeviceGateway,
    SerialLink,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial-to-network bridge for a biometric scanner.
///
/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "biometric-bridge",
    about = "Shares one serial fingerprint scanner with WebSocket and HTTP clients",
    version
)]
struct Cli {
    /// TOML config file.  It must exist if given.
    #[arg(long, env = "BIO_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path.
    #[arg(long, env = "BIO_SERIAL_PATH")]
    serial_path: Option<String>,

    #[arg(long, env = "BIO_BAUD_RATE")]
    baud_rate: Option<u32>,

    /// How commands are written to the device: bare, text or json.
    #[arg(long, env = "BIO_WIRE_MODE")]
    wire_mode: Option<WireMode>,

    /// What a request does while another is in flight: queue or reject.
    #[arg(long, env = "BIO_BUSY_POLICY")]
    busy_policy: Option<BusyPolicy>,

    /// IP address both listeners bind to.
    #[arg(long, env = "BIO_BIND")]
    bind: Option<String>,

    #[arg(long, env = "BIO_WS_PORT")]
    ws_port: Option<u16>,

    #[arg(long, env = "BIO_HTTP_PORT")]
    http_port: Option<u16>,

    #[arg(long, env = "BIO_AUTH_TIMEOUT_MS")]
    auth_timeout_ms: Option<u64>,

    #[arg(long, env = "BIO_ENROLL_TIMEOUT_MS")]
    enroll_timeout_ms: Option<u64>,

    #[arg(long, env = "BIO_VERIFY_TIMEOUT_MS")]
    verify_timeout_ms: Option<u64>,

    #[arg(long, env = "BIO_CLEAR_TIMEOUT_MS")]
    clear_timeout_ms: Option<u64>,

    /// Longest device line kept before the framer discards it.
    #[arg(long, env = "BIO_MAX_FRAME_LEN")]
    max_frame_len: Option<usize>,

    /// WebSocket keepalive ping interval in seconds.
    #[arg(long, env = "BIO_PING_INTERVAL")]
    ping_interval: Option<u64>,
}

impl Cli {
    /// Layers explicitly given flags over `file`.
    fn apply_to(self, mut file: FileConfig) -> FileConfig {
        if let Some(v) = self.serial_path {
            file.serial.path = v;
        }
        if let Some(v) = self.baud_rate {
            file.serial.baud_rate = v;
        }
        if let Some(v) = self.wire_mode {
            file.serial.wire_mode = v;
        }
        if let Some(v) = self.max_frame_len {
            file.serial.max_frame_len = v;
        }
        if let Some(v) = self.busy_policy {
            file.gateway.busy_policy = v;
        }
        if let Some(v) = self.bind {
            file.network.bind_address = v;
        }
        if let Some(v) = self.ws_port {
            file.network.ws_port = v;
        }
        if let Some(v) = self.http_port {
            file.network.http_port = v;
        }
        if let Some(v) = self.ping_interval {
            file.network.ping_interval_secs = v;
        }
        if let Some(v) = self.auth_timeout_ms {
            file.timeouts.authenticate_ms = v;
        }
        if let Some(v) = self.enroll_timeout_ms {
            file.timeouts.enroll_ms = v;
        }
        if let Some(v) = self.verify_timeout_ms {
            file.timeouts.verify_ms = v;
        }
        if let Some(v) = self.clear_timeout_ms {
            file.timeouts.clear_ms = v;
        }
        file
    }

    /// Builds the effective [`BridgeConfig`]: defaults, then the config file,
    /// then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged values do not validate.
    fn into_bridge_config(mut self) -> anyhow::Result<BridgeConfig> {
        let file = match self.config.take() {
            Some(path) => load_config(&path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        self.apply_to(file)
            .into_bridge_config()
            .context("invalid configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// A single-threaded runtime is enough: all the work is I/O on one serial
/// port and a handful of sockets.
///
/// # What happens at startup
///
/// 1. Logging is initialised from `RUST_LOG` (default `info`).
/// 2. Flags, environment and the optional config file are merged.
/// 3. The serial port is opened.  Failure here is fatal and happens before
///    any listener is bound.
/// 4. The reader task and the broadcast pump are spawned.
/// 5. A Ctrl+C handler clears the shared `running` flag.
/// 6. The WebSocket server and the HTTP API run until that flag is cleared
///    or either fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_bridge_config()?;

    info!(
        "biometric bridge starting: serial={}@{}, ws={}, http={}, wire={}, busy={}",
        config.serial_path,
        config.baud_rate,
        config.ws_bind_addr,
        config.http_bind_addr,
        config.wire_mode,
        config.busy_policy
    );

    // ── Device link ───────────────────────────────────────────────────────────
    let link = SerialLink::open(&config.serial_path, config.baud_rate)
        .with_context(|| format!("cannot start without the device at {}", config.serial_path))?;
    info!("serial port {} open at {} baud", link.path(), link.baud_rate());
    let (reader, writer) = link.into_split();

    let gateway = DeviceGateway::new(writer, config.wire_mode, config.busy_policy);
    let framer = LineFramer::with_max_len(config.max_frame_len);
    let ctx = BridgeContext::new(config, gateway.clone());

    tokio::spawn(run_reader(reader, framer, gateway.clone()));
    tokio::spawn(pump_broadcasts(gateway.subscribe(), Arc::clone(&ctx.hub)));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Listeners ─────────────────────────────────────────────────────────────
    let result = tokio::try_join!(
        run_server(Arc::clone(&ctx), Arc::clone(&running)),
        run_http_server(Arc::clone(&ctx), Arc::clone(&running)),
    );

    // Stop whichever listener is still up if the other failed.
    running.store(false, Ordering::Relaxed);
    result?;

    info!("biometric bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
