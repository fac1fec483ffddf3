//! WebSocket server: accept loop and per-session task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections and upgrading them to WebSocket.
//! 3. Registering each session with the [`SessionHub`] so it receives device
//!    broadcasts.
//! 4. Running two concurrent tasks per session:
//!    - **Reader**: reads client frames and spawns one dispatch task per
//!      request, so a slow device exchange never blocks the socket.
//!    - **Writer**: drains the session's outbound queue onto the socket and
//!      sends a WebSocket ping every `ping_interval` to detect dead peers.
//! 5. Gracefully shutting down when the `running` flag is cleared.
//!
//! A failure in one session (bad frame, broken socket) only ends that session.
//!
//! [`SessionHub`]: crate::infrastructure::session_hub::SessionHub

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::DispatchError;
use crate::domain::messages::{ClientResponse, FailureKind};
use crate::infrastructure::context::BridgeContext;
use crate::infrastructure::session_hub::SessionId;

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `ctx.config.ws_bind_addr` and serves WebSocket sessions until
/// `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, missing
/// permission).
pub async fn run_server(ctx: Arc<BridgeContext>, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let addr = ctx.config.ws_bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;

    info!("WebSocket server listening on {addr}");
    serve(listener, ctx, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Each accepted connection is handed off to its own task so one slow client
/// never blocks others.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and the loop continues.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<BridgeContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping WebSocket accept loop");
            break;
        }

        // A short timeout lets the loop notice the shutdown flag while idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new WebSocket connection from {peer_addr}");
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    handle_client_session(stream, peer_addr, ctx).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Wraps [`run_session`] and logs the outcome.
async fn handle_client_session(stream: TcpStream, peer_addr: SocketAddr, ctx: Arc<BridgeContext>) {
    match run_session(stream, peer_addr, ctx).await {
        Ok(()) => info!("session {peer_addr} closed"),
        Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one client session.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<BridgeContext>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (session_id, mut outbound) = ctx.hub.register(peer_addr).await;
    info!("session {session_id} established for {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // ── Writer: outbound queue + keepalive pings ───────────────────────────────
    let ping_interval = ctx.config.ping_interval;
    let mut writer_task = tokio::spawn(async move {
        let mut ticker = interval(ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                next = outbound.recv() => {
                    let Some(text) = next else { break };
                    if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                        debug!("session {session_id}: send failed (client disconnected)");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        debug!("session {session_id}: keepalive ping failed");
                        break;
                    }
                }
            }
        }

        let _ = ws_tx.close().await;
    });

    // ── Reader: one dispatch task per client request ──────────────────────────
    let reader_ctx = Arc::clone(&ctx);
    let mut reader_task = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => spawn_dispatch(&reader_ctx, session_id, text),
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => spawn_dispatch(&reader_ctx, session_id, text),
                    Err(_) => {
                        warn!("session {session_id}: binary frame is not UTF-8");
                        let response = ClientResponse::failure(
                            FailureKind::Validation,
                            DispatchError::UnrecognizedInput.to_string(),
                        );
                        reader_ctx.hub.send_to(session_id, response.to_json()).await;
                    }
                },
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                    debug!("session {session_id}: ping/pong");
                }
                Ok(WsMessage::Close(_)) => {
                    debug!("session {session_id}: close frame received");
                    break;
                }
                Ok(WsMessage::Frame(_)) => {}
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                    debug!("session {session_id}: connection closed");
                    break;
                }
                Err(e) => {
                    warn!("session {session_id}: WebSocket error: {e}");
                    break;
                }
            }
        }
    });

    // The session is over as soon as either side stops.
    tokio::select! {
        _ = &mut writer_task => debug!("session {session_id}: writer ended"),
        _ = &mut reader_task => debug!("session {session_id}: reader ended"),
    }
    writer_task.abort();
    reader_task.abort();

    ctx.hub.unregister(session_id).await;
    Ok(())
}

/// Handles one client request off the socket's read path and queues the
/// response for the same session.
fn spawn_dispatch(ctx: &Arc<BridgeContext>, session_id: SessionId, text: String) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        let response = ctx.dispatcher.handle(&text).await;
        if !ctx.hub.send_to(session_id, response.to_json()).await {
            debug!("session {session_id}: gone before its response was ready");
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
