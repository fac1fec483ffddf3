//! Device gateway: the single point of access to the serial link.
//!
//! # Why serialize access?
//!
//! The device answers commands in order and its replies carry no correlation
//! id.  The only way to know which request a reply belongs to is to have at
//! most one request outstanding at a time, and to pair it with the *next*
//! reply that arrives after the command was written.
//!
//! ```text
//!  request() ──► take turn ──► register pending ──► write line ──► wait ─┐
//!                                                                        │
//!  run_reader ──► LineFramer ──► decode_reply ──► deliver() ─────────────┤
//!                                                    │                   ▼
//!                                                    └──► broadcast feed  reply / Timeout
//! ```
//!
//! # The turn
//!
//! A `tokio::sync::Mutex<()>` is held for the whole exchange.  Under
//! [`BusyPolicy::Queue`] waiting requests line up in FIFO order (Tokio's
//! mutex is fair); under [`BusyPolicy::Reject`] a request that finds the turn
//! taken fails immediately with [`GatewayError::Busy`].
//!
//! # Cancellation
//!
//! The exchange runs in its own task.  If the client that asked for it goes
//! away, the request still resolves or times out on schedule and the turn is
//! released only then, so the next request can never receive the previous
//! command's reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use biometric_core::{
    decode_reply, encode_command, DeviceAction, DeviceCommand, DeviceReply, LineFramer,
    RequestCounter, RequestId, WireMode,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::application::device_port::{DeviceRequester, GatewayError};
use crate::domain::config::BusyPolicy;

/// Capacity of the broadcast feed.  Subscribers that fall further behind skip
/// the oldest replies.
pub const FEED_CAPACITY: usize = 64;

const READ_CHUNK: usize = 512;

type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;
type ReplySlot = oneshot::Sender<Result<DeviceReply, GatewayError>>;

/// The one request currently waiting for a reply.
struct PendingRequest {
    id: RequestId,
    action: DeviceAction,
    expires_at: Instant,
    /// Replies framed before this instant answer an earlier command.
    issued_at: std::time::Instant,
    slot: ReplySlot,
}

struct GatewayInner {
    writer: Mutex<LinkWriter>,
    turn: Arc<Mutex<()>>,
    pending: Mutex<Option<PendingRequest>>,
    feed: broadcast::Sender<DeviceReply>,
    link_open: AtomicBool,
    counter: RequestCounter,
    wire_mode: WireMode,
    busy_policy: BusyPolicy,
}

/// Cheaply cloneable handle to the device.
#[derive(Clone)]
pub struct DeviceGateway {
    inner: Arc<GatewayInner>,
}

impl std::fmt::Debug for DeviceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGateway")
            .field("wire_mode", &self.inner.wire_mode)
            .field("busy_policy", &self.inner.busy_policy)
            .field("link_open", &self.is_link_open())
            .finish()
    }
}

impl DeviceGateway {
    /// Creates a gateway that writes commands to `writer`.
    ///
    /// The link is considered open until [`close_link`](Self::close_link) is
    /// called, normally by [`run_reader`] on EOF.
    pub fn new<W>(writer: W, wire_mode: WireMode, busy_policy: BusyPolicy) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(GatewayInner {
                writer: Mutex::new(Box::new(writer)),
                turn: Arc::new(Mutex::new(())),
                pending: Mutex::new(None),
                feed,
                link_open: AtomicBool::new(true),
                counter: RequestCounter::new(),
                wire_mode,
                busy_policy,
            }),
        }
    }

    /// Sends `command` and waits up to `deadline` for the next device reply.
    ///
    /// The deadline starts once the request holds the turn and covers both
    /// the write and the wait for the reply.  Time spent queued for the turn
    /// does not count.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Busy`] under the reject policy when another request
    ///   is in flight.
    /// - [`GatewayError::LinkClosed`] if the link is, or becomes, closed.
    /// - [`GatewayError::Transport`] if the write fails.
    /// - [`GatewayError::Timeout`] if the write stalls or no reply arrives in
    ///   time.
    pub async fn request(
        &self,
        command: DeviceCommand,
        deadline: Duration,
    ) -> Result<DeviceReply, GatewayError> {
        if !self.is_link_open() {
            return Err(GatewayError::LinkClosed);
        }

        let turn = Arc::clone(&self.inner.turn);
        let turn = match self.inner.busy_policy {
            BusyPolicy::Queue => turn.lock_owned().await,
            BusyPolicy::Reject => turn.try_lock_owned().map_err(|_| GatewayError::Busy)?,
        };

        let gateway = self.clone();
        let exchange = tokio::spawn(async move {
            let result = gateway.exchange(command, deadline).await;
            drop(turn);
            result
        });

        match exchange.await {
            Ok(result) => result,
            Err(e) => Err(GatewayError::Transport(format!("exchange task failed: {e}"))),
        }
    }

    /// One command/reply exchange.  Runs with the turn held.
    async fn exchange(
        &self,
        command: DeviceCommand,
        deadline: Duration,
    ) -> Result<DeviceReply, GatewayError> {
        let line = encode_command(&command, self.inner.wire_mode)
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let id = self.inner.counter.next();
        let action = command.action();
        let (slot, reply_rx) = oneshot::channel();
        let expires_at = Instant::now() + deadline;

        *self.inner.pending.lock().await = Some(PendingRequest {
            id,
            action,
            expires_at,
            issued_at: std::time::Instant::now(),
            slot,
        });

        // The link may have closed while the request waited for its turn.
        if !self.is_link_open() {
            self.clear_pending(id).await;
            return Err(GatewayError::LinkClosed);
        }

        match timeout_at(expires_at, self.write_line(&line)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.clear_pending(id).await;
                warn!("request {id}: write of {action} failed: {e}");
                return Err(GatewayError::Transport(e.to_string()));
            }
            Err(_) => {
                self.clear_pending(id).await;
                warn!("request {id}: write of {action} stalled past {deadline:?}");
                return Err(GatewayError::Timeout(deadline));
            }
        }
        debug!("request {id}: wrote {action}, waiting up to {deadline:?}");

        match timeout_at(expires_at, reply_rx).await {
            Ok(Ok(result)) => result,
            // The slot is only dropped unanswered if the gateway is torn down.
            Ok(Err(_)) => Err(GatewayError::LinkClosed),
            Err(_) => {
                self.clear_pending(id).await;
                warn!("request {id}: {action} timed out after {deadline:?}");
                Err(GatewayError::Timeout(deadline))
            }
        }
    }

    async fn write_line(&self, line: &[u8]) -> std::io::Result<()> {
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(line).await?;
        writer.flush().await
    }

    /// Removes the pending request, but only if it is still request `id`.
    async fn clear_pending(&self, id: RequestId) {
        let mut pending = self.inner.pending.lock().await;
        if pending.as_ref().map(|p| p.id) == Some(id) {
            pending.take();
        }
    }

    /// Hands a decoded reply to the pending request, if one is waiting, the
    /// reply was framed after its command was issued and its deadline has not
    /// passed.  The reply is then published on the broadcast feed.
    pub async fn deliver(&self, reply: DeviceReply) {
        {
            let mut pending = self.inner.pending.lock().await;
            match pending.take() {
                Some(p) if reply.framed_at() < p.issued_at => {
                    debug!("request {}: ignoring reply framed before its command", p.id);
                    *pending = Some(p);
                }
                Some(p) if Instant::now() < p.expires_at => {
                    debug!("request {}: {} resolved", p.id, p.action);
                    // A send error means the caller is gone; the reply still
                    // goes out on the feed below.
                    let _ = p.slot.send(Ok(reply.clone()));
                }
                Some(p) => {
                    debug!("request {}: reply arrived after deadline", p.id);
                    *pending = Some(p);
                }
                None => debug!("unsolicited device reply"),
            }
        }

        // Err only means nobody is subscribed right now.
        let _ = self.inner.feed.send(reply);
    }

    /// Marks the link closed and fails the pending request, if any.
    pub async fn close_link(&self) {
        if self.inner.link_open.swap(false, Ordering::SeqCst) {
            warn!("serial link closed");
        }
        if let Some(p) = self.inner.pending.lock().await.take() {
            let _ = p.slot.send(Err(GatewayError::LinkClosed));
        }
    }

    /// Subscribes to every reply the device sends from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceReply> {
        self.inner.feed.subscribe()
    }

    pub fn is_link_open(&self) -> bool {
        self.inner.link_open.load(Ordering::SeqCst)
    }

    /// `true` while a request is waiting for its reply.
    pub async fn has_pending(&self) -> bool {
        self.inner.pending.lock().await.is_some()
    }

    /// Number of commands handed to the link so far.
    pub fn requests_issued(&self) -> u64 {
        self.inner.counter.issued()
    }
}

#[async_trait]
impl DeviceRequester for DeviceGateway {
    async fn request(
        &self,
        command: DeviceCommand,
        deadline: Duration,
    ) -> Result<DeviceReply, GatewayError> {
        DeviceGateway::request(self, command, deadline).await
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Reads the link until EOF or error, delivering every decoded reply to
/// `gateway`.  Lines that are not JSON objects are logged and dropped.
///
/// On exit the link is marked closed and any pending request fails with
/// [`GatewayError::LinkClosed`].
pub async fn run_reader<R>(mut reader: R, mut framer: LineFramer, gateway: DeviceGateway)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                info!("serial link reached end of stream");
                break;
            }
            Ok(n) => {
                for frame in framer.feed(&buf[..n]) {
                    match decode_reply(&frame) {
                        Ok(reply) => gateway.deliver(reply).await,
                        Err(e) => warn!(
                            "dropping device line ({e}): {}",
                            String::from_utf8_lossy(frame.as_bytes())
                        ),
                    }
                }
            }
            Err(e) => {
                error!("serial read failed: {e}");
                break;
            }
        }
    }

    gateway.close_link().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
