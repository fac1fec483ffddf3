//! End-to-end tests for the WebSocket side of the bridge.
//!
//! Each test wires a real [`DeviceGateway`] to an in-memory fake device
//! (a `tokio::io::duplex` pipe), starts the WebSocket accept loop on an
//! ephemeral port and talks to it with `tokio-tungstenite` clients:
//!
//! ```text
//! ws client A ─┐
//!              ├─► serve() ─► Dispatcher ─► DeviceGateway ─► duplex ─► FakeDevice
//! ws client B ─┘      ▲                          │
//!                     └──── pump_broadcasts ◄────┘ (every reply)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use biometric_bridge::domain::{BridgeConfig, BusyPolicy};
use biometric_bridge::infrastructure::ws_server::serve;
use biometric_bridge::infrastructure::{pump_broadcasts, run_reader, BridgeContext, DeviceGateway};
use biometric_core::{LineFramer, WireMode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────────────────

struct FakeDevice {
    commands: Lines<BufReader<ReadHalf<DuplexStream>>>,
    replies: WriteHalf<DuplexStream>,
}

impl FakeDevice {
    async fn next_command(&mut self) -> String {
        timeout(WAIT, self.commands.next_line())
            .await
            .expect("device waited too long for a command")
            .expect("read from bridge")
            .expect("bridge closed the link")
    }

    async fn send(&mut self, line: &str) {
        self.replies.write_all(line.as_bytes()).await.unwrap();
        self.replies.write_all(b"\r\n").await.unwrap();
    }
}

struct Bridge {
    ctx: Arc<BridgeContext>,
    device: FakeDevice,
    url: String,
    running: Arc<AtomicBool>,
}

impl Bridge {
    async fn start() -> Self {
        let (bridge_end, device_end) = tokio::io::duplex(4096);
        let (bridge_rd, bridge_wr) = tokio::io::split(bridge_end);
        let (device_rd, device_wr) = tokio::io::split(device_end);

        let gateway = DeviceGateway::new(bridge_wr, WireMode::Json, BusyPolicy::Queue);
        let ctx = BridgeContext::new(BridgeConfig::default(), gateway.clone());
        tokio::spawn(run_reader(bridge_rd, LineFramer::new(), gateway.clone()));
        tokio::spawn(pump_broadcasts(gateway.subscribe(), Arc::clone(&ctx.hub)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(serve(listener, Arc::clone(&ctx), Arc::clone(&running)));

        Self {
            ctx,
            device: FakeDevice {
                commands: BufReader::new(device_rd).lines(),
                replies: device_wr,
            },
            url,
            running,
        }
    }

    /// Connects `n` clients and waits until all of them are registered.
    async fn connect(&self, n: usize) -> Vec<Client> {
        let mut clients = Vec::with_capacity(n);
        for _ in 0..n {
            let (client, _) = connect_async(self.url.as_str()).await.unwrap();
            clients.push(client);
        }
        timeout(WAIT, async {
            while self.ctx.hub.len().await < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sessions never registered");
        clients
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Next text frame from `client`, parsed as JSON.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("no frame within the wait")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_verify_reaches_requester_and_broadcasts_to_everyone() {
    // Arrange
    let mut bridge = Bridge::start().await;
    let mut clients = bridge.connect(2).await;

    // Act: A asks, the device answers
    clients[0]
        .send(Message::Text(
            r#"{"action":"VERIFY_BIOMETRIC","voterId":"V123"}"#.to_string(),
        ))
        .await
        .unwrap();
    let written: Value = serde_json::from_str(&bridge.device.next_command().await).unwrap();
    bridge
        .device
        .send(r#"{"status":"VERIFIED","voterId":"V123"}"#)
        .await;

    // Assert: the device saw the command
    assert_eq!(written["action"], "VERIFY_BIOMETRIC");
    assert_eq!(written["voterId"], "V123");

    // A gets its envelope and the broadcast, in either order
    let raw = json!({"status": "VERIFIED", "voterId": "V123"});
    let envelope = json!({"success": true, "action": "VERIFY_BIOMETRIC", "payload": raw});
    let first = next_json(&mut clients[0]).await;
    let second = next_json(&mut clients[0]).await;
    assert!(
        (first == envelope && second == raw) || (first == raw && second == envelope),
        "unexpected frames: {first} / {second}"
    );

    // B only gets the broadcast
    assert_eq!(next_json(&mut clients[1]).await, raw);
}

#[tokio::test]
async fn test_enroll_without_voter_id_never_touches_the_device() {
    let mut bridge = Bridge::start().await;
    let mut clients = bridge.connect(1).await;

    clients[0]
        .send(Message::Text(r#"{"action":"ENROLL_BIOMETRIC"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(
        next_json(&mut clients[0]).await,
        json!({"success": false, "error": "voterId is required"})
    );
    let nothing = timeout(Duration::from_millis(200), bridge.device.commands.next_line()).await;
    assert!(nothing.is_err(), "device received a command");
    assert_eq!(bridge.ctx.gateway.requests_issued(), 0);
}

#[tokio::test]
async fn test_binary_utf8_frame_is_handled_as_text() {
    let mut bridge = Bridge::start().await;
    let mut clients = bridge.connect(1).await;

    clients[0]
        .send(Message::Binary(b"AUTHENTICATE".to_vec()))
        .await
        .unwrap();
    let written: Value = serde_json::from_str(&bridge.device.next_command().await).unwrap();
    bridge
        .device
        .send(r#"{"type":"success","message":"Fingerprint matched","id":7}"#)
        .await;

    assert_eq!(written["action"], "AUTHENTICATE");
    let frames = [
        next_json(&mut clients[0]).await,
        next_json(&mut clients[0]).await,
    ];
    assert!(frames
        .iter()
        .any(|f| f["success"] == true && f["action"] == "AUTHENTICATE"));
}

#[tokio::test]
async fn test_unsolicited_device_output_is_broadcast() {
    // Arrange
    let mut bridge = Bridge::start().await;
    let mut clients = bridge.connect(2).await;

    // Act: boot chatter, then a reply nobody asked for
    bridge.device.send("Sensor found! v1.2").await;
    bridge
        .device
        .send(r#"{"type":"info","message":"Place finger"}"#)
        .await;

    // Assert: only the JSON object is forwarded
    for client in clients.iter_mut() {
        assert_eq!(
            next_json(client).await,
            json!({"type": "info", "message": "Place finger"})
        );
    }
}

#[tokio::test]
async fn test_disconnected_client_is_unregistered() {
    let bridge = Bridge::start().await;
    let mut clients = bridge.connect(2).await;

    let mut gone = clients.remove(0);
    gone.close(None).await.unwrap();

    timeout(WAIT, async {
        while bridge.ctx.hub.len().await != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed session was never removed");
}
