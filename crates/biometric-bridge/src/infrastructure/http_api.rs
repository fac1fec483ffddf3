//! HTTP API for clients that cannot hold a WebSocket open.
//!
//! | Route                 | Body                   | Success                  |
//! |-----------------------|------------------------|--------------------------|
//! | `POST /authenticate`  | none                   | 200, raw device reply    |
//! | `POST /command`       | request envelope/token | 200, `ClientResponse`    |
//! | `GET /health`         | none                   | 200, [`HealthReport`]    |
//!
//! Failures carry `{"success":false,"error":...}` with a status code chosen
//! from the failure kind (see [`status_for`]).  CORS is permissive because
//! the voting front-end is served from a different origin.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use biometric_core::{DeviceAction, DeviceCommand};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::GatewayError;
use crate::domain::messages::{ClientResponse, FailureKind, HealthReport};
use crate::infrastructure::context::BridgeContext;

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Builds the API router.
pub fn router(ctx: Arc<BridgeContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/authenticate", post(authenticate))
        .route("/command", post(command))
        .route("/health", get(health))
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// HTTP status for a failed request.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Validation => StatusCode::BAD_REQUEST,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::Transport | FailureKind::LinkClosed => StatusCode::BAD_GATEWAY,
        FailureKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `POST /authenticate`: runs AUTHENTICATE and returns the device's reply
/// as-is.
async fn authenticate(State(ctx): State<Arc<BridgeContext>>) -> Response {
    let command = match DeviceCommand::new(DeviceAction::Authenticate, None) {
        Ok(command) => command,
        Err(e) => {
            let body = ClientResponse::failure(FailureKind::Validation, e.to_string());
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
        }
    };

    match ctx.dispatcher.dispatch(command).await {
        Ok(reply) => (StatusCode::OK, Json(reply.into_value())).into_response(),
        Err(e) => {
            warn!("/authenticate failed: {e}");
            let (status, body) = authenticate_failure(&e);
            (status, Json(body)).into_response()
        }
    }
}

/// `/authenticate` answers 504 on timeout and 500 for anything else.
fn authenticate_failure(err: &GatewayError) -> (StatusCode, ClientResponse) {
    let kind = err.failure_kind();
    let status = match kind {
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, ClientResponse::failure(kind, err.client_message()))
}

/// `POST /command`: the same request formats the WebSocket accepts.
async fn command(State(ctx): State<Arc<BridgeContext>>, body: String) -> Response {
    let response = ctx.dispatcher.handle(&body).await;
    let status = response.failure.map_or(StatusCode::OK, status_for);
    (status, Json(response)).into_response()
}

/// `GET /health`.
async fn health(State(ctx): State<Arc<BridgeContext>>) -> Json<HealthReport> {
    Json(ctx.health().await)
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Binds `ctx.config.http_bind_addr` and serves the API until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_http_server(
    ctx: Arc<BridgeContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let addr = ctx.config.http_bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;

    info!("HTTP API listening on {addr}");
    serve_http(listener, ctx, running).await
}

/// Serves the API on an already-bound listener.
///
/// # Errors
///
/// Returns an error if the underlying server fails.
pub async fn serve_http(
    listener: TcpListener,
    ctx: Arc<BridgeContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            while running.load(Ordering::Relaxed) {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
            info!("shutdown flag set; stopping HTTP API");
        })
        .await
        .context("HTTP server failed")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BridgeConfig, BusyPolicy};
    use crate::infrastructure::device_gateway::{run_reader, DeviceGateway};
    use axum::body::Body;
    use axum::http::Request;
    use biometric_core::{LineFramer, WireMode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tower::ServiceExt;

    /// A context wired to an in-memory device that answers every command
    /// with `answer` (or stays silent when `None`).
    fn context_with_device(answer: Option<&'static str>) -> Arc<BridgeContext> {
        let (bridge_end, device_end) = tokio::io::duplex(4096);
        let (bridge_rd, bridge_wr) = tokio::io::split(bridge_end);
        let gateway = DeviceGateway::new(bridge_wr, WireMode::Json, BusyPolicy::Queue);
        tokio::spawn(run_reader(bridge_rd, LineFramer::new(), gateway.clone()));

        tokio::spawn(async move {
            let (device_rd, mut device_wr) = tokio::io::split(device_end);
            let mut commands = BufReader::new(device_rd).lines();
            while let Ok(Some(_)) = commands.next_line().await {
                if let Some(line) = answer {
                    device_wr.write_all(line.as_bytes()).await.unwrap();
                    device_wr.write_all(b"\r\n").await.unwrap();
                }
            }
        });

        BridgeContext::new(BridgeConfig::default(), gateway)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(FailureKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(FailureKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(FailureKind::Transport), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(FailureKind::LinkClosed), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(FailureKind::Busy), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_authenticate_failure_keeps_gateway_kind() {
        // Arrange
        let cases = [
            (GatewayError::Timeout(Duration::from_secs(5)), StatusCode::GATEWAY_TIMEOUT, FailureKind::Timeout),
            (GatewayError::Busy, StatusCode::INTERNAL_SERVER_ERROR, FailureKind::Busy),
            (GatewayError::LinkClosed, StatusCode::INTERNAL_SERVER_ERROR, FailureKind::LinkClosed),
            (GatewayError::Transport("eof".into()), StatusCode::INTERNAL_SERVER_ERROR, FailureKind::Transport),
        ];

        for (err, status, kind) in cases {
            // Act
            let (got_status, body) = authenticate_failure(&err);

            // Assert
            assert_eq!(got_status, status);
            assert_eq!(body.failure, Some(kind));
            assert_eq!(body.error.as_deref(), Some(err.client_message()));
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        // Arrange
        let app = router(context_with_device(None));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "ok", "link_open": true, "sessions": 0})
        );
    }

    #[tokio::test]
    async fn test_authenticate_returns_raw_device_reply() {
        let app = router(context_with_device(Some(
            r#"{"type":"success","message":"Fingerprint matched","id":4}"#,
        )));

        let response = app.oneshot(post("/authenticate", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"type": "success", "message": "Fingerprint matched", "id": 4})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate_timeout_is_504() {
        let app = router(context_with_device(None));

        let response = app.oneshot(post("/authenticate", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            body_json(response).await,
            json!({"success": false, "error": "Timeout waiting for device"})
        );
    }

    #[tokio::test]
    async fn test_command_success_envelope() {
        let app = router(context_with_device(Some(
            r#"{"status":"VERIFIED","voterId":"V123"}"#,
        )));

        let response = app
            .oneshot(post("/command", r#"{"action":"VERIFY_BIOMETRIC","voterId":"V123"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "success": true,
                "action": "VERIFY_BIOMETRIC",
                "payload": {"status": "VERIFIED", "voterId": "V123"}
            })
        );
    }

    #[tokio::test]
    async fn test_command_validation_failure_is_400() {
        let ctx = context_with_device(None);
        let app = router(Arc::clone(&ctx));

        let response = app
            .oneshot(post("/command", r#"{"action":"ENROLL_BIOMETRIC"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"success": false, "error": "voterId is required"})
        );
        assert_eq!(ctx.gateway.requests_issued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_is_504() {
        let app = router(context_with_device(None));

        let response = app.oneshot(post("/command", "VERIFY_BIOMETRIC V123")).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_command_on_closed_link_is_502() {
        let ctx = context_with_device(None);
        ctx.gateway.close_link().await;

        let response = router(ctx).oneshot(post("/command", "AUTHENTICATE")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(response).await["error"],
            "Device link unavailable"
        );
    }
}
