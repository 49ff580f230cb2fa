//! Browser WebSocket gateway
//!
//! Serves the browser client protocol: `GET /` answers with a banner and
//! `/ws` carries JSON requests of the form `{id, request, name}`. Each
//! request is answered with a JSON object echoing `id`. Uploads add
//! `filename` and `contents`, the latter a binary string.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::fxf::binary_string_bytes;
use crate::service::VStationService;

/// Text served at `GET /`
pub const BANNER: &str = "VStation server";

/// A browser request
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRequest {
    /// Correlation id, echoed back verbatim
    #[serde(default)]
    pub id: Value,
    /// Request verb (`ping`, `machines`, `start`, `setup-ws`, `upload`)
    pub request: String,
    /// Target machine
    #[serde(default)]
    pub name: Option<String>,
    /// Upload file name
    #[serde(default)]
    pub filename: Option<String>,
    /// Upload contents, one character per byte
    #[serde(default)]
    pub contents: Option<String>,
}

/// Build the gateway router
pub fn router(service: Arc<VStationService>) -> Router {
    Router::new()
        .route("/", get(|| async { BANNER }))
        .route("/ws", get(upgrade))
        .with_state(service)
}

/// Serve the gateway until `shutdown` is cancelled
pub async fn serve(
    bind_address: &str,
    service: Arc<VStationService>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind gateway to {}", bind_address))?;

    tracing::info!("Browser gateway listening on {}", bind_address);

    axum::serve(listener, router(service).into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Gateway server error")
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(service): State<Arc<VStationService>>,
) -> impl IntoResponse {
    // A JSON-escaped control byte takes six characters on the wire
    let limit = usize::try_from(service.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_mul(6)
        .saturating_add(1 << 20);
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, service))
}

async fn handle_socket(mut socket: WebSocket, service: Arc<VStationService>) {
    tracing::debug!("Browser client connected");

    // Requests run concurrently; replies funnel back through one channel
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Value>();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Browser websocket error");
                        break;
                    }
                };

                let request = match serde_json::from_str::<GatewayRequest>(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        let _ = reply_tx.send(failure(&Value::Null, format!("Invalid request: {}", e)));
                        continue;
                    }
                };

                let service = Arc::clone(&service);
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let reply = dispatch(&service, request).await;
                    let _ = reply_tx.send(reply);
                });
            }
            Some(reply) = reply_rx.recv() => {
                if socket.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Browser client disconnected");
}

/// Answer one browser request
pub async fn dispatch(service: &VStationService, request: GatewayRequest) -> Value {
    let id = request.id;

    match request.request.as_str() {
        "ping" => json!({ "id": id, "received": true }),

        "machines" => match service.get_machines().await {
            Ok(machines) => {
                let names: Vec<String> = machines.into_iter().map(|m| m.name).collect();
                json!({ "id": id, "success": true, "machines": names })
            }
            Err(e) => failure(&id, e.to_string()),
        },

        "start" => {
            let Some(name) = request.name else {
                return failure(&id, "Missing machine name");
            };
            match service.start_machine(&name).await {
                Ok(()) => json!({ "id": id, "success": true }),
                Err(e) => failure(&id, e.to_string()),
            }
        }

        "setup-ws" => {
            let Some(name) = request.name else {
                return failure(&id, "Missing machine name");
            };
            match service.ensure_bridge(&name).await {
                Ok(port) => {
                    let fxf = service.fxf_enabled(&name).await;
                    json!({ "id": id, "success": true, "port": port, "fxf": fxf })
                }
                Err(e) => failure(&id, e.to_string()),
            }
        }

        "upload" => {
            let Some(name) = request.name else {
                return failure(&id, "Missing machine name");
            };
            let (Some(filename), Some(contents)) = (request.filename, request.contents) else {
                return failure(&id, "Missing file name or contents");
            };
            let stored = match binary_string_bytes(&contents) {
                Ok(bytes) => service.upload(&name, &filename, &bytes).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(stored) => json!({ "id": id, "success": true, "filename": stored }),
                Err(e) => {
                    tracing::warn!(machine = %name, file = %filename, error = %e, "Upload rejected");
                    failure(&id, e.to_string())
                }
            }
        }

        other => failure(&id, format!("Unknown request {}", other)),
    }
}

fn failure(id: &Value, error: impl Into<String>) -> Value {
    json!({ "id": id, "success": false, "error": error.into() })
}
