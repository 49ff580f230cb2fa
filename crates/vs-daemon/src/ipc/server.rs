//! IPC server implementation
//!
//! Listens on localhost TCP for newline-delimited JSON requests from the CLI.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use vs_core::ipc::{IpcRequest, IpcResponse};
use vs_core::ErrorKind;

use crate::state::DaemonState;

/// IPC server for CLI communication
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct IpcServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    /// Daemon state
    state: Arc<DaemonState>,
    /// Cancellation token for shutdown
    shutdown_token: Option<CancellationToken>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(address: String, state: Arc<DaemonState>) -> Self {
        Self {
            address,
            state,
            shutdown_token: None,
        }
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    /// Start the IPC server
    ///
    /// Returns once the shutdown token is cancelled.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", self.address))?;

        tracing::info!("IPC server listening on {}", self.address);

        let shutdown = self.shutdown_token.clone().unwrap_or_default();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    return Ok(());
                }
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    // Only accept connections from localhost
                    if !peer_addr.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                        continue;
                    }

                    let state = Arc::clone(&self.state);
                    let shutdown_token = self.shutdown_token.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, state, shutdown_token).await {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<DaemonState>,
    shutdown_token: Option<CancellationToken>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break; // EOF
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IpcRequest>(trimmed) {
            Ok(request) => handle_request(request, &state, shutdown_token.as_ref()).await,
            Err(e) => IpcResponse::Error {
                kind: ErrorKind::InvalidRequest,
                message: format!("Invalid request: {}", e),
            },
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
    }

    Ok(())
}

/// Dispatch a single request against the daemon state
pub async fn handle_request(
    request: IpcRequest,
    state: &DaemonState,
    shutdown_token: Option<&CancellationToken>,
) -> IpcResponse {
    let service = &state.service;

    match request {
        IpcRequest::GetStatus => IpcResponse::Status(state.status()),

        IpcRequest::ListMachines => match service.get_machines().await {
            Ok(machines) => IpcResponse::Machines { machines },
            Err(e) => e.into(),
        },

        IpcRequest::StartMachine { name } => match service.start_machine(&name).await {
            Ok(()) => IpcResponse::Ok,
            Err(e) => {
                tracing::warn!(machine = %name, "Start failed: {}", e);
                e.into()
            }
        },

        IpcRequest::GetVncPort { name } => match service.get_vnc_port(&name).await {
            Ok(port) => IpcResponse::VncPort { name, port },
            Err(e) => e.into(),
        },

        IpcRequest::SetupConnection { name } => match service.ensure_bridge(&name).await {
            Ok(port) => IpcResponse::Connection { name, port },
            Err(e) => {
                tracing::warn!(machine = %name, "Bridge setup failed: {}", e);
                e.into()
            }
        },

        IpcRequest::ListBridges => IpcResponse::Bridges {
            bridges: service.bridges(),
        },

        IpcRequest::Ping => IpcResponse::Pong,

        IpcRequest::Shutdown => {
            tracing::info!("Shutdown requested via IPC");
            if let Some(token) = shutdown_token {
                token.cancel();
                IpcResponse::Ok
            } else {
                IpcResponse::Error {
                    kind: ErrorKind::Unsupported,
                    message: "Shutdown not supported (no shutdown token configured)".to_string(),
                }
            }
        }
    }
}
