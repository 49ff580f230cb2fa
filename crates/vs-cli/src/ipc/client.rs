//! IPC client for communicating with the daemon
//!
//! One connection is opened lazily and reused for every request.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use vs_core::ipc::{default_ipc_address, DaemonStatus, IpcRequest, IpcResponse};
use vs_core::{BridgeInfo, MachineInfo};

/// Client for communicating with the VStation daemon
pub struct VStationClient {
    address: String,
    stream: Option<BufReader<TcpStream>>,
}

impl VStationClient {
    /// Create a new client with default address
    pub fn new() -> Self {
        Self::with_address(default_ipc_address())
    }

    /// Create a new client with custom address
    pub fn with_address(address: String) -> Self {
        Self {
            address,
            stream: None,
        }
    }

    /// Get the address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect to the daemon
    pub async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to daemon at {}", self.address);

        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {}. Is it running?",
                self.address
            )
        })?;

        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    /// Check if the daemon is running
    pub async fn ping(&mut self) -> Result<bool> {
        match self.send_request(IpcRequest::Ping).await? {
            IpcResponse::Pong => Ok(true),
            _ => Ok(false),
        }
    }

    /// Get daemon status
    pub async fn status(&mut self) -> Result<DaemonStatus> {
        match self.send_request(IpcRequest::GetStatus).await? {
            IpcResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    /// List machines
    pub async fn list_machines(&mut self) -> Result<Vec<MachineInfo>> {
        match self.send_request(IpcRequest::ListMachines).await? {
            IpcResponse::Machines { machines } => Ok(machines),
            other => Err(unexpected(other)),
        }
    }

    /// Power on a machine
    pub async fn start_machine(&mut self, name: &str) -> Result<()> {
        let request = IpcRequest::StartMachine {
            name: name.to_string(),
        };

        match self.send_request(request).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Get a machine's fixed VNC port
    pub async fn vnc_port(&mut self, name: &str) -> Result<u16> {
        let request = IpcRequest::GetVncPort {
            name: name.to_string(),
        };

        match self.send_request(request).await? {
            IpcResponse::VncPort { port, .. } => Ok(port),
            other => Err(unexpected(other)),
        }
    }

    /// Ensure a WebSocket bridge to a machine and return its local port
    pub async fn setup_connection(&mut self, name: &str) -> Result<u16> {
        let request = IpcRequest::SetupConnection {
            name: name.to_string(),
        };

        match self.send_request(request).await? {
            IpcResponse::Connection { port, .. } => Ok(port),
            other => Err(unexpected(other)),
        }
    }

    /// List installed bridges
    pub async fn list_bridges(&mut self) -> Result<Vec<BridgeInfo>> {
        match self.send_request(IpcRequest::ListBridges).await? {
            IpcResponse::Bridges { bridges } => Ok(bridges),
            other => Err(unexpected(other)),
        }
    }

    /// Shutdown the daemon
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.send_request(IpcRequest::Shutdown).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Send a request and receive response (used by all public methods)
    ///
    /// Error responses are turned into `Err` here.
    async fn send_request(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        self.connect().await?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;

        // Send request as JSON line
        let mut request_json = serde_json::to_string(&request)?;
        request_json.push('\n');
        stream.get_mut().write_all(request_json.as_bytes()).await?;

        // Read response line
        let mut response_line = String::new();
        if stream.read_line(&mut response_line).await? == 0 {
            self.stream = None;
            anyhow::bail!("Daemon closed the connection");
        }

        match serde_json::from_str::<IpcResponse>(&response_line)
            .context("Failed to parse daemon response")?
        {
            IpcResponse::Error { kind, message } => {
                tracing::debug!(?kind, "Daemon returned an error");
                anyhow::bail!("{}", message)
            }
            response => Ok(response),
        }
    }
}

impl Default for VStationClient {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected(response: IpcResponse) -> anyhow::Error {
    anyhow::anyhow!("Unexpected response: {:?}", response)
}
