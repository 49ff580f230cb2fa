//! IPC integration tests
//!
//! Tests the IPC server over real localhost TCP.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use vs_core::config::DaemonConfig;
use vs_core::ipc::{IpcRequest, IpcResponse};
use vs_core::{DomainState, ErrorKind};
use vs_daemon::ipc::IpcServer;
use vs_daemon::testing::{
    plain_domain_xml, vnc_domain_xml, MockHypervisor, ProxyBehavior, ScriptedLauncher,
};
use vs_daemon::{DaemonState, VStationService};

/// Base port for test servers - each test gets a unique offset
static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

/// Get a unique port for this test
fn get_test_port() -> u16 {
    let offset = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    39200 + offset
}

/// Test state with `web01` (shut off, no graphics) and `db01` (running, VNC 5901)
fn create_test_state(port: u16) -> Arc<DaemonState> {
    let mut config = DaemonConfig::default();
    config.ipc_port = port;
    config.gateway.enabled = false;

    let hypervisor = Arc::new(
        MockHypervisor::new()
            .with_domain("web01", DomainState::ShutOff, plain_domain_xml("web01"))
            .with_domain("db01", DomainState::Running, vnc_domain_xml("db01", 5901)),
    );
    let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Ready));
    let service = VStationService::from_config(&config, hypervisor, launcher);

    Arc::new(DaemonState::new(config, service))
}

/// IPC test client wrapper
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(address: &str) -> Self {
        // Retry connection a few times in case server isn't ready
        let mut last_err = None;
        for _ in 0..20 {
            match TcpStream::connect(address).await {
                Ok(stream) => {
                    let (reader, writer) = stream.into_split();
                    return Self {
                        reader: BufReader::new(reader),
                        writer: BufWriter::new(writer),
                    };
                }
                Err(e) => {
                    last_err = Some(e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
        panic!(
            "Failed to connect to IPC server at {}: {:?}",
            address, last_err
        );
    }

    async fn send_raw(&mut self, line: &str) -> IpcResponse {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("Failed to write request");
        self.writer.write_all(b"\n").await.expect("Failed to write");
        self.writer.flush().await.expect("Failed to flush");

        let mut response_line = String::new();
        self.reader
            .read_line(&mut response_line)
            .await
            .expect("Failed to read response");

        if response_line.is_empty() {
            panic!("Server sent empty response (connection closed?)");
        }

        serde_json::from_str(&response_line).expect("Failed to parse response")
    }

    async fn send_request(&mut self, request: IpcRequest) -> IpcResponse {
        let request_json = serde_json::to_string(&request).expect("Failed to serialize request");
        self.send_raw(&request_json).await
    }
}

/// Start a server in the background and return its address
fn spawn_server(
    token: Option<CancellationToken>,
) -> (String, Arc<DaemonState>, tokio::task::JoinHandle<()>) {
    let port = get_test_port();
    let state = create_test_state(port);
    let address = state.config.ipc_address();

    let mut server = IpcServer::new(address.clone(), Arc::clone(&state));
    if let Some(token) = token {
        server = server.with_shutdown_token(token);
    }

    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    (address, state, handle)
}

#[tokio::test]
async fn test_ipc_ping_pong() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    let response = client.send_request(IpcRequest::Ping).await;
    assert!(matches!(response, IpcResponse::Pong));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_get_status() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    match client.send_request(IpcRequest::GetStatus).await {
        IpcResponse::Status(status) => {
            assert!(status.running);
            assert_eq!(status.bridge_count, 0);
            assert_eq!(status.hypervisor_uri, "test:///default");
            assert_eq!(status.machine_listing, "include_all");
            assert!(status.gateway_address.is_none());
        }
        other => panic!("Expected Status response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_list_machines() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    match client.send_request(IpcRequest::ListMachines).await {
        IpcResponse::Machines { machines } => {
            let names: Vec<_> = machines.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["web01", "db01"]);
            assert_eq!(machines[1].vnc_port, Some(5901));
        }
        other => panic!("Expected Machines response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_get_vnc_port_not_found() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    let response = client
        .send_request(IpcRequest::GetVncPort {
            name: "web01".to_string(),
        })
        .await;

    match response {
        IpcResponse::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::NotFound);
            assert!(message.contains("web01"));
        }
        other => panic!("Expected Error response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_setup_connection_and_list_bridges() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;

    for _ in 0..2 {
        let response = client
            .send_request(IpcRequest::SetupConnection {
                name: "db01".to_string(),
            })
            .await;
        match response {
            IpcResponse::Connection { name, port } => {
                assert_eq!(name, "db01");
                assert_eq!(port, 11624);
            }
            other => panic!("Expected Connection response, got {:?}", other),
        }
    }

    match client.send_request(IpcRequest::ListBridges).await {
        IpcResponse::Bridges { bridges } => {
            assert_eq!(bridges.len(), 1);
            assert_eq!(bridges[0].target, "localhost:5901");
        }
        other => panic!("Expected Bridges response, got {:?}", other),
    }

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_start_machine() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    let response = client
        .send_request(IpcRequest::StartMachine {
            name: "web01".to_string(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Ok));

    let response = client
        .send_request(IpcRequest::StartMachine {
            name: "ghost".to_string(),
        })
        .await;
    assert!(matches!(
        response,
        IpcResponse::Error {
            kind: ErrorKind::NotFound,
            ..
        }
    ));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_invalid_request() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    let response = client.send_raw("{\"type\":\"reboot_everything\"}").await;
    assert!(matches!(
        response,
        IpcResponse::Error {
            kind: ErrorKind::InvalidRequest,
            ..
        }
    ));

    // Connection stays usable after a bad line
    let response = client.send_request(IpcRequest::Ping).await;
    assert!(matches!(response, IpcResponse::Pong));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_shutdown_without_token_is_unsupported() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut client = TestClient::connect(&address).await;
    let response = client.send_request(IpcRequest::Shutdown).await;
    assert!(matches!(
        response,
        IpcResponse::Error {
            kind: ErrorKind::Unsupported,
            ..
        }
    ));

    server_handle.abort();
}

#[tokio::test]
async fn test_ipc_shutdown_stops_server() {
    let token = CancellationToken::new();
    let (address, _state, server_handle) = spawn_server(Some(token.clone()));

    let mut client = TestClient::connect(&address).await;
    let response = client.send_request(IpcRequest::Shutdown).await;
    assert!(matches!(response, IpcResponse::Ok));
    assert!(token.is_cancelled());

    timeout(Duration::from_secs(2), server_handle)
        .await
        .expect("Server did not stop")
        .expect("Server task panicked");
}

#[tokio::test]
async fn test_ipc_multiple_clients() {
    let (address, _state, server_handle) = spawn_server(None);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let address = address.clone();
        handles.push(tokio::spawn(async move {
            let mut client = TestClient::connect(&address).await;
            client
                .send_request(IpcRequest::SetupConnection {
                    name: "db01".to_string(),
                })
                .await
        }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            IpcResponse::Connection { port, .. } => assert_eq!(port, 11624),
            other => panic!("Expected Connection response, got {:?}", other),
        }
    }

    server_handle.abort();
}
