//! IPC protocol for CLI to daemon communication
//!
//! Uses newline-delimited JSON messages over TCP on localhost (127.0.0.1).

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ServiceError};
use crate::types::{BridgeInfo, MachineInfo};

/// Default IPC port
pub const DEFAULT_IPC_PORT: u16 = 22240;

/// Default IPC address
pub fn default_ipc_address() -> String {
    format!("127.0.0.1:{}", DEFAULT_IPC_PORT)
}

/// IPC request from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Get daemon status
    GetStatus,

    /// List machines known to the hypervisor
    ListMachines,

    /// Power on a machine
    StartMachine { name: String },

    /// Get a machine's fixed VNC port
    GetVncPort { name: String },

    /// Ensure a WebSocket bridge exists for a machine
    SetupConnection { name: String },

    /// List installed bridges
    ListBridges,

    /// Ping (for keepalive)
    Ping,

    /// Shutdown the daemon
    Shutdown,
}

/// IPC response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Daemon status
    Status(DaemonStatus),

    /// List of machines
    Machines { machines: Vec<MachineInfo> },

    /// A machine's VNC port
    VncPort { name: String, port: u16 },

    /// Local WebSocket port bridging to a machine
    Connection { name: String, port: u16 },

    /// List of bridges
    Bridges { bridges: Vec<BridgeInfo> },

    /// Generic success
    Ok,

    /// Error response
    Error { kind: ErrorKind, message: String },

    /// Pong response
    Pong,
}

impl From<ServiceError> for IpcResponse {
    fn from(err: ServiceError) -> Self {
        IpcResponse::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Daemon status information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    /// Whether the daemon is running
    pub running: bool,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Daemon version
    pub version: String,
    /// Hypervisor connection URI
    pub hypervisor_uri: String,
    /// Number of installed bridges
    pub bridge_count: usize,
    /// Machine listing policy
    pub machine_listing: String,
    /// Gateway bind address, if the gateway is enabled
    pub gateway_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = IpcRequest::SetupConnection {
            name: "db01".to_string(),
        };

        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"setup_connection","name":"db01"}"#);

        match serde_json::from_str::<IpcRequest>(&json).unwrap() {
            IpcRequest::SetupConnection { name } => assert_eq!(name, "db01"),
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_unit_request_deserialization() {
        let req: IpcRequest = serde_json::from_str(r#"{"type":"list_machines"}"#).unwrap();
        assert!(matches!(req, IpcRequest::ListMachines));
    }

    #[test]
    fn test_service_error_becomes_error_response() {
        let resp = IpcResponse::from(ServiceError::NotFound("web01".to_string()));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""kind":"not_found""#));
        assert!(json.contains("web01"));
    }

    #[test]
    fn test_machines_response_serialization() {
        let resp = IpcResponse::Machines {
            machines: vec![
                MachineInfo::new("db01", Some(5901)),
                MachineInfo::new("web01", None),
            ],
        };

        let json = serde_json::to_string(&resp).unwrap();
        match serde_json::from_str::<IpcResponse>(&json).unwrap() {
            IpcResponse::Machines { machines } => {
                assert_eq!(machines.len(), 2);
                assert_eq!(machines[0].vnc_port, Some(5901));
                assert_eq!(machines[1].vnc_port, None);
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }
}
