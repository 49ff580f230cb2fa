//! IPC client for communicating with the daemon
//!
//! Uses TCP on localhost for cross-platform compatibility.

mod client;

pub use client::VStationClient;

// Re-export constants and types from vs_core
pub use vs_core::ipc::{default_ipc_address, DaemonStatus, DEFAULT_IPC_PORT};
pub use vs_core::{BridgeInfo, MachineInfo};
