//! VStation daemon library
//!
//! The daemon keeps an inventory of the host's virtual machines and hands
//! out WebSocket bridges to their VNC displays on demand. It exposes:
//!
//! - An IPC server for the `vstation` CLI
//! - A WebSocket gateway for the browser client, including uploads into
//!   each machine's file transfer directory
//!
//! Both front ends drive the same [`VStationService`].

pub mod bridge;
pub mod daemon;
pub mod directory;
pub mod fxf;
pub mod gateway;
pub mod hypervisor;
pub mod ipc;
pub mod service;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use daemon::run;
pub use directory::MachineDirectory;
pub use service::VStationService;
pub use state::DaemonState;
