//! vs-core: Core abstractions and configuration for VStation
//!
//! This crate provides the shared types, error taxonomy, configuration
//! structures and IPC protocol used by the daemon and the CLI, plus the
//! trait the daemon uses to talk to the hypervisor.

pub mod config;
pub mod error;
pub mod ipc;
pub mod traits;
pub mod types;

pub use error::{ErrorKind, HypervisorError, ServiceError};
pub use types::{BridgeInfo, DomainState, MachineInfo};
