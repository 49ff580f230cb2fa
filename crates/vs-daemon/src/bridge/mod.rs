//! WebSocket bridge management
//!
//! A bridge is an external proxy process listening on a local port and
//! forwarding WebSocket traffic to a machine's VNC port. The registry
//! guarantees at most one bridge per machine; the supervisor starts proxy
//! processes and waits for them to report readiness.

mod allocator;
mod registry;
mod supervisor;

pub use allocator::PortAllocator;
pub use registry::{BridgeEntry, BridgeRegistry};
pub use supervisor::{
    wait_for_readiness, CommandLauncher, LaunchedProxy, ProxyHandle, ProxyLauncher,
    ProxySupervisor, Readiness,
};
