//! Global daemon state

use std::sync::Arc;
use std::time::Instant;

use vs_core::config::DaemonConfig;
use vs_core::ipc::DaemonStatus;

use crate::hypervisor::VirshHypervisor;
use crate::service::VStationService;

/// Shared state for the daemon's front ends
pub struct DaemonState {
    /// Configuration
    pub config: DaemonConfig,
    /// Operation surface
    pub service: Arc<VStationService>,
    /// When the daemon started
    pub started_at: Instant,
}

impl DaemonState {
    /// Create state around an existing service
    pub fn new(config: DaemonConfig, service: VStationService) -> Self {
        Self {
            config,
            service: Arc::new(service),
            started_at: Instant::now(),
        }
    }

    /// Create state talking to `virsh` and launching the configured proxy
    pub fn from_config(config: DaemonConfig) -> Self {
        let hypervisor = Arc::new(VirshHypervisor::new(
            config.virsh_program.clone(),
            config.hypervisor_uri.clone(),
        ));
        let service = VStationService::with_command_launcher(&config, hypervisor);
        Self::new(config, service)
    }

    /// Snapshot of daemon status
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            running: true,
            uptime_secs: self.started_at.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hypervisor_uri: self.service.hypervisor_uri().to_string(),
            bridge_count: self.service.bridges().len(),
            machine_listing: self.service.listing_policy().to_string(),
            gateway_address: self
                .config
                .gateway
                .enabled
                .then(|| self.config.gateway.bind_address.clone()),
        }
    }
}
