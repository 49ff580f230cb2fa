//! Service facade
//!
//! The operation surface exposed over IPC and the browser gateway. Each
//! operation delegates to the directory or the bridge registry; errors come
//! back as [`ServiceError`] for the transport to encode.

use std::sync::Arc;

use vs_core::config::{DaemonConfig, FxfConfig, ListingPolicy};
use vs_core::traits::Hypervisor;
use vs_core::{BridgeInfo, MachineInfo, ServiceError};

use crate::bridge::{
    BridgeRegistry, CommandLauncher, PortAllocator, ProxyLauncher, ProxySupervisor,
};
use crate::directory::MachineDirectory;
use crate::fxf::{FileTransfer, TransferError};

/// VM inventory and VNC bridge operations
pub struct VStationService {
    directory: MachineDirectory,
    bridges: BridgeRegistry,
    listing: ListingPolicy,
    transfers: FileTransfer,
}

impl VStationService {
    /// Compose a service from its parts
    pub fn new(directory: MachineDirectory, bridges: BridgeRegistry, listing: ListingPolicy) -> Self {
        Self {
            directory,
            bridges,
            listing,
            transfers: FileTransfer::new(&FxfConfig::default()),
        }
    }

    /// Enable uploads through the given transfer directories
    pub fn with_file_transfer(mut self, transfers: FileTransfer) -> Self {
        self.transfers = transfers;
        self
    }

    /// Build a service from configuration with the given collaborators
    pub fn from_config(
        config: &DaemonConfig,
        hypervisor: Arc<dyn Hypervisor>,
        launcher: Arc<dyn ProxyLauncher>,
    ) -> Self {
        let supervisor = ProxySupervisor::new(launcher, &config.proxy);
        let bridges = BridgeRegistry::new(PortAllocator::new(config.proxy.base_port), supervisor);
        Self::new(
            MachineDirectory::new(hypervisor),
            bridges,
            config.machine_listing,
        )
        .with_file_transfer(FileTransfer::new(&config.fxf))
    }

    /// Build a service that launches the configured proxy executable
    pub fn with_command_launcher(config: &DaemonConfig, hypervisor: Arc<dyn Hypervisor>) -> Self {
        let launcher = Arc::new(CommandLauncher::from_config(&config.proxy));
        Self::from_config(config, hypervisor, launcher)
    }

    /// List machines according to the listing policy
    pub async fn get_machines(&self) -> Result<Vec<MachineInfo>, ServiceError> {
        self.directory.list_machines(self.listing).await
    }

    /// Power on a machine; running machines are left alone
    pub async fn start_machine(&self, name: &str) -> Result<(), ServiceError> {
        self.directory.start_machine(name).await
    }

    /// Fixed VNC port of a machine
    pub async fn get_vnc_port(&self, name: &str) -> Result<u16, ServiceError> {
        self.directory.resolve_vnc_port(name).await
    }

    /// Local WebSocket port bridging to a machine's VNC display
    pub async fn ensure_bridge(&self, name: &str) -> Result<u16, ServiceError> {
        let vnc_port = self.directory.resolve_vnc_port(name).await?;
        self.bridges.ensure(name, vnc_port).await
    }

    /// Whether `name` accepts uploads
    pub async fn fxf_enabled(&self, name: &str) -> bool {
        self.transfers.is_enabled(name).await
    }

    /// Store an upload in a machine's transfer directory
    pub async fn upload(
        &self,
        name: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<String, TransferError> {
        self.transfers.upload(name, filename, contents).await
    }

    /// Largest accepted upload in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.transfers.max_upload_bytes()
    }

    /// Installed bridges
    pub fn bridges(&self) -> Vec<BridgeInfo> {
        self.bridges.list()
    }

    /// Machine listing policy in effect
    pub fn listing_policy(&self) -> ListingPolicy {
        self.listing
    }

    /// Hypervisor connection URI
    pub fn hypervisor_uri(&self) -> &str {
        self.directory.hypervisor_uri()
    }
}
