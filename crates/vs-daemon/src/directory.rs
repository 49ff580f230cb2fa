//! Machine directory
//!
//! Answers inventory questions straight from the hypervisor. Nothing is
//! cached: every call re-reads domain lists and configuration, since the
//! hypervisor is the only source of truth and definitions change under us.

use std::collections::HashSet;
use std::sync::Arc;

use vs_core::config::ListingPolicy;
use vs_core::traits::Hypervisor;
use vs_core::{DomainState, HypervisorError, MachineInfo, ServiceError};

use crate::hypervisor::fixed_vnc_port;

/// Machine inventory backed by a hypervisor
pub struct MachineDirectory {
    hypervisor: Arc<dyn Hypervisor>,
}

impl MachineDirectory {
    /// Create a directory over the given hypervisor
    pub fn new(hypervisor: Arc<dyn Hypervisor>) -> Self {
        Self { hypervisor }
    }

    /// Hypervisor connection URI
    pub fn hypervisor_uri(&self) -> &str {
        self.hypervisor.uri()
    }

    /// List defined and running machines, collapsed by name
    ///
    /// Domains that disappear between enumeration and inspection are skipped.
    pub async fn list_machines(
        &self,
        policy: ListingPolicy,
    ) -> Result<Vec<MachineInfo>, ServiceError> {
        let mut names = self
            .hypervisor
            .list_defined_domains()
            .await
            .map_err(enumeration_error)?;

        for id in self
            .hypervisor
            .list_running_domains()
            .await
            .map_err(enumeration_error)?
        {
            match self.hypervisor.domain_name(id).await {
                Ok(name) => names.push(name),
                Err(HypervisorError::DomainNotFound(_)) => {
                    tracing::debug!(id, "Running domain vanished during listing");
                }
                Err(e) => return Err(enumeration_error(e)),
            }
        }

        let mut seen = HashSet::new();
        let mut machines = Vec::with_capacity(names.len());

        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }

            let xml = match self.hypervisor.domain_xml(&name).await {
                Ok(xml) => xml,
                Err(HypervisorError::DomainNotFound(_)) => {
                    tracing::debug!(machine = %name, "Domain vanished during listing");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let vnc_port = fixed_vnc_port(&name, &xml)?;
            if vnc_port.is_none() && policy == ListingPolicy::VncOnly {
                continue;
            }
            machines.push(MachineInfo::new(name, vnc_port));
        }

        tracing::debug!(count = machines.len(), %policy, "Listed machines");
        Ok(machines)
    }

    /// Fixed VNC port of a machine
    pub async fn resolve_vnc_port(&self, name: &str) -> Result<u16, ServiceError> {
        let xml = self.hypervisor.domain_xml(name).await?;
        fixed_vnc_port(name, &xml)?
            .ok_or_else(|| ServiceError::NotFound(format!("{} (no fixed VNC port)", name)))
    }

    /// Power on a machine if it is shut off
    ///
    /// Already-running machines are left alone.
    pub async fn start_machine(&self, name: &str) -> Result<(), ServiceError> {
        match self.hypervisor.domain_state(name).await? {
            DomainState::ShutOff => {
                tracing::info!(machine = %name, "Starting machine");
                self.hypervisor.start_domain(name).await?;
                Ok(())
            }
            DomainState::Running => {
                tracing::debug!(machine = %name, "Machine already running");
                Ok(())
            }
            state => Err(ServiceError::InvalidState {
                name: name.to_string(),
                state,
            }),
        }
    }
}

/// Enumeration failures are never "not found", even if the backend says so
fn enumeration_error(err: HypervisorError) -> ServiceError {
    ServiceError::Hypervisor(err.to_string())
}
