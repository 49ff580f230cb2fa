//! Hypervisor trait

use async_trait::async_trait;

use crate::error::HypervisorError;
use crate::types::DomainState;

/// Abstraction over the local hypervisor connection
///
/// Implementations must tolerate concurrent calls; the daemon shares a
/// single instance across every in-flight request.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Names of defined domains that are not currently running
    async fn list_defined_domains(&self) -> Result<Vec<String>, HypervisorError>;

    /// IDs of running domains
    async fn list_running_domains(&self) -> Result<Vec<u32>, HypervisorError>;

    /// Resolve a running domain's ID to its name
    async fn domain_name(&self, id: u32) -> Result<String, HypervisorError>;

    /// Current power state of a domain
    async fn domain_state(&self, name: &str) -> Result<DomainState, HypervisorError>;

    /// Power on a shut off domain
    async fn start_domain(&self, name: &str) -> Result<(), HypervisorError>;

    /// Domain configuration as an XML document
    async fn domain_xml(&self, name: &str) -> Result<String, HypervisorError>;

    /// Connection URI, for status reporting
    fn uri(&self) -> &str;
}
