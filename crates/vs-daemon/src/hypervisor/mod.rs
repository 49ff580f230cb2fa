//! Hypervisor backends and domain configuration parsing

mod domain_xml;
mod virsh;

pub use domain_xml::fixed_vnc_port;
pub use virsh::VirshHypervisor;
