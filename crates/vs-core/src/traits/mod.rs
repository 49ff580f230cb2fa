//! Core trait definitions

mod hypervisor;

pub use hypervisor::Hypervisor;
