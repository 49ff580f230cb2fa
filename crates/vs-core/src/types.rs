//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HypervisorError;

/// A machine known to the hypervisor, with its fixed VNC port if it has one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInfo {
    /// Domain name as assigned by the hypervisor
    pub name: String,
    /// Fixed VNC display port, `None` when the hypervisor picks one at runtime
    pub vnc_port: Option<u16>,
}

impl MachineInfo {
    /// Create a new machine snapshot
    pub fn new(name: impl Into<String>, vnc_port: Option<u16>) -> Self {
        Self {
            name: name.into(),
            vnc_port,
        }
    }
}

/// Power state of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    NoState,
    Running,
    /// Running but blocked on a resource
    Idle,
    Paused,
    ShuttingDown,
    ShutOff,
    Crashed,
    /// Suspended by guest power management
    PmSuspended,
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainState::NoState => write!(f, "no state"),
            DomainState::Running => write!(f, "running"),
            DomainState::Idle => write!(f, "idle"),
            DomainState::Paused => write!(f, "paused"),
            DomainState::ShuttingDown => write!(f, "in shutdown"),
            DomainState::ShutOff => write!(f, "shut off"),
            DomainState::Crashed => write!(f, "crashed"),
            DomainState::PmSuspended => write!(f, "pmsuspended"),
        }
    }
}

impl FromStr for DomainState {
    type Err = HypervisorError;

    /// Parse the state names printed by `virsh domstate`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "no state" | "nostate" => Ok(DomainState::NoState),
            "running" => Ok(DomainState::Running),
            "idle" | "blocked" => Ok(DomainState::Idle),
            "paused" => Ok(DomainState::Paused),
            "in shutdown" | "shutdown" => Ok(DomainState::ShuttingDown),
            "shut off" | "shutoff" => Ok(DomainState::ShutOff),
            "crashed" => Ok(DomainState::Crashed),
            "pmsuspended" => Ok(DomainState::PmSuspended),
            other => Err(HypervisorError::UnknownState(other.to_string())),
        }
    }
}

/// A WebSocket bridge installed for a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeInfo {
    /// Machine the bridge forwards to
    pub name: String,
    /// Local port the proxy listens on
    pub local_port: u16,
    /// `host:port` of the VNC endpoint
    pub target: String,
    /// Process ID of the proxy, if still known
    pub pid: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_state_parses_virsh_output() {
        assert_eq!("running\n".parse::<DomainState>().unwrap(), DomainState::Running);
        assert_eq!("shut off".parse::<DomainState>().unwrap(), DomainState::ShutOff);
        assert_eq!("in shutdown".parse::<DomainState>().unwrap(), DomainState::ShuttingDown);
        assert_eq!("Paused".parse::<DomainState>().unwrap(), DomainState::Paused);
        assert!("levitating".parse::<DomainState>().is_err());
    }

    #[test]
    fn test_domain_state_display_round_trips() {
        for state in [
            DomainState::NoState,
            DomainState::Running,
            DomainState::Idle,
            DomainState::Paused,
            DomainState::ShuttingDown,
            DomainState::ShutOff,
            DomainState::Crashed,
            DomainState::PmSuspended,
        ] {
            assert_eq!(state.to_string().parse::<DomainState>().unwrap(), state);
        }
    }

    #[test]
    fn test_machine_info_serializes_null_port() {
        let json = serde_json::to_string(&MachineInfo::new("web01", None)).unwrap();
        assert_eq!(json, r#"{"name":"web01","vncPort":null}"#);
    }
}
