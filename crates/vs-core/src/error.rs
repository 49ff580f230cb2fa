//! Core error types for VStation

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DomainState;

/// Failure of a service operation, as surfaced to callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The hypervisor rejected or failed a call
    #[error("Hypervisor error: {0}")]
    Hypervisor(String),

    /// Machine does not exist or has no fixed VNC port
    #[error("Machine not found: {0}")]
    NotFound(String),

    /// Machine is neither shut off nor running
    #[error("Machine {name} is {state}; it must be shut off or running")]
    InvalidState { name: String, state: DomainState },

    /// The proxy process could not be started
    #[error("Failed to launch proxy: {0}")]
    BridgeLaunch(String),

    /// The proxy process did not report readiness in time
    #[error("Proxy for {name} did not become ready within {timeout:?}")]
    BridgeTimeout { name: String, timeout: Duration },
}

impl ServiceError {
    /// Wire-level tag for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Hypervisor(_) => ErrorKind::Hypervisor,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidState { .. } => ErrorKind::InvalidState,
            ServiceError::BridgeLaunch(_) => ErrorKind::BridgeLaunch,
            ServiceError::BridgeTimeout { .. } => ErrorKind::BridgeTimeout,
        }
    }
}

/// Error category carried in IPC error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Hypervisor,
    NotFound,
    InvalidState,
    BridgeLaunch,
    BridgeTimeout,
    /// The request itself could not be decoded
    InvalidRequest,
    /// The daemon cannot honor the request in its current setup
    Unsupported,
}

/// Errors reported by a hypervisor backend
#[derive(Error, Debug)]
pub enum HypervisorError {
    /// No domain with the given name or ID
    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    /// Hypervisor tool ran but reported failure
    #[error("{operation} failed: {message}")]
    Command { operation: String, message: String },

    /// Hypervisor tool could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Domain configuration document could not be parsed
    #[error("Malformed configuration for domain {domain}: {message}")]
    MalformedConfig { domain: String, message: String },

    /// Power state string not recognized
    #[error("Unrecognized domain state: {0}")]
    UnknownState(String),
}

impl From<HypervisorError> for ServiceError {
    fn from(err: HypervisorError) -> Self {
        match err {
            HypervisorError::DomainNotFound(name) => ServiceError::NotFound(name),
            other => ServiceError::Hypervisor(other.to_string()),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_not_found_maps_to_not_found() {
        let err: ServiceError = HypervisorError::DomainNotFound("web01".into()).into();
        assert_eq!(err, ServiceError::NotFound("web01".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_command_failure_keeps_cause_text() {
        let err: ServiceError = HypervisorError::Command {
            operation: "start db01".into(),
            message: "internal error: process exited".into(),
        }
        .into();

        match err {
            ServiceError::Hypervisor(message) => {
                assert!(message.contains("start db01"));
                assert!(message.contains("process exited"));
            }
            other => panic!("Expected hypervisor error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::BridgeTimeout).unwrap();
        assert_eq!(json, "\"bridge_timeout\"");
    }
}
