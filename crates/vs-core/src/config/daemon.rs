//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the VStation daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Hypervisor connection URI
    pub hypervisor_uri: String,

    /// Path or name of the `virsh` executable
    pub virsh_program: String,

    /// Whether machines without a fixed VNC port are listed
    pub machine_listing: ListingPolicy,

    /// IPC port for CLI communication (localhost only)
    pub ipc_port: u16,

    /// WebSocket proxy settings
    pub proxy: ProxyConfig,

    /// Browser gateway settings
    pub gateway: GatewayConfig,

    /// File transfer settings
    pub fxf: FxfConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hypervisor_uri: "qemu:///system".to_string(),
            virsh_program: "virsh".to_string(),
            machine_listing: ListingPolicy::default(),
            ipc_port: 22240,
            proxy: ProxyConfig::default(),
            gateway: GatewayConfig::default(),
            fxf: FxfConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Get the IPC address (localhost:port)
    pub fn ipc_address(&self) -> String {
        format!("127.0.0.1:{}", self.ipc_port)
    }
}

/// Which machines `ListMachines` reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingPolicy {
    /// Every machine, with a null port when none is fixed
    #[default]
    IncludeAll,
    /// Only machines with a fixed VNC port
    VncOnly,
}

impl std::fmt::Display for ListingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingPolicy::IncludeAll => write!(f, "include_all"),
            ListingPolicy::VncOnly => write!(f, "vnc_only"),
        }
    }
}

/// WebSocket-to-TCP proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy executable, invoked as `<program> <args..> <local_port> <host:vnc_port>`
    pub program: String,

    /// Leading arguments passed before the port pair
    pub args: Vec<String>,

    /// First local port handed out to a bridge
    pub base_port: u16,

    /// Host the proxy connects to for VNC
    pub target_host: String,

    /// Substring of a diagnostic line that signals the proxy is accepting
    pub readiness_marker: String,

    /// How long to wait for the readiness marker
    #[serde(with = "duration_secs")]
    pub readiness_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            program: "websockify".to_string(),
            args: Vec::new(),
            base_port: 11624,
            target_host: "localhost".to_string(),
            readiness_marker: "proxying".to_string(),
            readiness_timeout: Duration::from_secs(5),
        }
    }
}

/// Browser-facing WebSocket gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Whether the gateway is started
    pub enabled: bool,

    /// Address the gateway binds to
    pub bind_address: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:5962".to_string(),
        }
    }
}

/// File transfer (FXF) settings
///
/// Each machine's transfer directory is `<root>/<machine name>`, shared
/// into the guest. Transfer is enabled for a machine when that directory
/// exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FxfConfig {
    /// Parent of the per-machine transfer directories; unset disables transfer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Largest single upload in bytes
    pub max_upload_bytes: u64,

    /// Cap on the total size of one machine's transfer directory
    pub capacity_bytes: u64,
}

impl Default for FxfConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_upload_bytes: 128 * 1024 * 1024,
            capacity_bytes: 1024 * 1024 * 1024,
        }
    }
}

// Durations are stored as whole seconds
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
            machine_listing = "vnc_only"

            [proxy]
            base_port = 12000
            "#,
        )
        .unwrap();

        assert_eq!(config.machine_listing, ListingPolicy::VncOnly);
        assert_eq!(config.proxy.base_port, 12000);
        assert_eq!(config.proxy.readiness_marker, "proxying");
        assert_eq!(config.proxy.readiness_timeout, Duration::from_secs(5));
        assert_eq!(config.ipc_address(), "127.0.0.1:22240");
        assert!(config.gateway.enabled);
        assert!(config.fxf.root.is_none());
        assert_eq!(config.fxf.max_upload_bytes, 0x800_0000);
    }

    #[test]
    fn test_fxf_root_and_proxy_args() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [proxy]
            program = "websockify"
            args = ["--web", "/usr/share/novnc"]

            [fxf]
            root = "/srv/vstation/fxf"
            capacity_bytes = 1048576
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy.args, vec!["--web", "/usr/share/novnc"]);
        assert_eq!(config.fxf.root, Some(PathBuf::from("/srv/vstation/fxf")));
        assert_eq!(config.fxf.capacity_bytes, 1 << 20);
        assert_eq!(config.fxf.max_upload_bytes, 128 << 20);
    }
}
