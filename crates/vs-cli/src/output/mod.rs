//! Output formatting utilities for the CLI
//!
//! Tables for machines and bridges, the status display, and colored
//! status messages.

use tabled::{settings::Style, Table, Tabled};

use crate::ipc::{BridgeInfo, DaemonStatus, MachineInfo};

/// Format a list of machines as an ASCII table
///
/// The detailed view adds the local WebSocket port of any installed bridge.
pub fn format_machines(machines: &[MachineInfo], bridges: &[BridgeInfo], detailed: bool) -> String {
    if machines.is_empty() {
        return "No machines defined".to_string();
    }

    #[derive(Tabled)]
    struct MachineRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "VNC PORT")]
        vnc_port: String,
    }

    #[derive(Tabled)]
    struct MachineRowDetailed {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "VNC PORT")]
        vnc_port: String,
        #[tabled(rename = "BRIDGE PORT")]
        bridge_port: String,
    }

    if detailed {
        let rows: Vec<MachineRowDetailed> = machines
            .iter()
            .map(|m| MachineRowDetailed {
                name: m.name.clone(),
                vnc_port: or_dash(m.vnc_port),
                bridge_port: or_dash(
                    bridges
                        .iter()
                        .find(|b| b.name == m.name)
                        .map(|b| b.local_port),
                ),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    } else {
        let rows: Vec<MachineRow> = machines
            .iter()
            .map(|m| MachineRow {
                name: m.name.clone(),
                vnc_port: or_dash(m.vnc_port),
            })
            .collect();

        Table::new(rows).with(Style::rounded()).to_string()
    }
}

/// Format installed bridges as an ASCII table
pub fn format_bridges(bridges: &[BridgeInfo]) -> String {
    if bridges.is_empty() {
        return "No active bridges".to_string();
    }

    #[derive(Tabled)]
    struct BridgeRow {
        #[tabled(rename = "MACHINE")]
        name: String,
        #[tabled(rename = "LOCAL PORT")]
        local_port: u16,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "PID")]
        pid: String,
    }

    let rows: Vec<BridgeRow> = bridges
        .iter()
        .map(|b| BridgeRow {
            name: b.name.clone(),
            local_port: b.local_port,
            target: b.target.clone(),
            pid: or_dash(b.pid),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format daemon status as a human-readable string
pub fn format_status(status: &DaemonStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Daemon Status: {}\n",
        if status.running { "Running" } else { "Stopped" }
    ));
    output.push_str(&format!("Version: {}\n", status.version));
    output.push_str(&format!("Uptime: {}\n", format_duration(status.uptime_secs)));
    output.push_str(&format!("Hypervisor: {}\n", status.hypervisor_uri));
    output.push_str(&format!("Machine Listing: {}\n", status.machine_listing));
    output.push_str(&format!(
        "Browser Gateway: {}\n",
        status.gateway_address.as_deref().unwrap_or("disabled")
    ));
    output.push_str(&format!("Active Bridges: {}\n", status.bridge_count));

    output
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(name: &str, port: u16) -> BridgeInfo {
        BridgeInfo {
            name: name.to_string(),
            local_port: port,
            target: "localhost:5901".to_string(),
            pid: Some(4242),
        }
    }

    #[test]
    fn test_format_machines_empty() {
        assert_eq!(format_machines(&[], &[], false), "No machines defined");
    }

    #[test]
    fn test_format_machines_dash_for_missing_port() {
        let machines = vec![
            MachineInfo::new("web01", None),
            MachineInfo::new("db01", Some(5901)),
        ];
        let table = format_machines(&machines, &[], false);
        assert!(table.contains("web01"));
        assert!(table.contains("5901"));
        assert!(table.contains(" - "));
        assert!(!table.contains("BRIDGE PORT"));
    }

    #[test]
    fn test_format_machines_detailed_shows_bridge() {
        let machines = vec![MachineInfo::new("db01", Some(5901))];
        let table = format_machines(&machines, &[bridge("db01", 11624)], true);
        assert!(table.contains("BRIDGE PORT"));
        assert!(table.contains("11624"));
    }

    #[test]
    fn test_format_bridges() {
        assert_eq!(format_bridges(&[]), "No active bridges");

        let table = format_bridges(&[bridge("db01", 11624)]);
        assert!(table.contains("db01"));
        assert!(table.contains("localhost:5901"));
        assert!(table.contains("4242"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_format_status_gateway_disabled() {
        let status = DaemonStatus {
            running: true,
            uptime_secs: 5,
            version: "0.1.0".to_string(),
            hypervisor_uri: "qemu:///system".to_string(),
            bridge_count: 2,
            machine_listing: "vnc_only".to_string(),
            gateway_address: None,
        };
        let text = format_status(&status);
        assert!(text.contains("Running"));
        assert!(text.contains("qemu:///system"));
        assert!(text.contains("Browser Gateway: disabled"));
        assert!(text.contains("Active Bridges: 2"));
    }
}
