//! Machine power and inspection commands

use anyhow::Result;

use crate::ipc::VStationClient;
use crate::output::{print_error, print_success};

/// Execute the start command
pub async fn start_command(client: &mut VStationClient, name: &str) -> Result<()> {
    match client.start_machine(name).await {
        Ok(()) => {
            print_success(&format!("{} is running", name));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to start {}: {}", name, e));
            Err(e)
        }
    }
}

/// Execute the vnc-port command
///
/// Prints the bare port number so the output can be used in scripts.
pub async fn vnc_port_command(client: &mut VStationClient, name: &str) -> Result<()> {
    match client.vnc_port(name).await {
        Ok(port) => {
            println!("{}", port);
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to get VNC port of {}: {}", name, e));
            Err(e)
        }
    }
}
