//! List command implementation

use anyhow::Result;

use crate::ipc::VStationClient;
use crate::output::{format_machines, print_error};

/// Execute the list command
pub async fn list_command(client: &mut VStationClient, long: bool) -> Result<()> {
    let machines = match client.list_machines().await {
        Ok(m) => m,
        Err(e) => {
            print_error(&format!("Failed to list machines: {}", e));
            return Err(e);
        }
    };

    // Bridge ports only show up in the long listing
    let bridges = if long {
        client.list_bridges().await?
    } else {
        Vec::new()
    };

    println!("Machines:");
    println!("{}", format_machines(&machines, &bridges, long));

    Ok(())
}
