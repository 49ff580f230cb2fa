//! Bridges command implementation

use anyhow::Result;

use crate::ipc::VStationClient;
use crate::output::{format_bridges, print_error};

/// Execute the bridges command
pub async fn bridges_command(client: &mut VStationClient) -> Result<()> {
    let bridges = match client.list_bridges().await {
        Ok(b) => b,
        Err(e) => {
            print_error(&format!("Failed to list bridges: {}", e));
            return Err(e);
        }
    };

    println!("{}", format_bridges(&bridges));
    Ok(())
}
