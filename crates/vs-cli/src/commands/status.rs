//! Status command implementation

use anyhow::Result;

use crate::ipc::VStationClient;
use crate::output::{format_status, print_error};

/// Execute the status command
pub async fn status_command(client: &mut VStationClient) -> Result<()> {
    let status = match client.status().await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to get daemon status: {}", e));
            print_error("Is the daemon running? Try: vstation serve");
            return Err(e);
        }
    };

    println!("{}", format_status(&status));

    Ok(())
}
