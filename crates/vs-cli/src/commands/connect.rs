//! Connect command implementation

use anyhow::Result;

use crate::ipc::VStationClient;
use crate::output::{print_error, print_info};

/// WebSocket URL a browser VNC client should open
pub fn websocket_url(host: &str, port: u16) -> String {
    format!("ws://{}:{}", host, port)
}

/// Execute the connect command
///
/// Ensures a bridge exists, optionally powering the machine on first.
pub async fn connect_command(
    client: &mut VStationClient,
    name: &str,
    host: &str,
    start: bool,
) -> Result<()> {
    if start {
        if let Err(e) = client.start_machine(name).await {
            print_error(&format!("Failed to start {}: {}", name, e));
            return Err(e);
        }
    }

    let port = match client.setup_connection(name).await {
        Ok(port) => port,
        Err(e) => {
            print_error(&format!("Failed to set up bridge to {}: {}", name, e));
            return Err(e);
        }
    };

    print_info(&format!("Bridge to {} listening on port {}", name, port));
    println!("{}", websocket_url(host, port));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(websocket_url("localhost", 11624), "ws://localhost:11624");
    }
}
