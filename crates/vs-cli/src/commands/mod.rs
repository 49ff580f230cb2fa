//! CLI command implementations

mod bridges;
mod config;
mod connect;
mod list;
mod start;
mod status;

pub use bridges::bridges_command;
pub use config::{config_init, config_path, config_show};
pub use connect::{connect_command, websocket_url};
pub use list::list_command;
pub use start::{start_command, vnc_port_command};
pub use status::status_command;
