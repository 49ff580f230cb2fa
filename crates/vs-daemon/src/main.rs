//! VStation Daemon
//!
//! Lists the host's virtual machines, powers them on, and bridges their
//! VNC displays to WebSocket ports for the browser client.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vs_core::config;

#[derive(Parser)]
#[command(name = "vstationd")]
#[command(about = "VStation daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IPC port (overrides config)
    #[arg(long)]
    ipc_port: Option<u16>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config::load_daemon_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(port) = args.ipc_port {
        config.ipc_port = port;
    }

    let shutdown = CancellationToken::new();
    vs_daemon::daemon::spawn_signal_handler(shutdown.clone());

    vs_daemon::run(config, shutdown).await
}
