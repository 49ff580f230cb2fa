//! VStation CLI
//!
//! Single binary for VStation operations:
//! - Daemon (`serve`), running the IPC server and browser gateway
//! - Management commands (list, start, connect, etc.)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vs_core::config::{self, DaemonConfig, ListingPolicy};
use vstation::commands;
use vstation::ipc::VStationClient;
use vstation::output::{print_error, print_info, print_success, print_warning};

#[derive(Parser)]
#[command(name = "vstation")]
#[command(author, version, about = "Browser VNC access to virtual machines")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daemon IPC address (overrides config)
    #[arg(long, global = true, env = "VSTATION_IPC_ADDRESS")]
    address: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Serve {
        /// IPC port (overrides config)
        #[arg(long)]
        ipc_port: Option<u16>,
        /// Gateway bind address (overrides config)
        #[arg(long)]
        gateway: Option<String>,
        /// Do not start the browser gateway
        #[arg(long)]
        no_gateway: bool,
        /// Only list machines with a fixed VNC port
        #[arg(long)]
        vnc_only: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    #[command(flatten)]
    Client(ClientCommand),
}

/// Commands answered by a running daemon
#[derive(Subcommand)]
enum ClientCommand {
    /// Stop the daemon
    Stop,

    /// Check whether the daemon is reachable
    Ping,

    /// List virtual machines and their VNC ports
    List {
        /// Also show bridge ports
        #[arg(short, long)]
        long: bool,
    },

    /// Power on a machine
    Start {
        /// Machine name
        name: String,
    },

    /// Print a machine's fixed VNC port
    VncPort {
        /// Machine name
        name: String,
    },

    /// Set up a WebSocket bridge to a machine's VNC display
    Connect {
        /// Machine name
        name: String,
        /// Host name used in the printed URL
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Power the machine on first
        #[arg(short, long)]
        start: bool,
    },

    /// List active WebSocket bridges
    Bridges,

    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path),
            ConfigAction::Init { force } => commands::config_init(config_path, force),
            ConfigAction::Path => commands::config_path(config_path),
        },

        Commands::Serve {
            ipc_port,
            gateway,
            no_gateway,
            vnc_only,
        } => {
            let mut config = load_config(config_path)?;
            if let Some(port) = ipc_port {
                config.ipc_port = port;
            }
            if let Some(bind) = gateway {
                config.gateway.bind_address = bind;
            }
            if no_gateway {
                config.gateway.enabled = false;
            }
            if vnc_only {
                config.machine_listing = ListingPolicy::VncOnly;
            }
            serve(config).await
        }

        Commands::Client(command) => {
            let address = match cli.address {
                Some(address) => address,
                None => load_config(config_path)?.ipc_address(),
            };
            run_client_command(command, VStationClient::with_address(address)).await
        }
    }
}

async fn run_client_command(command: ClientCommand, mut client: VStationClient) -> Result<()> {
    match command {
        ClientCommand::Stop => {
            print_info("Stopping daemon...");
            match client.shutdown().await {
                Ok(()) => print_success("Daemon stopped"),
                Err(e) if e.to_string().contains("Is it running") => {
                    print_warning("Daemon is not running");
                }
                Err(e) => {
                    print_error(&format!("Failed to stop daemon: {}", e));
                    return Err(e);
                }
            }
        }

        ClientCommand::Ping => match client.ping().await {
            Ok(true) => print_success(&format!("Daemon is running at {}", client.address())),
            Ok(false) => anyhow::bail!("Daemon at {} did not answer ping", client.address()),
            Err(e) => {
                print_error(&format!("{:#}", e));
                return Err(e);
            }
        },

        ClientCommand::List { long } => commands::list_command(&mut client, long).await?,

        ClientCommand::Start { name } => commands::start_command(&mut client, &name).await?,

        ClientCommand::VncPort { name } => commands::vnc_port_command(&mut client, &name).await?,

        ClientCommand::Connect { name, host, start } => {
            commands::connect_command(&mut client, &name, &host, start).await?
        }

        ClientCommand::Bridges => commands::bridges_command(&mut client).await?,

        ClientCommand::Status => commands::status_command(&mut client).await?,
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<DaemonConfig> {
    config::load_daemon_config(path).context("Failed to load configuration")
}

/// Run the daemon until Ctrl+C, SIGTERM, or `vstation stop`
async fn serve(config: DaemonConfig) -> Result<()> {
    print_info(&format!("Starting VStation daemon on {}", config.ipc_address()));
    if config.gateway.enabled {
        print_info(&format!(
            "Browser gateway on {}",
            config.gateway.bind_address
        ));
    }

    let shutdown = CancellationToken::new();
    vs_daemon::daemon::spawn_signal_handler(shutdown.clone());

    vs_daemon::run(config, shutdown).await?;
    print_success("Daemon stopped");
    Ok(())
}
