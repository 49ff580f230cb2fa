//! Daemon entry point
//!
//! Wires the service to its front ends and runs until cancelled.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use vs_core::config::DaemonConfig;

use crate::gateway;
use crate::ipc::IpcServer;
use crate::state::DaemonState;

/// Run the daemon until `shutdown` is cancelled
///
/// The IPC server always runs; the browser gateway runs when enabled.
/// Either front end failing cancels the other.
pub async fn run(config: DaemonConfig, shutdown: CancellationToken) -> Result<()> {
    tracing::info!(
        hypervisor = %config.hypervisor_uri,
        proxy = %config.proxy.program,
        base_port = config.proxy.base_port,
        listing = %config.machine_listing,
        "Starting VStation daemon"
    );

    let state = Arc::new(DaemonState::from_config(config));
    run_with_state(state, shutdown).await
}

/// Run the daemon's front ends over prepared state
pub async fn run_with_state(state: Arc<DaemonState>, shutdown: CancellationToken) -> Result<()> {
    let ipc_server = IpcServer::new(state.config.ipc_address(), Arc::clone(&state))
        .with_shutdown_token(shutdown.clone());

    let gateway_task = if state.config.gateway.enabled {
        let bind_address = state.config.gateway.bind_address.clone();
        let service = Arc::clone(&state.service);
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            let result = gateway::serve(&bind_address, service, shutdown.clone()).await;
            if let Err(e) = &result {
                tracing::error!("Gateway failed: {:#}", e);
                shutdown.cancel();
            }
            result
        }))
    } else {
        tracing::info!("Browser gateway disabled");
        None
    };

    let ipc_result = ipc_server.run().await;
    if ipc_result.is_err() {
        shutdown.cancel();
    }

    if let Some(task) = gateway_task {
        match task.await {
            Ok(result) => result?,
            Err(e) => tracing::error!("Gateway task panicked: {}", e),
        }
    }

    ipc_result?;
    tracing::info!("VStation daemon stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Received shutdown signal");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
