//! Proxy process supervision
//!
//! Starts the WebSocket proxy for a bridge and watches its diagnostic
//! output for the readiness marker. The launcher and the line source are
//! both injectable so supervision can be exercised without a real proxy.

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;

use vs_core::config::ProxyConfig;
use vs_core::ServiceError;

use super::registry::BridgeEntry;

/// Buffered diagnostic lines per proxy before the reader waits
const DIAGNOSTIC_BUFFER: usize = 64;

/// Ownership of a running proxy process
#[async_trait]
pub trait ProxyHandle: Send {
    /// OS process ID, if the process is still running
    fn pid(&self) -> Option<u32>;

    /// Kill the process and reap it
    async fn terminate(&mut self);
}

/// A freshly started proxy and its diagnostic line stream
pub struct LaunchedProxy {
    pub handle: Box<dyn ProxyHandle>,
    pub diagnostics: mpsc::Receiver<String>,
}

/// Starts proxy processes
#[async_trait]
pub trait ProxyLauncher: Send + Sync {
    /// Start a proxy listening on `local_port` and forwarding to `target`
    async fn launch(&self, local_port: u16, target: &str) -> io::Result<LaunchedProxy>;

    /// Executable name, for error messages
    fn program(&self) -> &str;
}

/// Launches the proxy as `<program> <args..> <local_port> <target>`
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Create a launcher for the given executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Pass these arguments ahead of the port pair
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Build a launcher from proxy settings
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.program.clone()).with_args(config.args.iter().cloned())
    }
}

#[async_trait]
impl ProxyLauncher for CommandLauncher {
    async fn launch(&self, local_port: u16, target: &str) -> io::Result<LaunchedProxy> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(local_port.to_string())
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "proxy stderr not captured"))?;

        let (tx, rx) = mpsc::channel(DIAGNOSTIC_BUFFER);
        tokio::spawn(forward_diagnostics(stderr, tx, child.id()));

        Ok(LaunchedProxy {
            handle: Box::new(ChildHandle { child }),
            diagnostics: rx,
        })
    }

    fn program(&self) -> &str {
        &self.program
    }
}

/// Pump proxy stderr into the readiness channel, then keep draining it
///
/// Once the supervisor drops its receiver the lines are only logged, so a
/// chatty proxy can never block on a full pipe.
async fn forward_diagnostics(stderr: ChildStderr, tx: mpsc::Sender<String>, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    let mut forwarding = true;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(?pid, "proxy: {}", line);
                if forwarding && tx.send(line).await.is_err() {
                    forwarding = false;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(?pid, "Failed to read proxy output: {}", e);
                break;
            }
        }
    }

    tracing::debug!(?pid, "Proxy output closed");
}

struct ChildHandle {
    child: Child,
}

#[async_trait]
impl ProxyHandle for ChildHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(pid = ?self.child.id(), "Failed to kill proxy: {}", e);
        }
    }
}

/// Outcome of watching a proxy's diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A line containing the marker arrived
    Ready,
    /// The stream ended without the marker
    Exited,
    /// The window elapsed first
    TimedOut,
}

/// Wait up to `timeout` for a line containing `marker`
///
/// Consumes the receiver; once this returns nobody reads the stream again.
pub async fn wait_for_readiness(
    mut lines: mpsc::Receiver<String>,
    marker: &str,
    timeout: Duration,
) -> Readiness {
    let watch = async {
        while let Some(line) = lines.recv().await {
            if line.contains(marker) {
                return Readiness::Ready;
            }
        }
        Readiness::Exited
    };

    tokio::time::timeout(timeout, watch)
        .await
        .unwrap_or(Readiness::TimedOut)
}

/// Starts proxies and decides whether they came up
pub struct ProxySupervisor {
    launcher: Arc<dyn ProxyLauncher>,
    target_host: String,
    readiness_marker: String,
    readiness_timeout: Duration,
}

impl ProxySupervisor {
    /// Create a supervisor using the given launcher and proxy settings
    pub fn new(launcher: Arc<dyn ProxyLauncher>, config: &ProxyConfig) -> Self {
        Self {
            launcher,
            target_host: config.target_host.clone(),
            readiness_marker: config.readiness_marker.clone(),
            readiness_timeout: config.readiness_timeout,
        }
    }

    /// Launch a proxy for `name` and wait for it to become ready
    ///
    /// A proxy that exits early or misses the readiness window is killed
    /// before the error is returned.
    pub async fn start(
        &self,
        name: &str,
        local_port: u16,
        vnc_port: u16,
    ) -> Result<BridgeEntry, ServiceError> {
        let target = format!("{}:{}", self.target_host, vnc_port);
        tracing::info!(machine = %name, local_port, %target, "Launching proxy");

        let LaunchedProxy {
            mut handle,
            diagnostics,
        } = self
            .launcher
            .launch(local_port, &target)
            .await
            .map_err(|e| {
                ServiceError::BridgeLaunch(format!("{}: {}", self.launcher.program(), e))
            })?;

        match wait_for_readiness(diagnostics, &self.readiness_marker, self.readiness_timeout).await
        {
            Readiness::Ready => {
                tracing::info!(machine = %name, local_port, pid = ?handle.pid(), "Proxy ready");
                Ok(BridgeEntry::new(local_port, target, handle))
            }
            Readiness::Exited => {
                tracing::warn!(machine = %name, local_port, "Proxy exited before becoming ready");
                handle.terminate().await;
                Err(ServiceError::BridgeLaunch(format!(
                    "proxy for {} exited before becoming ready",
                    name
                )))
            }
            Readiness::TimedOut => {
                tracing::warn!(
                    machine = %name,
                    local_port,
                    timeout = ?self.readiness_timeout,
                    "Proxy readiness timed out, terminating"
                );
                handle.terminate().await;
                Err(ServiceError::BridgeTimeout {
                    name: name.to_string(),
                    timeout: self.readiness_timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(16);
        for item in items {
            tx.try_send(item.to_string()).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_marker_line_means_ready() {
        let rx = lines(&[
            "WebSocket server settings:",
            "  - Listen on :11624",
            "  - proxying from :11624 to localhost:5901",
        ]);
        let readiness = wait_for_readiness(rx, "proxying", Duration::from_secs(5)).await;
        assert_eq!(readiness, Readiness::Ready);
    }

    #[tokio::test]
    async fn test_closed_stream_without_marker_means_exited() {
        let rx = lines(&["Traceback (most recent call last):"]);
        let readiness = wait_for_readiness(rx, "proxying", Duration::from_secs(5)).await;
        assert_eq!(readiness, Readiness::Exited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_times_out() {
        let (tx, rx) = mpsc::channel::<String>(1);
        let readiness = wait_for_readiness(rx, "proxying", Duration::from_secs(5)).await;
        assert_eq!(readiness, Readiness::TimedOut);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_after_window_is_too_late() {
        let (tx, rx) = mpsc::channel::<String>(1);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(6)).await;
            let _ = tx.send("proxying from :11624".to_string()).await;
        });
        let readiness = wait_for_readiness(rx, "proxying", Duration::from_secs(5)).await;
        assert_eq!(readiness, Readiness::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let supervisor = ProxySupervisor::new(
            Arc::new(CommandLauncher::new("/nonexistent/websockify")),
            &ProxyConfig::default(),
        );
        match supervisor.start("db01", 11624, 5901).await {
            Err(ServiceError::BridgeLaunch(message)) => {
                assert!(message.contains("/nonexistent/websockify"))
            }
            Err(other) => panic!("Expected launch error, got {:?}", other),
            Ok(_) => panic!("Expected launch error, got a bridge"),
        }
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::path::Path;

        /// Supervisor running `sh <script> <local_port> <target>`
        fn shell_supervisor(script: &Path, timeout: Duration) -> ProxySupervisor {
            let launcher = CommandLauncher::new("sh").with_args([script.display().to_string()]);
            let config = ProxyConfig {
                readiness_timeout: timeout,
                ..ProxyConfig::default()
            };
            ProxySupervisor::new(Arc::new(launcher), &config)
        }

        fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
            let path = dir.join("proxy.sh");
            std::fs::write(&path, format!("echo $$ > \"$0.pid\"\n{}", body)).unwrap();
            path
        }

        fn recorded_pid(script: &Path) -> String {
            let pidfile = format!("{}.pid", script.display());
            std::fs::read_to_string(pidfile).unwrap().trim().to_string()
        }

        fn is_alive(pid: &str) -> bool {
            std::process::Command::new("kill")
                .args(["-0", pid])
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false)
        }

        #[tokio::test]
        async fn test_real_proxy_reports_ready() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(
                dir.path(),
                "echo 'WebSocket server settings:' >&2\n\
                 echo \"  - proxying from :$1 to $2\" >&2\n\
                 exec sleep 30\n",
            );

            let entry = shell_supervisor(&script, Duration::from_secs(5))
                .start("db01", 11624, 5901)
                .await
                .unwrap();

            assert_eq!(entry.local_port, 11624);
            assert_eq!(entry.target, "localhost:5901");
            let pid = entry.pid().expect("running proxy has a pid");
            assert_eq!(pid.to_string(), recorded_pid(&script));
        }

        #[tokio::test]
        async fn test_silent_real_proxy_is_killed_on_timeout() {
            let dir = tempfile::tempdir().unwrap();
            let script = write_script(dir.path(), "exec sleep 30\n");

            let started = std::time::Instant::now();
            let result = shell_supervisor(&script, Duration::from_secs(1))
                .start("db01", 11624, 5901)
                .await;

            assert!(matches!(result, Err(ServiceError::BridgeTimeout { .. })));
            assert!(started.elapsed() < Duration::from_secs(5));
            assert!(!is_alive(&recorded_pid(&script)));
        }
    }
}
