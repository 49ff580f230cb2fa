//! Test doubles for the daemon's collaborators
//!
//! [`MockHypervisor`] is an in-memory domain table and [`ScriptedLauncher`]
//! plays back a fixed proxy startup, so the service can be exercised
//! without libvirt or websockify installed.
//!
//! ```ignore
//! let hypervisor = MockHypervisor::new()
//!     .with_domain("db01", DomainState::Running, vnc_domain_xml("db01", 5901));
//! let launcher = ScriptedLauncher::new(ProxyBehavior::Ready);
//! ```

use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use vs_core::traits::Hypervisor;
use vs_core::{DomainState, HypervisorError};

use crate::bridge::{LaunchedProxy, ProxyHandle, ProxyLauncher};

/// Domain XML with a fixed-port VNC graphics device
pub fn vnc_domain_xml(name: &str, port: u16) -> String {
    format!(
        "<domain type='kvm'><name>{name}</name><devices>\
         <graphics type='vnc' port='{port}' autoport='no' listen='127.0.0.1'/>\
         </devices></domain>"
    )
}

/// Domain XML without any graphics device
pub fn plain_domain_xml(name: &str) -> String {
    format!("<domain type='kvm'><name>{name}</name><devices><disk type='file'/></devices></domain>")
}

struct MockDomain {
    name: String,
    id: Option<u32>,
    state: DomainState,
    xml: String,
}

#[derive(Default)]
struct MockState {
    domains: Vec<MockDomain>,
    next_id: u32,
    start_calls: Vec<String>,
    start_failure: Option<String>,
    enumeration_failure: Option<String>,
}

impl MockState {
    fn domain(&self, name: &str) -> Result<&MockDomain, HypervisorError> {
        self.domains
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| HypervisorError::DomainNotFound(name.to_string()))
    }
}

/// In-memory hypervisor
///
/// Every domain is reported as defined, so active domains show up in both
/// enumerations the way a backend listing persistent domains would.
pub struct MockHypervisor {
    state: Mutex<MockState>,
}

impl MockHypervisor {
    /// Create an empty hypervisor
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_id: 1,
                ..MockState::default()
            }),
        }
    }

    /// Add a domain
    pub fn with_domain(self, name: &str, state: DomainState, xml: String) -> Self {
        self.add_domain(name, state, xml);
        self
    }

    /// Add a domain to a shared hypervisor
    pub fn add_domain(&self, name: &str, state: DomainState, xml: String) {
        let mut inner = self.state.lock().unwrap();
        let id = if state == DomainState::ShutOff {
            None
        } else {
            inner.next_id += 1;
            Some(inner.next_id - 1)
        };
        inner.domains.push(MockDomain {
            name: name.to_string(),
            id,
            state,
            xml,
        });
    }

    /// Make `start_domain` fail with the given message
    pub fn fail_starts(&self, message: &str) {
        self.state.lock().unwrap().start_failure = Some(message.to_string());
    }

    /// Make domain enumeration fail with the given message
    pub fn fail_enumeration(&self, message: &str) {
        self.state.lock().unwrap().enumeration_failure = Some(message.to_string());
    }

    /// Names passed to `start_domain`, in call order
    pub fn start_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().start_calls.clone()
    }

    /// Current state of a domain
    pub fn state_of(&self, name: &str) -> Option<DomainState> {
        let inner = self.state.lock().unwrap();
        inner.domain(name).ok().map(|d| d.state)
    }
}

impl Default for MockHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    async fn list_defined_domains(&self) -> Result<Vec<String>, HypervisorError> {
        let inner = self.state.lock().unwrap();
        if let Some(message) = &inner.enumeration_failure {
            return Err(HypervisorError::Command {
                operation: "list defined domains".to_string(),
                message: message.clone(),
            });
        }
        Ok(inner.domains.iter().map(|d| d.name.clone()).collect())
    }

    async fn list_running_domains(&self) -> Result<Vec<u32>, HypervisorError> {
        let inner = self.state.lock().unwrap();
        Ok(inner.domains.iter().filter_map(|d| d.id).collect())
    }

    async fn domain_name(&self, id: u32) -> Result<String, HypervisorError> {
        let inner = self.state.lock().unwrap();
        inner
            .domains
            .iter()
            .find(|d| d.id == Some(id))
            .map(|d| d.name.clone())
            .ok_or_else(|| HypervisorError::DomainNotFound(id.to_string()))
    }

    async fn domain_state(&self, name: &str) -> Result<DomainState, HypervisorError> {
        let inner = self.state.lock().unwrap();
        inner.domain(name).map(|d| d.state)
    }

    async fn start_domain(&self, name: &str) -> Result<(), HypervisorError> {
        let mut inner = self.state.lock().unwrap();
        inner.start_calls.push(name.to_string());
        if let Some(message) = inner.start_failure.clone() {
            return Err(HypervisorError::Command {
                operation: format!("start {}", name),
                message,
            });
        }

        let id = inner.next_id;
        let domain = inner
            .domains
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| HypervisorError::DomainNotFound(name.to_string()))?;
        domain.state = DomainState::Running;
        domain.id = Some(id);
        inner.next_id += 1;
        Ok(())
    }

    async fn domain_xml(&self, name: &str) -> Result<String, HypervisorError> {
        let inner = self.state.lock().unwrap();
        inner.domain(name).map(|d| d.xml.clone())
    }

    fn uri(&self) -> &str {
        "test:///default"
    }
}

/// How a scripted proxy behaves after launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyBehavior {
    /// Prints the readiness marker
    Ready,
    /// Stays up but never prints anything
    Silent,
    /// Prints an error and exits
    Exit,
    /// Fails to start at all
    SpawnFailure,
}

/// Proxy launcher that plays back a fixed startup
pub struct ScriptedLauncher {
    behavior: Mutex<ProxyBehavior>,
    delay: Duration,
    launches: Mutex<Vec<(u16, String)>>,
    terminated: Arc<AtomicUsize>,
    next_pid: AtomicU32,
}

impl ScriptedLauncher {
    /// Create a launcher with the given behavior
    pub fn new(behavior: ProxyBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Duration::ZERO,
            launches: Mutex::new(Vec::new()),
            terminated: Arc::new(AtomicUsize::new(0)),
            next_pid: AtomicU32::new(4000),
        }
    }

    /// Wait this long inside every launch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Change behavior for later launches
    pub fn set_behavior(&self, behavior: ProxyBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Number of launch attempts
    pub fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// `(local_port, target)` of every launch attempt
    pub fn targets(&self) -> Vec<(u16, String)> {
        self.launches.lock().unwrap().clone()
    }

    /// Number of proxies terminated by the supervisor
    pub fn terminated_count(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyLauncher for ScriptedLauncher {
    async fn launch(&self, local_port: u16, target: &str) -> io::Result<LaunchedProxy> {
        self.launches
            .lock()
            .unwrap()
            .push((local_port, target.to_string()));
        let behavior = *self.behavior.lock().unwrap();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (tx, rx) = mpsc::channel(8);
        let keep_open = match behavior {
            ProxyBehavior::SpawnFailure => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "No such file or directory",
                ))
            }
            ProxyBehavior::Ready => {
                let _ = tx.try_send("WebSocket server settings:".to_string());
                let _ = tx.try_send(format!("  - proxying from :{} to {}", local_port, target));
                None
            }
            ProxyBehavior::Silent => Some(tx),
            ProxyBehavior::Exit => {
                let _ = tx.try_send("socket.error: [Errno 98] Address already in use".to_string());
                None
            }
        };

        Ok(LaunchedProxy {
            handle: Box::new(ScriptedHandle {
                pid: Some(self.next_pid.fetch_add(1, Ordering::SeqCst)),
                diagnostics: keep_open,
                terminated: Arc::clone(&self.terminated),
            }),
            diagnostics: rx,
        })
    }

    fn program(&self) -> &str {
        "scripted-proxy"
    }
}

struct ScriptedHandle {
    pid: Option<u32>,
    diagnostics: Option<mpsc::Sender<String>>,
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl ProxyHandle for ScriptedHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn terminate(&mut self) {
        self.pid = None;
        self.diagnostics = None;
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}
