//! Bridge registry
//!
//! One slot per machine name, each behind its own async mutex. Establishing
//! a bridge holds the slot lock for the whole allocate/launch/wait sequence,
//! so a second caller for the same machine waits and then sees the result,
//! while different machines proceed in parallel.
//!
//! Every finished attempt bumps the slot's generation. A caller that queued
//! behind an attempt takes that attempt's outcome, failure included; only
//! callers arriving after a failure launch again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use vs_core::{BridgeInfo, ServiceError};

use super::allocator::PortAllocator;
use super::supervisor::{ProxyHandle, ProxySupervisor};

/// A ready bridge and the proxy process behind it
///
/// Entries only exist once the proxy has reported readiness.
pub struct BridgeEntry {
    /// Port the proxy listens on
    pub local_port: u16,
    /// `host:port` the proxy forwards to
    pub target: String,
    proxy: Box<dyn ProxyHandle>,
}

impl BridgeEntry {
    pub(crate) fn new(local_port: u16, target: String, proxy: Box<dyn ProxyHandle>) -> Self {
        Self {
            local_port,
            target,
            proxy,
        }
    }

    /// Process ID of the proxy
    pub fn pid(&self) -> Option<u32> {
        self.proxy.pid()
    }
}

#[derive(Default)]
struct SlotState {
    entry: Option<BridgeEntry>,
    last_failure: Option<ServiceError>,
}

#[derive(Default)]
struct Slot {
    /// Finished attempts; only written while `state` is locked
    generation: AtomicU64,
    state: Mutex<SlotState>,
}

/// Memoized machine-to-bridge mapping
pub struct BridgeRegistry {
    slots: DashMap<String, Arc<Slot>>,
    installed: DashMap<String, BridgeInfo>,
    allocator: PortAllocator,
    supervisor: ProxySupervisor,
}

impl BridgeRegistry {
    /// Create a registry that allocates from `allocator` and launches via `supervisor`
    pub fn new(allocator: PortAllocator, supervisor: ProxySupervisor) -> Self {
        Self {
            slots: DashMap::new(),
            installed: DashMap::new(),
            allocator,
            supervisor,
        }
    }

    /// Return the bridge port for `name`, establishing the bridge if needed
    ///
    /// Failed attempts leave nothing behind, so the next call starts over.
    pub async fn ensure(&self, name: &str, vnc_port: u16) -> Result<u16, ServiceError> {
        let slot = self.slot(name);
        let seen = slot.generation.load(Ordering::SeqCst);
        let mut state = slot.state.lock().await;

        if let Some(existing) = state.entry.as_ref() {
            tracing::debug!(machine = %name, local_port = existing.local_port, "Reusing bridge");
            return Ok(existing.local_port);
        }

        if slot.generation.load(Ordering::SeqCst) != seen {
            if let Some(err) = state.last_failure.clone() {
                tracing::debug!(machine = %name, "Sharing failure of concurrent attempt");
                return Err(err);
            }
        }

        let outcome = self.establish(name, vnc_port).await;
        let result = match outcome {
            Ok(entry) => {
                let local_port = entry.local_port;
                self.installed.insert(
                    name.to_string(),
                    BridgeInfo {
                        name: name.to_string(),
                        local_port,
                        target: entry.target.clone(),
                        pid: entry.pid(),
                    },
                );
                state.entry = Some(entry);
                state.last_failure = None;
                Ok(local_port)
            }
            Err(err) => {
                state.last_failure = Some(err.clone());
                Err(err)
            }
        };

        slot.generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn establish(&self, name: &str, vnc_port: u16) -> Result<BridgeEntry, ServiceError> {
        let local_port = self.allocator.next_port().ok_or_else(|| {
            ServiceError::BridgeLaunch("local port range exhausted".to_string())
        })?;

        self.supervisor.start(name, local_port, vnc_port).await
    }

    /// Port of an installed bridge, without establishing one
    pub fn get(&self, name: &str) -> Option<u16> {
        self.installed.get(name).map(|info| info.local_port)
    }

    /// All installed bridges, ordered by local port
    pub fn list(&self) -> Vec<BridgeInfo> {
        let mut bridges: Vec<BridgeInfo> =
            self.installed.iter().map(|r| r.value().clone()).collect();
        bridges.sort_by_key(|b| b.local_port);
        bridges
    }

    /// Number of installed bridges
    pub fn len(&self) -> usize {
        self.installed.len()
    }

    /// Check if no bridge is installed
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }

    fn slot(&self, name: &str) -> Arc<Slot> {
        let slot = self.slots.entry(name.to_string()).or_default();
        Arc::clone(&slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ProxyBehavior, ScriptedLauncher};
    use std::time::Duration;
    use vs_core::config::ProxyConfig;

    fn registry(launcher: Arc<ScriptedLauncher>) -> BridgeRegistry {
        let config = ProxyConfig::default();
        BridgeRegistry::new(
            PortAllocator::new(config.base_port),
            ProxySupervisor::new(launcher, &config),
        )
    }

    #[tokio::test]
    async fn test_second_request_reuses_bridge() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Ready));
        let registry = registry(Arc::clone(&launcher));

        assert_eq!(registry.ensure("db01", 5901).await.unwrap(), 11624);
        assert_eq!(registry.ensure("db01", 5901).await.unwrap(), 11624);

        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.targets(), vec![(11624, "localhost:5901".to_string())]);
        assert_eq!(registry.get("db01"), Some(11624));
    }

    #[tokio::test]
    async fn test_distinct_machines_get_distinct_ports() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Ready));
        let registry = registry(Arc::clone(&launcher));

        let first = registry.ensure("db01", 5901).await.unwrap();
        let second = registry.ensure("web01", 5902).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(launcher.launch_count(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_launch() {
        let launcher = Arc::new(
            ScriptedLauncher::new(ProxyBehavior::Ready).with_delay(Duration::from_millis(50)),
        );
        let registry = Arc::new(registry(Arc::clone(&launcher)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.ensure("db01", 5901).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 11624);
        }
        assert_eq!(launcher.launch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_installs_nothing_and_retries() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Silent));
        let registry = registry(Arc::clone(&launcher));

        let err = registry.ensure("db01", 5901).await.unwrap_err();
        assert!(matches!(err, ServiceError::BridgeTimeout { .. }));
        assert_eq!(launcher.terminated_count(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.get("db01"), None);

        launcher.set_behavior(ProxyBehavior::Ready);
        let port = registry.ensure("db01", 5901).await.unwrap();
        assert_eq!(port, 11625);
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_early_exit_is_launch_error() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Exit));
        let registry = registry(Arc::clone(&launcher));

        let err = registry.ensure("db01", 5901).await.unwrap_err();
        assert!(matches!(err, ServiceError::BridgeLaunch(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_launch_error() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::SpawnFailure));
        let registry = registry(Arc::clone(&launcher));

        let err = registry.ensure("db01", 5901).await.unwrap_err();
        assert!(matches!(err, ServiceError::BridgeLaunch(_)));
        assert_eq!(launcher.terminated_count(), 0);
    }

    #[tokio::test]
    async fn test_list_reports_target_and_pid() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Ready));
        let registry = registry(Arc::clone(&launcher));
        registry.ensure("db01", 5901).await.unwrap();

        let bridges = registry.list();
        assert_eq!(bridges.len(), 1);
        assert_eq!(bridges[0].name, "db01");
        assert_eq!(bridges[0].local_port, 11624);
        assert_eq!(bridges[0].target, "localhost:5901");
        assert!(bridges[0].pid.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_callers_share_failed_attempt() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Silent));
        let registry = Arc::new(registry(Arc::clone(&launcher)));
        let window = ProxyConfig::default().readiness_timeout;
        let started = tokio::time::Instant::now();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.ensure("db01", 5901).await })
            })
            .collect();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(matches!(err, ServiceError::BridgeTimeout { .. }));
        }
        assert!(started.elapsed() <= window + Duration::from_millis(10));
        assert_eq!(launcher.launch_count(), 1);
        assert_eq!(launcher.terminated_count(), 1);

        // A later call starts over
        launcher.set_behavior(ProxyBehavior::Ready);
        assert_eq!(registry.ensure("db01", 5901).await.unwrap(), 11625);
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_installed_bridge_visible_while_slot_locked() {
        let launcher = Arc::new(ScriptedLauncher::new(ProxyBehavior::Ready));
        let registry = registry(Arc::clone(&launcher));
        registry.ensure("db01", 5901).await.unwrap();

        let slot = registry.slot("db01");
        let _held = slot.state.lock().await;

        assert_eq!(registry.get("db01"), Some(11624));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].target, "localhost:5901");
    }
}
