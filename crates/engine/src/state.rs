use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::warn;

use crate::fusion::Connectivity;
use crate::resolver::EngineLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Stopped,
    Starting,
    Running,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineLifecycle {
    NotInstalled,
    Installing,
    Installed,
    InstallError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorState {
    pub lifecycle: Lifecycle,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub connectivity: Connectivity,
    pub health_detail: String,
    pub engine_lifecycle: EngineLifecycle,
    pub engine: Option<EngineLocation>,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Stopped,
            pid: None,
            started_at: None,
            last_error: None,
            connectivity: Connectivity::unknown("not started"),
            health_detail: String::new(),
            engine_lifecycle: EngineLifecycle::NotInstalled,
            engine: None,
        }
    }
}

/// Single owner of `SupervisorState`. Every mutation goes through `update`,
/// which publishes a full snapshot while still holding the lock so
/// subscribers see changes in order.
pub struct StateStore {
    state: Mutex<SupervisorState>,
    tx: broadcast::Sender<SupervisorState>,
}

impl StateStore {
    pub fn new(initial: SupervisorState) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(initial),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SupervisorState {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorState> {
        self.tx.subscribe()
    }

    /// Applies `f` and notifies subscribers when anything changed. Returns the
    /// new snapshot.
    pub fn update<F>(&self, f: F) -> SupervisorState
    where
        F: FnOnce(&mut SupervisorState),
    {
        let mut guard = self.lock();
        let before = guard.clone();
        f(&mut guard);

        if guard.lifecycle == Lifecycle::Running && guard.pid.is_none() {
            warn!("Running without a pid; recording as error");
            guard.lifecycle = Lifecycle::Error;
            guard.last_error = Some("engine reported running without a process id".to_string());
        }
        if matches!(guard.lifecycle, Lifecycle::Stopped | Lifecycle::Error) {
            guard.pid = None;
            guard.started_at = None;
        }

        let snapshot = guard.clone();
        if snapshot != before {
            // No receivers is fine; lagging receivers skip ahead on their own.
            let _ = self.tx.send(snapshot.clone());
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_requires_pid() {
        let store = StateStore::new(SupervisorState::default());
        let s = store.update(|s| s.lifecycle = Lifecycle::Running);
        assert_eq!(s.lifecycle, Lifecycle::Error);
        assert!(s.last_error.is_some());

        let s = store.update(|s| {
            s.lifecycle = Lifecycle::Running;
            s.pid = Some(42);
        });
        assert_eq!(s.lifecycle, Lifecycle::Running);
        assert_eq!(s.pid, Some(42));
    }

    #[test]
    fn test_stop_clears_pid() {
        let store = StateStore::new(SupervisorState::default());
        store.update(|s| {
            s.lifecycle = Lifecycle::Running;
            s.pid = Some(7);
            s.started_at = Some(Utc::now());
        });
        let s = store.update(|s| s.lifecycle = Lifecycle::Stopped);
        assert_eq!(s.pid, None);
        assert_eq!(s.started_at, None);
    }

    #[tokio::test]
    async fn test_subscribers_get_snapshots_only_on_change() {
        let store = StateStore::new(SupervisorState::default());
        let mut rx1 = store.subscribe();
        let mut rx2 = store.subscribe();
        drop(store.subscribe());

        store.update(|s| s.health_detail = "probe ok".to_string());
        store.update(|s| s.health_detail = "probe ok".to_string());
        store.update(|s| s.lifecycle = Lifecycle::Starting);

        assert_eq!(rx1.recv().await.unwrap().health_detail, "probe ok");
        assert_eq!(rx1.recv().await.unwrap().lifecycle, Lifecycle::Starting);
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.recv().await.unwrap().health_detail, "probe ok");
    }
}
