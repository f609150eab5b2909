//! Pod watch subsystem -- snapshot types and the watch stream the
//! reconciliation loop consumes.

pub mod kubectl;

pub use self::kubectl::KubectlWatcher;

use anyhow::Result;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to run kubectl: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("kubectl get pods failed: {0}")]
    List(String),
    #[error("invalid pod JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of pod-state notifications.
///
/// `wait_for_sync` must complete before `next` is polled; a sync failure is
/// fatal to the caller. Delivery is at-least-once and unordered -- consumers
/// must recompute from each snapshot rather than diff against history.
#[async_trait::async_trait]
pub trait PodWatcher: Send {
    /// Block until the initial state synchronization completes.
    async fn wait_for_sync(&mut self) -> Result<()>;

    /// Receive the next pod snapshot, or `None` when the stream has closed.
    async fn next(&mut self) -> Option<PodSnapshot>;
}

/// Read-only view of one pod's reported state, matching the Kubernetes
/// pod JSON shape. Only the fields the classifier consumes are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct PodSnapshot {
    pub metadata: PodMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub phase: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: ContainerState,
}

/// Current state of a container: at most one of the three is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerState {
    pub waiting: Option<WaitingState>,
    pub running: Option<RunningState>,
    pub terminated: Option<TerminatedState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitingState {
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningState {
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatedState {
    #[serde(default)]
    pub exit_code: i32,
    pub reason: Option<String>,
    pub message: Option<String>,
}
