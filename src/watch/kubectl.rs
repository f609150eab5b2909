use super::{PodSnapshot, PodWatcher, WatchError};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodSnapshot>,
}

/// Pod watcher backed by the `kubectl` CLI.
///
/// `wait_for_sync` runs a full `kubectl get pods -o json` list, then starts a
/// long-lived `kubectl get pods --watch -o json` stream. The listed pods are
/// replayed through `next` ahead of the stream so the consumer sees current
/// state before live updates.
pub struct KubectlWatcher {
    namespace: String,
    pending: VecDeque<PodSnapshot>,
    rx: Option<mpsc::Receiver<PodSnapshot>>,
    // Held so the watch process is killed when the watcher is dropped.
    _child: Option<tokio::process::Child>,
}

impl KubectlWatcher {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pending: VecDeque::new(),
            rx: None,
            _child: None,
        }
    }

    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, WatchError> {
        let output = tokio::process::Command::new("kubectl")
            .args(["get", "pods", "-n", &self.namespace, "-o", "json"])
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WatchError::List(stderr.trim().to_string()));
        }

        let list: PodList = serde_json::from_slice(&output.stdout)?;
        Ok(list.items)
    }

    fn start_stream(&mut self) -> Result<(), WatchError> {
        let mut child = tokio::process::Command::new("kubectl")
            .args([
                "get",
                "pods",
                "-n",
                &self.namespace,
                "--watch-only",
                "--request-timeout=0",
                "-o",
                "json",
            ])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            WatchError::Spawn(std::io::Error::other("kubectl stdout not captured"))
        })?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(read_watch_stream(stdout, tx));

        self.rx = Some(rx);
        self._child = Some(child);
        Ok(())
    }
}

#[async_trait::async_trait]
impl PodWatcher for KubectlWatcher {
    async fn wait_for_sync(&mut self) -> Result<()> {
        let pods = self
            .list_pods()
            .await
            .context("initial pod list failed")?;
        debug!(namespace = %self.namespace, pods = pods.len(), "initial pod list complete");
        self.pending.extend(pods);

        self.start_stream().context("failed to start pod watch stream")?;
        Ok(())
    }

    async fn next(&mut self) -> Option<PodSnapshot> {
        if let Some(pod) = self.pending.pop_front() {
            return Some(pod);
        }
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

/// Reassemble pretty-printed JSON objects from the watch stream.
///
/// `kubectl --watch -o json` emits one multi-line object per update, so lines
/// are accumulated until the brace depth returns to zero.
async fn read_watch_stream(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<PodSnapshot>) {
    let reader = BufReader::new(stdout);
    let mut lines = reader.lines();

    let mut buffer = String::new();
    let mut depth: i32 = 0;
    let mut in_object = false;

    while let Ok(Some(line)) = lines.next_line().await {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    in_object = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }

        if in_object {
            buffer.push_str(&line);
            buffer.push('\n');
        }

        if in_object && depth == 0 {
            match serde_json::from_str::<PodSnapshot>(&buffer) {
                Ok(pod) => {
                    if tx.send(pod).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "skipping unparseable watch object"),
            }
            buffer.clear();
            in_object = false;
        }
    }

    debug!("pod watch stream closed");
}
