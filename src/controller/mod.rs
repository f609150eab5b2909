//! Reconciliation loop: watch notifications in, diagnostic dispatches out.

use crate::classify::{classify, EventPolicy};
use crate::dispatch::Dispatcher;
use crate::gate::DedupGate;
use crate::watch::{PodSnapshot, PodWatcher};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Drives the classify -> gate -> dispatch pipeline over a pod watch stream.
///
/// Notifications may be duplicated or out of order; each one is classified
/// from its own snapshot, so stale or repeated deliveries at worst hit the
/// gate's cooldown. Dispatch is fire-and-forget: the loop never waits on it
/// and never retries a failure (the next cooldown-expired recurrence of the
/// underlying problem retries naturally).
pub struct Controller<D> {
    policy: EventPolicy,
    gate: Arc<DedupGate>,
    dispatcher: Arc<D>,
}

impl<D: Dispatcher + 'static> Controller<D> {
    pub fn new(policy: EventPolicy, gate: Arc<DedupGate>, dispatcher: Arc<D>) -> Self {
        Self {
            policy,
            gate,
            dispatcher,
        }
    }

    /// Run until the cancellation token fires. Blocks on the watcher's
    /// initial synchronization first; a sync failure is fatal.
    pub async fn run<W: PodWatcher>(
        &self,
        watcher: &mut W,
        cancel: CancellationToken,
    ) -> Result<()> {
        watcher
            .wait_for_sync()
            .await
            .context("pod watch synchronization failed")?;
        info!("controller ready, watching for pod incidents");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("controller shutting down");
                    return Ok(());
                }
                update = watcher.next() => match update {
                    Some(pod) => self.handle_update(&pod),
                    None => bail!("pod watch stream closed unexpectedly"),
                }
            }
        }
    }

    /// Process one pod notification. Safe to call concurrently; the gate
    /// serializes per-key decisions internally.
    pub fn handle_update(&self, pod: &PodSnapshot) {
        let Some(incident) = classify(pod, &self.policy) else {
            return;
        };

        info!(
            incident_type = %incident.incident_type,
            pod = %incident.pod_name,
            namespace = %incident.namespace,
            reason = %incident.reason,
            "incident detected"
        );

        if !self.gate.should_trigger(&incident) {
            return;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&incident).await {
                error!(
                    error = %e,
                    pod = %incident.pod_name,
                    namespace = %incident.namespace,
                    "failed to dispatch diagnostic job"
                );
            }
        });
    }
}
