//! podtriage -- Kubernetes pod failure triage with LLM-assisted diagnostics.
//!
//! Watches workload pods for recurring failure signatures (crash loops,
//! image pull failures, OOM kills), deduplicates them per incident with a
//! cooldown and escalation window, and dispatches a bounded diagnostic Job
//! for each distinct incident.

pub mod analyze;
pub mod classify;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod gate;
pub mod llm;
pub mod notify;
pub mod watch;

use crate::config::{Config, Secrets};
use crate::controller::Controller;
use crate::dispatch::JobDispatcher;
use crate::gate::DedupGate;
use crate::watch::KubectlWatcher;
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the controller: pod watch, incident gate with its sweeper, and
/// diagnostic dispatch, until SIGINT/SIGTERM.
pub async fn run_controller(config: Config, secrets: Secrets) -> Result<()> {
    tracing::info!(namespace = %config.watch.namespace, "starting podtriage controller");

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let tracker = &config.tracker;
    let gate = Arc::new(DedupGate::new(
        tracker.cooldown(),
        tracker.escalation_enabled,
        tracker.escalation_threshold,
        tracker.silence_duration(),
    ));
    tokio::spawn(Arc::clone(&gate).run_sweeper(cancel.child_token()));

    let dispatcher = Arc::new(JobDispatcher::new(&config, secrets));
    let controller = Controller::new(config.events.clone(), gate, dispatcher);

    let mut watcher = KubectlWatcher::new(config.watch.namespace.clone());
    controller.run(&mut watcher, cancel).await
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        tracing::info!("shutdown signal received");
        cancel.cancel();
    });
}
