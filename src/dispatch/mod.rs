//! Dispatch of diagnostic analyzer Jobs for triggered incidents.

pub mod job;

pub use self::job::JobDispatcher;

use crate::classify::Incident;
use anyhow::Result;

/// External side-effecting action taken for an incident that passed the
/// gate. One attempt per trigger; failures are the caller's to log, never
/// retried here.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, incident: &Incident) -> Result<()>;
}
