//! One-shot analyzer -- runs inside the Job the controller dispatches.
//!
//! Reads its incident context from the env vars the dispatcher injected,
//! fetches the failing pod's recent logs, asks the configured LLM for a
//! root-cause analysis, and posts the result to Slack when enabled.

use crate::config::LlmConfig;
use crate::llm::{LlmClient, Provider};
use crate::notify;
use anyhow::{Context, Result};
use tracing::{error, info, warn};

const LOG_TAIL_LINES: u32 = 100;

/// Incident context handed to the analyzer Job through its environment.
#[derive(Debug, Clone)]
pub struct AnalyzeContext {
    pub pod_name: String,
    pub namespace: String,
    pub event_type: String,
    pub container_name: String,
    pub reason: String,
    pub message: String,
    pub provider: Provider,
    pub api_key: String,
    pub slack_webhook: String,
    pub slack_enabled: bool,
}

impl AnalyzeContext {
    pub fn from_env() -> Result<Self> {
        let provider_name = std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "claude".into());
        let provider = provider_name
            .parse::<Provider>()
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(Self {
            pod_name: std::env::var("POD_NAME").context("POD_NAME not set")?,
            namespace: std::env::var("POD_NAMESPACE").context("POD_NAMESPACE not set")?,
            event_type: std::env::var("EVENT_TYPE").context("EVENT_TYPE not set")?,
            container_name: std::env::var("CONTAINER_NAME").unwrap_or_default(),
            reason: std::env::var("REASON").unwrap_or_default(),
            message: std::env::var("MESSAGE").unwrap_or_default(),
            provider,
            api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            slack_webhook: std::env::var("SLACK_WEBHOOK_URL").unwrap_or_default(),
            slack_enabled: std::env::var("SLACK_ENABLED")
                .map(|v| v == "true")
                .unwrap_or(false),
        })
    }
}

/// Run one analysis pass. A log-fetch failure is non-fatal (the failure
/// text itself becomes the input); LLM failure is fatal to the Job.
pub async fn run(ctx: &AnalyzeContext, llm_config: &LlmConfig) -> Result<()> {
    info!(
        event_type = %ctx.event_type,
        pod = %ctx.pod_name,
        namespace = %ctx.namespace,
        "analyzing incident"
    );

    let logs = match fetch_pod_logs(&ctx.namespace, &ctx.pod_name, &ctx.container_name).await {
        Ok(logs) if logs.trim().is_empty() => format!(
            "No logs available. Reason: {}. Message: {}",
            ctx.reason, ctx.message
        ),
        Ok(logs) => logs,
        Err(e) => {
            warn!(error = %e, "failed to fetch pod logs, analyzing without them");
            format!("Failed to fetch logs: {e}. Reason: {}. Message: {}", ctx.reason, ctx.message)
        }
    };

    let client = LlmClient::new(
        ctx.provider,
        ctx.api_key.clone(),
        llm_config.model_for(ctx.provider),
        llm_config.max_tokens,
    );
    let analysis = client
        .analyze(&ctx.event_type, &ctx.namespace, &ctx.pod_name, &logs)
        .await
        .context("llm analysis failed")?;

    info!("analysis complete:\n{analysis}");

    if ctx.slack_enabled && !ctx.slack_webhook.is_empty() {
        if let Err(e) = notify::send_slack(
            &ctx.slack_webhook,
            &ctx.event_type,
            &ctx.namespace,
            &ctx.pod_name,
            &analysis,
        )
        .await
        {
            error!(error = %e, "failed to send slack notification");
        } else {
            info!("slack notification sent");
        }
    }

    Ok(())
}

/// Tail the failing pod's logs via `kubectl logs`.
async fn fetch_pod_logs(namespace: &str, pod_name: &str, container_name: &str) -> Result<String> {
    let mut cmd = tokio::process::Command::new("kubectl");
    cmd.args([
        "logs",
        pod_name,
        "-n",
        namespace,
        &format!("--tail={LOG_TAIL_LINES}"),
    ]);
    if !container_name.is_empty() {
        cmd.args(["-c", container_name]);
    }

    let output = cmd.output().await.context("failed to run kubectl logs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("kubectl logs failed: {}", stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var construction is covered by the smoke tests at the binary
    // level; here we only pin the fallback behaviors.

    #[test]
    fn context_requires_pod_identity() {
        // Isolated env: POD_NAME intentionally absent.
        std::env::remove_var("POD_NAME");
        assert!(AnalyzeContext::from_env().is_err());
    }
}
