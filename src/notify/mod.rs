//! Outbound Slack notification for completed analyses.

use anyhow::{bail, Context, Result};
use serde_json::json;

/// Post an incident analysis to a Slack incoming webhook.
pub async fn send_slack(
    webhook_url: &str,
    event_type: &str,
    namespace: &str,
    pod_name: &str,
    analysis: &str,
) -> Result<()> {
    let payload = payload(event_type, namespace, pod_name, analysis);

    let resp = reqwest::Client::new()
        .post(webhook_url)
        .json(&payload)
        .send()
        .await
        .context("slack webhook request failed")?;

    if !resp.status().is_success() {
        bail!("slack webhook returned {}", resp.status());
    }
    Ok(())
}

fn payload(event_type: &str, namespace: &str, pod_name: &str, analysis: &str) -> serde_json::Value {
    json!({
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!(":rotating_light: {event_type}: {namespace}/{pod_name}"),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": analysis}
            }
        ]
    })
}
