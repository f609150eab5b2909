use super::Dispatcher;
use crate::classify::Incident;
use crate::config::{AnalyzerConfig, Config, Secrets};
use anyhow::{bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Creates a Kubernetes Job running the analyzer image for one incident.
///
/// The manifest is rendered as JSON and piped to `kubectl apply -f -`; the
/// incident context and credentials travel as env vars, mirroring what the
/// `analyze` subcommand reads on the other side.
pub struct JobDispatcher {
    namespace: String,
    analyzer: AnalyzerConfig,
    llm_provider: String,
    slack_enabled: bool,
    secrets: Secrets,
}

impl JobDispatcher {
    pub fn new(config: &Config, secrets: Secrets) -> Self {
        Self {
            namespace: config.analyzer.namespace.clone(),
            analyzer: config.analyzer.clone(),
            llm_provider: config.llm.provider.clone(),
            slack_enabled: config.slack.enabled,
            secrets,
        }
    }

    fn job_name(&self, incident: &Incident) -> String {
        // Unix timestamp suffix keeps names unique across re-triggers of
        // the same pod after the cooldown.
        format!("triage-{}-{}", incident.pod_name, chrono::Utc::now().timestamp())
    }

    fn manifest(&self, incident: &Incident, job_name: &str) -> serde_json::Value {
        let env = serde_json::json!([
            {"name": "POD_NAME", "value": incident.pod_name},
            {"name": "POD_NAMESPACE", "value": incident.namespace},
            {"name": "EVENT_TYPE", "value": incident.incident_type.to_string()},
            {"name": "CONTAINER_NAME", "value": incident.container_name},
            {"name": "REASON", "value": incident.reason},
            {"name": "MESSAGE", "value": incident.message},
            {"name": "LLM_PROVIDER", "value": self.llm_provider},
            {"name": "LLM_API_KEY", "value": self.secrets.llm_api_key},
            {"name": "SLACK_WEBHOOK_URL", "value": self.secrets.slack_webhook},
            {"name": "SLACK_ENABLED", "value": self.slack_enabled.to_string()},
        ]);

        serde_json::json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": job_name,
                "namespace": self.namespace,
                "labels": {
                    "app.kubernetes.io/name": "podtriage",
                    "app.kubernetes.io/component": "analyzer"
                }
            },
            "spec": {
                "ttlSecondsAfterFinished": self.analyzer.ttl_seconds_after_finished,
                "template": {
                    "spec": {
                        "serviceAccountName": "podtriage",
                        "restartPolicy": "Never",
                        "securityContext": {
                            "runAsNonRoot": true,
                            "runAsUser": 65532,
                            "fsGroup": 65532
                        },
                        "containers": [{
                            "name": "analyzer",
                            "image": self.analyzer.image,
                            "env": env,
                            "resources": {
                                "requests": {
                                    "cpu": self.analyzer.resources.requests.cpu,
                                    "memory": self.analyzer.resources.requests.memory
                                },
                                "limits": {
                                    "cpu": self.analyzer.resources.limits.cpu,
                                    "memory": self.analyzer.resources.limits.memory
                                }
                            },
                            "securityContext": {
                                "allowPrivilegeEscalation": false,
                                "readOnlyRootFilesystem": true,
                                "capabilities": {"drop": ["ALL"]}
                            }
                        }]
                    }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl Dispatcher for JobDispatcher {
    async fn dispatch(&self, incident: &Incident) -> Result<()> {
        let job_name = self.job_name(incident);
        let manifest = self.manifest(incident, &job_name);

        let mut child = tokio::process::Command::new("kubectl")
            .args(["apply", "-f", "-"])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .context("failed to spawn kubectl apply")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(manifest.to_string().as_bytes())
                .await
                .context("failed to write manifest to kubectl stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for kubectl apply")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("kubectl apply failed: {}", stderr.trim());
        }

        info!(
            job = %job_name,
            pod = %incident.pod_name,
            namespace = %incident.namespace,
            "spawned analysis job"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::IncidentType;

    fn dispatcher() -> JobDispatcher {
        let config = Config::default();
        let secrets = Secrets {
            llm_api_key: "key".into(),
            slack_webhook: "https://hooks.example.test/x".into(),
        };
        JobDispatcher::new(&config, secrets)
    }

    fn incident() -> Incident {
        Incident {
            pod_name: "web-1".into(),
            namespace: "prod".into(),
            container_name: "app".into(),
            incident_type: IncidentType::OomKilled,
            reason: "OOMKilled".into(),
            message: "container killed".into(),
        }
    }

    #[test]
    fn manifest_carries_incident_context() {
        let d = dispatcher();
        let m = d.manifest(&incident(), "triage-web-1-1");
        assert_eq!(m["kind"], "Job");
        assert_eq!(m["metadata"]["name"], "triage-web-1-1");

        let env = m["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_array()
            .unwrap();
        let get = |name: &str| {
            env.iter()
                .find(|e| e["name"] == name)
                .map(|e| e["value"].as_str().unwrap().to_string())
        };
        assert_eq!(get("POD_NAME").unwrap(), "web-1");
        assert_eq!(get("EVENT_TYPE").unwrap(), "OOMKilled");
        assert_eq!(get("LLM_API_KEY").unwrap(), "key");
        assert_eq!(get("SLACK_ENABLED").unwrap(), "false");
    }

    #[test]
    fn job_names_embed_pod_name() {
        let d = dispatcher();
        assert!(d.job_name(&incident()).starts_with("triage-web-1-"));
    }
}
