//! Configuration -- loaded once at startup from a TOML file plus a small
//! set of environment variables, then passed by reference into the
//! components. Core logic never reads the environment itself.

use crate::classify::EventPolicy;
use crate::llm::Provider;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported llm provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watch: WatchConfig,
    pub events: EventPolicy,
    pub tracker: TrackerConfig,
    pub llm: LlmConfig,
    pub slack: SlackConfig,
    pub analyzer: AnalyzerConfig,
}

impl Config {
    /// Load from a TOML file and apply environment overrides
    /// (`WATCH_NAMESPACE`). Validates the LLM provider name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&raw)?;

        if let Ok(ns) = std::env::var("WATCH_NAMESPACE") {
            if !ns.is_empty() {
                config.watch.namespace = ns;
            }
        }

        config
            .llm
            .provider
            .parse::<Provider>()
            .map_err(|_| ConfigError::UnknownProvider(config.llm.provider.clone()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub namespace: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
        }
    }
}

/// Deduplication gate parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub cooldown_minutes: u64,
    pub escalation_enabled: bool,
    pub escalation_threshold: u32,
    pub silence_duration_minutes: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: 5,
            escalation_enabled: true,
            escalation_threshold: 10,
            silence_duration_minutes: 60,
        }
    }
}

impl TrackerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes * 60)
    }

    pub fn silence_duration(&self) -> Duration {
        Duration::from_secs(self.silence_duration_minutes * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub max_tokens: u32,
    /// Per-provider model overrides, e.g. `claude = "claude-3-5-sonnet-latest"`.
    pub model: HashMap<String, String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "claude".into(),
            max_tokens: 1024,
            model: HashMap::new(),
        }
    }
}

impl LlmConfig {
    /// Configured model for a provider, falling back to its default.
    pub fn model_for(&self, provider: Provider) -> String {
        self.model
            .get(provider.name())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub channel: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Namespace the analysis Jobs are created in.
    pub namespace: String,
    pub image: String,
    pub ttl_seconds_after_finished: u32,
    pub resources: ResourcesConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            image: "ghcr.io/podtriage/podtriage:latest".into(),
            ttl_seconds_after_finished: 300,
            resources: ResourcesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub requests: ResourceSpec,
    pub limits: ResourceSpec,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            requests: ResourceSpec {
                cpu: "100m".into(),
                memory: "128Mi".into(),
            },
            limits: ResourceSpec {
                cpu: "500m".into(),
                memory: "512Mi".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSpec {
    pub cpu: String,
    pub memory: String,
}

/// Credentials sourced from the environment at startup, never from the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub llm_api_key: String,
    pub slack_webhook: String,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            slack_webhook: std::env::var("SLACK_WEBHOOK_URL").unwrap_or_default(),
        }
    }
}
