//! LLM provider clients for incident root-cause analysis.
//!
//! The provider set is closed, so dispatch is a single match over an enum
//! rather than a trait object.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Claude,
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Claude => "claude-3-5-sonnet-latest",
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Gemini => "gemini-1.5-flash",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Provider::Claude),
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub struct LlmClient {
    provider: Provider,
    api_key: String,
    model: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(provider: Provider, api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            provider,
            api_key,
            model,
            max_tokens,
            http: reqwest::Client::new(),
        }
    }

    /// Ask the provider for a root-cause analysis of one incident.
    pub async fn analyze(
        &self,
        event_type: &str,
        namespace: &str,
        pod_name: &str,
        logs: &str,
    ) -> Result<String> {
        let prompt = build_prompt(event_type, namespace, pod_name, logs);
        match self.provider {
            Provider::Claude => self.analyze_claude(&prompt).await,
            Provider::OpenAi => self.analyze_openai(&prompt).await,
            Provider::Gemini => self.analyze_gemini(&prompt).await,
        }
    }

    async fn analyze_claude(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp: serde_json::Value = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("claude request failed")?
            .error_for_status()
            .context("claude returned an error status")?
            .json()
            .await
            .context("claude response was not JSON")?;

        match resp["content"][0]["text"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => bail!("unexpected claude response shape"),
        }
    }

    async fn analyze_openai(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp: serde_json::Value = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai returned an error status")?
            .json()
            .await
            .context("openai response was not JSON")?;

        match resp["choices"][0]["message"]["content"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => bail!("unexpected openai response shape"),
        }
    }

    async fn analyze_gemini(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"maxOutputTokens": self.max_tokens},
        });

        let resp: serde_json::Value = self
            .http
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .context("gemini request failed")?
            .error_for_status()
            .context("gemini returned an error status")?
            .json()
            .await
            .context("gemini response was not JSON")?;

        match resp["candidates"][0]["content"]["parts"][0]["text"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => bail!("unexpected gemini response shape"),
        }
    }
}

fn build_prompt(event_type: &str, namespace: &str, pod_name: &str, logs: &str) -> String {
    format!(
        "Analyze this Kubernetes incident:\n\n\
         Event Type: {event_type}\n\
         Pod: {namespace}/{pod_name}\n\
         Logs:\n{logs}\n\n\
         Provide:\n\
         1. Root cause\n\
         2. Immediate fix\n\
         3. Long-term solution"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_known_names() {
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Claude);
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("grok".parse::<Provider>().is_err());
    }

    #[test]
    fn prompt_includes_incident_context() {
        let p = build_prompt("OOMKilled", "prod", "web-1", "fatal: out of memory");
        assert!(p.contains("Event Type: OOMKilled"));
        assert!(p.contains("Pod: prod/web-1"));
        assert!(p.contains("fatal: out of memory"));
        assert!(p.contains("Root cause"));
    }
}
