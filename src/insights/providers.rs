// HTTP backends for insight generation
use crate::config::{InsightsConfig, ProviderKind};
use crate::model::InsightError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 120;
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[async_trait]
pub trait InsightProvider: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, InsightError>;
}

/// Builds the configured provider, reading the API key from the environment.
pub fn build_provider(cfg: &InsightsConfig) -> Result<Box<dyn InsightProvider>, InsightError> {
    let api_key = env::var(&cfg.api_key_env)
        .map_err(|_| InsightError::MissingApiKey(cfg.api_key_env.clone()))?;
    let client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?;

    let provider: Box<dyn InsightProvider> = match cfg.provider {
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(client, cfg, api_key)),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(client, cfg, api_key)),
    };
    Ok(provider)
}

/// Joins `path` onto a base URL that may or may not already end in `/v1`.
fn endpoint(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{}/{}", base, path)
    } else {
        format!("{}/v1/{}", base, path)
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, InsightError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        warn!("❌ Provider responded [{}]: {}", status, body);
        return Err(InsightError::Api {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|_| InsightError::UnexpectedResponse(body))
}

/// OpenAI-compatible chat completions.
pub struct OpenAiProvider {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(client: Client, cfg: &InsightsConfig, api_key: String) -> Self {
        Self {
            client,
            url: endpoint(&cfg.base_url, "chat/completions"),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        }
    }
}

#[async_trait]
impl InsightProvider for OpenAiProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, InsightError> {
        debug!("📤 OpenAI request to {} ({} chars)", self.url, prompt.len());
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt}
                ]
            }))
            .send()
            .await?;

        let body = read_json(response).await?;
        openai_text(&body).ok_or_else(|| InsightError::UnexpectedResponse(body.to_string()))
    }
}

fn openai_text(body: &Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
}

/// Anthropic messages API.
pub struct AnthropicProvider {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(client: Client, cfg: &InsightsConfig, api_key: String) -> Self {
        Self {
            client,
            url: endpoint(&cfg.base_url, "messages"),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        }
    }
}

#[async_trait]
impl InsightProvider for AnthropicProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, InsightError> {
        debug!("📤 Anthropic request to {} ({} chars)", self.url, prompt.len());
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "system": system,
                "messages": [{"role": "user", "content": prompt}]
            }))
            .send()
            .await?;

        let body = read_json(response).await?;
        anthropic_text(&body).ok_or_else(|| InsightError::UnexpectedResponse(body.to_string()))
    }
}

fn anthropic_text(body: &Value) -> Option<String> {
    body["content"][0]["text"].as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_handles_versioned_and_bare_bases() {
        assert_eq!(
            endpoint("https://api.openai.com", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://localhost:1234/v1/", "chat/completions"),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            endpoint("https://api.anthropic.com", "messages"),
            "https://api.anthropic.com/v1/messages"
        );
    }

    #[test]
    fn extracts_text_from_provider_bodies() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(openai_text(&openai).as_deref(), Some("hello"));

        let anthropic = json!({"content": [{"type": "text", "text": "hi"}]});
        assert_eq!(anthropic_text(&anthropic).as_deref(), Some("hi"));

        assert_eq!(openai_text(&anthropic), None);
    }

    #[test]
    fn missing_api_key_is_reported_by_name() {
        let cfg = InsightsConfig {
            provider: ProviderKind::Anthropic,
            model: "claude-3-haiku-20240307".into(),
            base_url: "https://api.anthropic.com".into(),
            api_key_env: "GSC_AUDIT_TEST_KEY_THAT_IS_NEVER_SET".into(),
            max_tokens: 1000,
            temperature: 0.7,
        };
        match build_provider(&cfg) {
            Err(InsightError::MissingApiKey(name)) => {
                assert_eq!(name, "GSC_AUDIT_TEST_KEY_THAT_IS_NEVER_SET")
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected missing key error"),
        }
    }
}
