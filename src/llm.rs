//! Generative-model providers.
//!
//! All agents talk to a model through the [`LanguageModel`] trait. One
//! implementation exists per provider, selected by [`create_model`] from the
//! `[llm]` config section:
//!
//! | Config Value | Model | Endpoint |
//! |-------------|-------|----------|
//! | `"openai"` | [`OpenAiModel`] | `POST /v1/chat/completions` |
//! | `"anthropic"` | [`AnthropicModel`] | `POST /v1/messages` |
//! | `"google"` | [`GeminiModel`] | `POST /v1beta/models/{model}:generateContent` |
//! | `"demo"` | [`DemoModel`] | none |
//!
//! # Failure Rendering
//!
//! `complete` never fails. A missing API key, a non-success status, a
//! transport error, a timeout or an unexpected response body becomes a
//! bracketed sentinel that takes the place of the model's text:
//!
//! - `[Error: OpenAI API key not configured]`
//! - `[Error: 503]`
//! - `[Error calling OpenAI: <reason>]`
//!
//! The pipeline keeps going with the sentinel as content, so a broken
//! provider produces a visibly degraded answer instead of an aborted request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::LlmConfig;

/// Completion capability shared by every provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    /// Complete `prompt`. Failures are returned as bracketed sentinel text.
    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> String;
}

/// True if `text` is a provider failure sentinel rather than model output.
pub fn is_error_sentinel(text: &str) -> bool {
    text.starts_with("[Error")
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request and pull the completion text out of the JSON body.
async fn send(
    provider: &str,
    request: reqwest::RequestBuilder,
    extract: fn(&Value) -> Option<String>,
) -> String {
    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(provider, error = %e, "model call failed");
            return format!("[Error calling {}: {}]", provider, e);
        }
    };

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(provider, status = status.as_u16(), "model call rejected");
        return format!("[Error: {}]", status.as_u16());
    }

    match response.json::<Value>().await {
        Ok(body) => extract(&body).unwrap_or_else(|| {
            tracing::warn!(provider, "model response missing completion text");
            format!("[Error calling {}: unexpected response format]", provider)
        }),
        Err(e) => {
            tracing::warn!(provider, error = %e, "model response not JSON");
            format!("[Error calling {}: {}]", provider, e)
        }
    }
}

fn missing_key(provider: &str) -> String {
    tracing::warn!(provider, "model API key not configured");
    format!("[Error: {} API key not configured]", provider)
}

// ─── OpenAI ─────────────────────────────────────────────────────────

pub struct OpenAiModel {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiModel {
    pub const DEFAULT_MODEL: &'static str = "gpt-3.5-turbo";

    pub fn new(api_key: Option<String>, model: Option<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model: model.unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return missing_key(self.name());
        };
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        let request = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body);
        send(self.name(), request, |v| {
            v.pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .await
    }
}

// ─── Anthropic ──────────────────────────────────────────────────────

pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicModel {
    pub const DEFAULT_MODEL: &'static str = "claude-3-sonnet-20240229";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: Option<String>, model: Option<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model: model.unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn name(&self) -> &str {
        "Anthropic"
    }

    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return missing_key(self.name());
        };
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);
        send(self.name(), request, |v| {
            v.pointer("/content/0/text")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .await
    }
}

// ─── Google Gemini ──────────────────────────────────────────────────

pub struct GeminiModel {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiModel {
    pub const DEFAULT_MODEL: &'static str = "gemini-pro";

    pub fn new(api_key: Option<String>, model: Option<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model: model.unwrap_or_else(|| Self::DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        "Google"
    }

    async fn complete(&self, prompt: &str, temperature: f32, max_tokens: u32) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return missing_key(self.name());
        };
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let request = self
            .client
            .post(url)
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&body);
        send(self.name(), request, |v| {
            v.pointer("/candidates/0/content/parts/0/text")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .await
    }
}

// ─── Demo ───────────────────────────────────────────────────────────

/// Offline stand-in that echoes the head of the prompt.
pub struct DemoModel;

#[async_trait]
impl LanguageModel for DemoModel {
    fn name(&self) -> &str {
        "Demo"
    }

    async fn complete(&self, prompt: &str, _temperature: f32, _max_tokens: u32) -> String {
        let head: String = prompt.chars().take(100).collect();
        format!("[Demo Mode] LLM response for: {}...", head)
    }
}

/// Key from config, else the provider's environment variable.
fn resolve_key(config: &LlmConfig, env_var: &str) -> Option<String> {
    config
        .api_key
        .clone()
        .or_else(|| std::env::var(env_var).ok())
        .filter(|k| !k.trim().is_empty())
}

/// Build the configured provider.
///
/// A missing API key is not an error here; calls render the
/// not-configured sentinel instead.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    let model = config.model.clone();
    let timeout = config.timeout_secs;
    let provider: Arc<dyn LanguageModel> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiModel::new(
            resolve_key(config, "OPENAI_API_KEY"),
            model,
            timeout,
        )?),
        "anthropic" => Arc::new(AnthropicModel::new(
            resolve_key(config, "ANTHROPIC_API_KEY"),
            model,
            timeout,
        )?),
        "google" => Arc::new(GeminiModel::new(
            resolve_key(config, "GOOGLE_API_KEY"),
            model,
            timeout,
        )?),
        "demo" => Arc::new(DemoModel),
        other => bail!("Unknown llm provider: {}", other),
    };
    tracing::debug!(provider = provider.name(), "language model ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_sentinels() {
        let openai = OpenAiModel::new(None, None, 5).unwrap();
        assert_eq!(
            openai.complete("hi", 0.3, 10).await,
            "[Error: OpenAI API key not configured]"
        );
        let anthropic = AnthropicModel::new(None, None, 5).unwrap();
        assert_eq!(
            anthropic.complete("hi", 0.3, 10).await,
            "[Error: Anthropic API key not configured]"
        );
        let google = GeminiModel::new(None, None, 5).unwrap();
        assert_eq!(
            google.complete("hi", 0.3, 10).await,
            "[Error: Google API key not configured]"
        );
    }

    #[tokio::test]
    async fn test_demo_model_truncates_prompt() {
        let prompt = "x".repeat(150);
        let out = DemoModel.complete(&prompt, 0.5, 100).await;
        assert_eq!(out, format!("[Demo Mode] LLM response for: {}...", "x".repeat(100)));
    }

    #[test]
    fn test_sentinel_detection() {
        assert!(is_error_sentinel("[Error: 503]"));
        assert!(is_error_sentinel("[Error calling OpenAI: timeout]"));
        assert!(!is_error_sentinel("[Demo Mode] LLM response for: x..."));
    }

    #[test]
    fn test_create_model_rejects_unknown() {
        let config = LlmConfig {
            provider: "cohere".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_model(&config).is_err());
    }

    #[test]
    fn test_create_model_demo() {
        let model = create_model(&LlmConfig::default()).unwrap();
        assert_eq!(model.name(), "Demo");
    }
}
