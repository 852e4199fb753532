//! Text generation providers.
//!
//! - **[`DisabledGenerator`]** always fails; used when
//!   `generation.provider = "disabled"`. `retro --dry-run` still works.
//! - **[`OpenAIGenerator`]** calls an OpenAI-compatible
//!   `POST {base_url}/chat/completions` endpoint once per request.
//!
//! Failures are never retried here and always surface as
//! [`PulseError::GenerationUnavailable`]. Use [`create_generator`] to pick
//! the provider from configuration.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use sprint_pulse_core::models::GenerationParams;
use sprint_pulse_core::traits::Generator;
use sprint_pulse_core::PulseError;

use crate::config::GenerationConfig;

const SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> sprint_pulse_core::Result<String> {
        Err(PulseError::GenerationUnavailable(
            "generation provider is disabled; set [generation] provider = \"openai\"".to_string(),
        ))
    }
}

pub struct OpenAIGenerator {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            client,
        })
    }
}

/// Chat-completions request body.
pub fn request_body(prompt: &str, params: &GenerationParams) -> Value {
    let mut body = json!({
        "model": params.model,
        "messages": [
            { "role": "system", "content": SYSTEM_MESSAGE },
            { "role": "user", "content": prompt },
        ],
    });
    if let Some(t) = params.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(m) = params.max_tokens {
        body["max_tokens"] = json!(m);
    }
    body
}

/// Extract `choices[0].message.content`. An empty completion is an error:
/// caching it would pin an empty summary to the fingerprint.
pub fn parse_completion(json: &Value) -> sprint_pulse_core::Result<String> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PulseError::GenerationUnavailable(
                "invalid response: missing choices[0].message.content".into(),
            )
        })?;
    if text.trim().is_empty() {
        return Err(PulseError::GenerationUnavailable("empty completion".into()));
    }
    Ok(text.to_string())
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> sprint_pulse_core::Result<String> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body(prompt, params))
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "request failed" };
                PulseError::GenerationUnavailable(format!("{}: {}", kind, e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(PulseError::GenerationUnavailable(format!(
                "API error {}: {}",
                status, body_text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| PulseError::GenerationUnavailable(e.to_string()))?;
        tracing::debug!(model = %params.model, "generation completed");
        parse_completion(&json)
    }
}

/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"openai"` | [`OpenAIGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
