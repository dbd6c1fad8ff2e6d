use std::time::Duration;

use agent_core::{LlmError, LlmProvider, Prompt};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_settings::{Config, LlmBackend, SettingsError};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn from_settings(config: &Config) -> Result<Self, SettingsError> {
        let api_key = config
            .api_keys()?
            .into_iter()
            .next()
            .ok_or(SettingsError::MissingApiKey(LlmBackend::Anthropic))?;
        Ok(Self {
            api_key,
            model: config.llm.model.clone(),
            api_base: config.api_base(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            timeout: config.agent.llm_timeout_duration(),
        })
    }
}

/// Messages API client for Claude models.
pub struct AnthropicLlmProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicLlmProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, SettingsError> {
        if config.api_key.trim().is_empty() {
            return Err(SettingsError::MissingApiKey(LlmBackend::Anthropic));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| SettingsError::Invalid(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LlmProvider for AnthropicLlmProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let body = ClaudeRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            system: prompt.system.clone(),
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: vec![ClaudeContent {
                    _type: "text".to_string(),
                    text: prompt.user.clone(),
                }],
            }],
        };

        let url = format!("{}/messages", self.config.api_base.trim_end_matches('/'));

        let response = match self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) if err.is_timeout() => return Err(LlmError::Timeout),
            Err(err) => {
                return Err(LlmError::Unavailable(format!("claude request failed: {err}")));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(classify_status(status, &text));
        }

        let response: ClaudeResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(format!("claude response invalid: {err}")))?;

        if let Some(usage) = &response.usage {
            debug!(
                target: "anthropic",
                model = %self.config.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                "claude message finished"
            );
        }

        let content = response
            .content
            .iter()
            .filter(|part| part._type == "text")
            .filter_map(|part| part.text.as_ref())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// 429 is a rate limit; 5xx, including 529 overloaded, is an outage.
fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let message = claude_error_message(body).unwrap_or_else(|| body.trim().to_string());
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited(format!("Anthropic rate limit exceeded: {message}"))
    } else if status.is_server_error() {
        LlmError::Unavailable(format!("claude returned {status}: {message}"))
    } else {
        LlmError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    system: String,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Serialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    _type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorEnvelope {
    error: ClaudeErrorBody,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn claude_error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<ClaudeErrorEnvelope>(raw)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .map(|message| message.trim().to_string())
}
