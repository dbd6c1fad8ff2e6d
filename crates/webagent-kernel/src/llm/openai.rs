use std::time::Duration;

use agent_core::{LlmError, LlmProvider, Prompt};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app_settings::{Config, LlmBackend, SettingsError};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn from_settings(config: &Config) -> Result<Self, SettingsError> {
        Ok(Self {
            api_keys: config.api_keys()?,
            model: config.llm.model.clone(),
            api_base: config.api_base(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            timeout: config.agent.llm_timeout_duration(),
        })
    }
}

/// Chat-completions client for OpenAI-compatible backends.
pub struct OpenAiLlmProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiLlmProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, SettingsError> {
        if config.api_keys.is_empty() {
            return Err(SettingsError::MissingApiKey(LlmBackend::OpenAi));
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

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let url = self.endpoint();
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
        };

        let mut last_error: Option<LlmError> = None;
        for (index, key) in self.config.api_keys.iter().enumerate() {
            let response = match self.client.post(&url).bearer_auth(key).json(&body).send().await {
                Ok(resp) => resp,
                Err(err) if err.is_timeout() => return Err(LlmError::Timeout),
                Err(err) => {
                    return Err(LlmError::Unavailable(format!("openai request failed: {err}")));
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<response unavailable>".to_string());
                if status == StatusCode::TOO_MANY_REQUESTS {
                    let friendly = openai_rate_limit_message(&text);
                    let remaining = self.config.api_keys.len() - index - 1;
                    warn!(
                        target: "openai",
                        message = %friendly,
                        attempt = index + 1,
                        remaining,
                        "OpenAI rate limited step decision; switching API key"
                    );
                    last_error = Some(LlmError::RateLimited(friendly));
                    continue;
                }
                return Err(classify_status(status, &text));
            }

            let response: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|err| LlmError::InvalidResponse(format!("openai response invalid: {err}")))?;

            if let Some(usage) = &response.usage {
                debug!(
                    target: "openai",
                    model = %self.config.model,
                    input_tokens = usage.prompt_tokens,
                    output_tokens = usage.completion_tokens,
                    "chat completion finished"
                );
            }

            return response
                .choices
                .first()
                .and_then(|choice| choice.message.content.as_ref())
                .and_then(ChatCompletionContent::as_text)
                .filter(|text| !text.trim().is_empty())
                .ok_or(LlmError::EmptyResponse);
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Unavailable("OpenAI request exhausted all API keys".into())))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let message = openai_error_message(body).unwrap_or_else(|| body.trim().to_string());
    if status.is_server_error() {
        LlmError::Unavailable(format!("openai returned {status}: {message}"))
    } else {
        LlmError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<ChatCompletionContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn openai_error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<OpenAiErrorEnvelope>(raw)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .map(|message| message.trim().to_string())
}

fn openai_rate_limit_message(raw: &str) -> String {
    match openai_error_message(raw) {
        Some(message) => format!(
            "OpenAI rate limit exceeded: {}. Please retry later or configure a higher tier.",
            message
        ),
        None => "OpenAI rate limit exceeded; please retry later or reduce usage.".to_string(),
    }
}
