use std::time::Duration;

use agent_core::{LlmError, LlmProvider, Prompt};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_settings::{Config, LlmBackend, SettingsError};

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl GoogleConfig {
    pub fn from_settings(config: &Config) -> Result<Self, SettingsError> {
        let api_key = config
            .api_keys()?
            .into_iter()
            .next()
            .ok_or(SettingsError::MissingApiKey(LlmBackend::Google))?;
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

/// `generateContent` client for Gemini models.
pub struct GoogleLlmProvider {
    client: Client,
    config: GoogleConfig,
}

impl GoogleLlmProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, SettingsError> {
        if config.api_key.trim().is_empty() {
            return Err(SettingsError::MissingApiKey(LlmBackend::Google));
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
        let base = self.config.api_base.trim_end_matches('/');
        if base.contains(":generateContent") {
            return base.to_string();
        }
        let model = self.config.model.trim_start_matches("models/");
        format!("{base}/models/{model}:generateContent")
    }
}

#[async_trait]
impl LlmProvider for GoogleLlmProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let body = GenerateContentRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(prompt.system.clone()),
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(prompt.user.clone()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = match self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) if err.is_timeout() => return Err(LlmError::Timeout),
            // reqwest errors can echo the URL, and the key rides in the query string.
            Err(err) => {
                return Err(LlmError::Unavailable(format!(
                    "gemini request failed: {}",
                    err.without_url()
                )));
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

        let response: GenerateContentResponse = response.json().await.map_err(|err| {
            LlmError::InvalidResponse(format!("gemini response invalid: {}", err.without_url()))
        })?;

        if let Some(usage) = &response.usage_metadata {
            debug!(
                target: "google",
                model = %self.config.model,
                input_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "gemini generation finished"
            );
        }

        let content = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    fn name(&self) -> &str {
        "google"
    }
}

fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let message = gemini_error_message(body).unwrap_or_else(|| body.trim().to_string());
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited(format!("Gemini quota exceeded: {message}"))
    } else if status.is_server_error() {
        LlmError::Unavailable(format!("gemini returned {status}: {message}"))
    } else {
        LlmError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn gemini_error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<GeminiErrorEnvelope>(raw)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .map(|message| message.trim().to_string())
}
