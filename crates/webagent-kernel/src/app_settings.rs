use std::collections::BTreeMap;
use std::env;

use agent_core::AgentConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use webagent_core_types::WebProjectId;

pub const OPENAI_KEY_ENV_VARS: &[&str] = &["WEBAGENT_OPENAI_API_KEY", "OPENAI_API_KEY"];
pub const ANTHROPIC_KEY_ENV_VARS: &[&str] = &["WEBAGENT_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"];
pub const GOOGLE_KEY_ENV_VARS: &[&str] = &["WEBAGENT_GOOGLE_API_KEY", "GOOGLE_API_KEY"];
pub const LLM_PROVIDER_ENV: &str = "WEBAGENT_LLM_PROVIDER";
pub const LLM_MODEL_ENV: &str = "WEBAGENT_LLM_MODEL";
pub const LLM_API_BASE_ENV: &str = "WEBAGENT_LLM_API_BASE";
pub const PORT_ENV: &str = "WEBAGENT_PORT";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(
        "missing {} API key; set llm.{} or {}",
        .0.name(),
        .0.key_setting(),
        .0.key_env_vars().join(" or ")
    )]
    MissingApiKey(LlmBackend),
}

/// Model vendors the service can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Anthropic,
    Google,
}

impl LlmBackend {
    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            other => Err(SettingsError::Invalid(format!(
                "unsupported llm.provider '{other}' (expected openai, anthropic or google)"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    pub fn default_api_base(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn key_setting(self) -> &'static str {
        match self {
            Self::OpenAi => "api_keys",
            Self::Anthropic => "anthropic_api_key",
            Self::Google => "google_api_key",
        }
    }

    pub fn key_env_vars(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => OPENAI_KEY_ENV_VARS,
            Self::Anthropic => ANTHROPIC_KEY_ENV_VARS,
            Self::Google => GOOGLE_KEY_ENV_VARS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub llm: LlmSettings,
    pub server: ServerSettings,
    /// Extra prompt guidance keyed by web project id.
    pub project_hints: BTreeMap<String, String>,
}

/// Model backend settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LlmSettings {
    /// `openai`, `anthropic` or `google`.
    pub provider: String,
    pub model: String,
    /// Defaults to the provider's public endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// OpenAI keys, tried in order; a 429 moves on to the next one.
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub google_api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_base: None,
            api_keys: Vec::new(),
            anthropic_api_key: None,
            google_api_key: None,
            temperature: 0.3,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// How often terminal sessions past their grace period are evicted.
    pub sweep_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            sweep_interval_secs: 30,
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, SettingsError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Layer environment variables over file values.
    pub fn apply_env_overrides(&mut self) {
        for key in OPENAI_KEY_ENV_VARS {
            if let Some(value) = env::var(key).ok().and_then(|raw| sanitize_secret(&raw)) {
                if !self.llm.api_keys.contains(&value) {
                    self.llm.api_keys.insert(0, value);
                }
                break;
            }
        }
        if let Some(key) = first_secret_env(ANTHROPIC_KEY_ENV_VARS) {
            self.llm.anthropic_api_key = Some(key);
        }
        if let Some(key) = first_secret_env(GOOGLE_KEY_ENV_VARS) {
            self.llm.google_api_key = Some(key);
        }
        if let Some(provider) = non_empty_env(LLM_PROVIDER_ENV) {
            self.llm.provider = provider;
        }
        if let Some(model) = non_empty_env(LLM_MODEL_ENV) {
            info!(%model, "Using model from {}", LLM_MODEL_ENV);
            self.llm.model = model;
        }
        if let Some(base) = non_empty_env(LLM_API_BASE_ENV) {
            self.llm.api_base = Some(base);
        }
        if let Some(raw) = non_empty_env(PORT_ENV) {
            match raw.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(err) => warn!(?err, value = raw, "invalid {}", PORT_ENV),
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.agent
            .validate()
            .map_err(|err| SettingsError::Invalid(err.to_string()))?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(SettingsError::Invalid(format!(
                "llm.temperature must be within 0.0..=2.0 (got {})",
                self.llm.temperature
            )));
        }
        let api_base = self.api_base();
        match Url::parse(&api_base) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(SettingsError::Invalid(format!(
                    "llm.api_base must use http or https (got '{}')",
                    url.scheme()
                )))
            }
            Err(err) => {
                return Err(SettingsError::Invalid(format!(
                    "llm.api_base '{api_base}' is not a valid URL: {err}"
                )))
            }
        }
        self.backend().map(|_| ())
    }

    pub fn backend(&self) -> Result<LlmBackend, SettingsError> {
        LlmBackend::parse(&self.llm.provider)
    }

    /// Configured endpoint, or the selected provider's public one.
    pub fn api_base(&self) -> String {
        if let Some(base) = self
            .llm
            .api_base
            .as_deref()
            .map(str::trim)
            .filter(|base| !base.is_empty())
        {
            return base.to_string();
        }
        self.backend()
            .unwrap_or(LlmBackend::OpenAi)
            .default_api_base()
            .to_string()
    }

    /// Usable API keys for the selected provider, placeholders removed.
    pub fn api_keys(&self) -> Result<Vec<String>, SettingsError> {
        let backend = self.backend()?;
        let configured: Vec<&String> = match backend {
            LlmBackend::OpenAi => self.llm.api_keys.iter().collect(),
            LlmBackend::Anthropic => self.llm.anthropic_api_key.iter().collect(),
            LlmBackend::Google => self.llm.google_api_key.iter().collect(),
        };
        let mut keys: Vec<String> = Vec::new();
        for value in configured.into_iter().filter_map(|raw| sanitize_secret(raw)) {
            if !keys.contains(&value) {
                keys.push(value);
            }
        }
        if keys.is_empty() {
            return Err(SettingsError::MissingApiKey(backend));
        }
        Ok(keys)
    }

    pub fn project_hint(&self, project: &WebProjectId) -> Option<&str> {
        if project.is_empty() {
            return None;
        }
        self.project_hints
            .get(project.as_str())
            .map(String::as_str)
            .filter(|hint| !hint.trim().is_empty())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn first_secret_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| env::var(key).ok().and_then(|raw| sanitize_secret(&raw)))
}

fn sanitize_secret(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let unquoted = trimmed.trim_matches(|c| c == '"' || c == '\'');
    if !unquoted.chars().any(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let lowered = unquoted.to_ascii_lowercase();
    if matches!(
        lowered.as_str(),
        "your-api-key" | "replace-me" | "changeme" | "set-me" | "todo"
    ) {
        return None;
    }
    Some(unquoted.to_string())
}
