pub mod anthropic;
pub mod google;
pub mod openai;

use std::sync::Arc;

use agent_core::LlmProvider;
use tracing::info;

use crate::app_settings::{Config, LlmBackend, SettingsError};

pub use anthropic::{AnthropicConfig, AnthropicLlmProvider};
pub use google::{GoogleConfig, GoogleLlmProvider};
pub use openai::{OpenAiConfig, OpenAiLlmProvider};

/// Build the model backend named by `llm.provider`.
pub fn build_llm_provider(config: &Config) -> Result<Arc<dyn LlmProvider>, SettingsError> {
    let backend = config.backend()?;
    let api_base = config.api_base();
    let provider: Arc<dyn LlmProvider> = match backend {
        LlmBackend::OpenAi => {
            let provider = OpenAiLlmProvider::new(OpenAiConfig::from_settings(config)?)?;
            info!(
                model = provider.model(),
                %api_base,
                "Configured OpenAI-compatible model backend"
            );
            Arc::new(provider)
        }
        LlmBackend::Anthropic => {
            let provider = AnthropicLlmProvider::new(AnthropicConfig::from_settings(config)?)?;
            info!(
                model = provider.model(),
                %api_base,
                "Configured Anthropic model backend"
            );
            Arc::new(provider)
        }
        LlmBackend::Google => {
            let provider = GoogleLlmProvider::new(GoogleConfig::from_settings(config)?)?;
            info!(
                model = provider.model(),
                %api_base,
                "Configured Google Gemini model backend"
            );
            Arc::new(provider)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_the_selected_backend() {
        let mut config = Config::default();
        config.llm.api_keys = vec!["sk-openai".into()];
        config.llm.anthropic_api_key = Some("sk-ant".into());
        config.llm.google_api_key = Some("g-key".into());
        for (name, expected) in [
            ("openai", "openai"),
            ("anthropic", "anthropic"),
            ("gemini", "google"),
        ] {
            config.llm.provider = name.to_string();
            let provider = build_llm_provider(&config).unwrap();
            assert_eq!(provider.name(), expected);
        }
    }

    #[test]
    fn missing_vendor_key_is_reported() {
        let mut config = Config::default();
        config.llm.api_keys = vec!["sk-openai".into()];
        config.llm.provider = "anthropic".into();
        assert!(matches!(
            build_llm_provider(&config),
            Err(SettingsError::MissingApiKey(LlmBackend::Anthropic))
        ));
    }
}
