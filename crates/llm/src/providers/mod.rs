pub mod claude;
pub mod ollama;
pub mod openai;

use ecrag_core::config::{HttpConfig, LlmConfig, OllamaConfig};
use tracing::info;

use crate::provider::{LlmError, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Create the appropriate LLM provider based on config.
pub fn create_provider(
    llm_config: &LlmConfig,
    ollama_config: &OllamaConfig,
    http: &HttpConfig,
) -> Result<Box<dyn LlmProvider>, LlmError> {
    let timeout = http.timeout();
    let provider: Box<dyn LlmProvider> = match llm_config.provider.as_str() {
        "zhipu" => {
            let api_key = llm_config
                .zhipu_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ZHIPU_API_KEY not set".into()))?;
            Box::new(openai::OpenAiProvider::new(
                "zhipu",
                api_key.clone(),
                llm_config.zhipu_model.clone(),
                llm_config.zhipu_base_url.clone(),
                timeout,
            ))
        }
        "openai" => {
            let api_key = llm_config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            let base_url = llm_config
                .openai_base_url
                .as_deref()
                .unwrap_or(OPENAI_BASE_URL);
            Box::new(openai::OpenAiProvider::new(
                "openai",
                api_key.clone(),
                llm_config.openai_model.clone(),
                base_url.to_string(),
                timeout,
            ))
        }
        "anthropic" | "claude" => {
            let api_key = llm_config
                .anthropic_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;
            Box::new(claude::ClaudeProvider::new(
                api_key.clone(),
                llm_config.anthropic_model.clone(),
                timeout,
            ))
        }
        "ollama" => Box::new(ollama::OllamaProvider::new(
            ollama_config.url.clone(),
            ollama_config.model.clone(),
            timeout,
        )),
        other => {
            return Err(LlmError::NotConfigured(format!(
                "unknown LLM provider: '{}'",
                other
            )))
        }
    };
    info!(provider = provider.name(), "LLM provider ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported() {
        let llm = LlmConfig {
            provider: "zhipu".into(),
            zhipu_api_key: None,
            ..LlmConfig::default()
        };
        let err = create_provider(&llm, &OllamaConfig::default(), &HttpConfig::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("ZHIPU_API_KEY"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let llm = LlmConfig {
            provider: "gemini".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_provider(&llm, &OllamaConfig::default(), &HttpConfig::default()),
            Err(LlmError::NotConfigured(_))
        ));
    }

    #[test]
    fn zhipu_with_key_builds() {
        let llm = LlmConfig {
            provider: "zhipu".into(),
            zhipu_api_key: Some("test-key".into()),
            ..LlmConfig::default()
        };
        let provider =
            create_provider(&llm, &OllamaConfig::default(), &HttpConfig::default()).unwrap();
        assert_eq!(provider.name(), "zhipu");
    }
}
