pub mod batcher;
pub mod cache;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use ecrag_core::Config;
use tracing::info;

pub use batcher::EmbeddingBatcher;
pub use cache::EmbeddingCache;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use traits::{Embedder, EmbeddingError};

/// Build the embedder selected by `EMBEDDING_PROVIDER`.
///
/// Zhipu and OpenAI share the OpenAI-compatible client and reuse the API keys
/// configured for the chat provider of the same vendor.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let emb = &config.embedding;
    let model = emb.resolved_model(&config.ollama);
    let timeout = config.http.timeout();

    let embedder: Arc<dyn Embedder> = match emb.provider.as_str() {
        "zhipu" => {
            let key = config.llm.zhipu_api_key.clone().ok_or_else(|| {
                EmbeddingError::NotConfigured("ZHIPU_API_KEY is not set".to_string())
            })?;
            Arc::new(OpenAiEmbedder::new(
                key,
                model.clone(),
                Some(config.llm.zhipu_base_url.clone()),
                emb.dimensions,
                timeout,
            ))
        }
        "openai" => {
            let key = config.llm.openai_api_key.clone().ok_or_else(|| {
                EmbeddingError::NotConfigured("OPENAI_API_KEY is not set".to_string())
            })?;
            Arc::new(OpenAiEmbedder::new(
                key,
                model.clone(),
                config.llm.openai_base_url.clone(),
                emb.dimensions,
                timeout,
            ))
        }
        "ollama" => Arc::new(OllamaEmbedder::new(
            config.ollama.url.clone(),
            model.clone(),
            emb.dimensions,
            timeout,
        )),
        other => {
            return Err(EmbeddingError::NotConfigured(format!(
                "unknown embedding provider '{other}'"
            )))
        }
    };

    info!(provider = %emb.provider, model = %model, dims = emb.dimensions, "Embedder ready");
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zhipu_without_key_is_not_configured() {
        let mut config = Config::default();
        config.embedding.provider = "zhipu".to_string();
        config.llm.zhipu_api_key = None;
        assert!(matches!(
            create_embedder(&config),
            Err(EmbeddingError::NotConfigured(_))
        ));
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut config = Config::default();
        config.embedding.provider = "ollama".to_string();
        config.embedding.dimensions = 1024;
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimensions(), 1024);
    }
}
