use ecrag_core::ConfigError;
use ecrag_index::IndexError;
use ecrag_ingest::embedding::EmbeddingError;
use ecrag_llm::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("no chunks were produced from the given sources")]
    EmptyKnowledgeBase,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("generation error: {0}")]
    Llm(#[from] LlmError),
}
