use std::path::{Path, PathBuf};
use std::sync::Arc;

use ecrag_core::{Config, ConfigError};
use ecrag_index::VectorIndex;
use ecrag_ingest::document::chunker::Chunker;
use ecrag_ingest::embedding::{create_embedder, Embedder};
use ecrag_llm::{create_provider, LlmProvider};
use serde::Serialize;
use tracing::{error, info};

use crate::error::RagError;
use crate::ingest::{self, IngestReport};
use crate::rerank::Reranker;
use crate::retriever::Retriever;
use crate::synthesize::{AnswerOutcome, Synthesizer};

/// Snapshot of the engine's state for display.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub index_dir: PathBuf,
    pub entries: usize,
    pub dimensions: usize,
    pub chunk_backend: &'static str,
    pub scorer: &'static str,
    pub selection: String,
    pub llm_provider: String,
}

/// The question-answering pipeline and everything it owns.
///
/// Built once at startup. `load_knowledge` needs `&mut self`, so ingestion never
/// runs concurrently with itself or with `answer`.
pub struct RagEngine {
    config: Config,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: VectorIndex,
    retriever: Retriever,
    reranker: Reranker,
    synthesizer: Synthesizer,
}

impl RagEngine {
    /// Build the engine with the providers named in `config`.
    pub fn from_config(config: Config) -> Result<Self, RagError> {
        config.validate()?;
        let embedder = create_embedder(&config)?;
        let llm = create_provider(&config.llm, &config.ollama, &config.http)?;
        Self::new(config, embedder, llm)
    }

    /// Build the engine around explicit providers.
    ///
    /// Fails if the configuration is invalid, if the embedder's width differs from
    /// `EMBEDDING_DIMENSIONS`, or if the persisted index was built with another width.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Box<dyn LlmProvider>,
    ) -> Result<Self, RagError> {
        config.validate()?;
        if embedder.dimensions() != config.embedding.dimensions {
            return Err(ConfigError::invalid(
                "EMBEDDING_DIMENSIONS",
                format!(
                    "configured {} but the embedder produces {}",
                    config.embedding.dimensions,
                    embedder.dimensions()
                ),
            )
            .into());
        }

        let index =
            VectorIndex::open_or_create(&config.storage.index_dir, config.embedding.dimensions)?;
        let chunker = Chunker::from_config(&config.chunking);
        let retriever = Retriever::new(
            embedder.clone(),
            config.embedding.cache_size,
            config.retrieval.fetch_k,
        );
        let reranker = Reranker::from_config(&config.retrieval)?;
        let synthesizer = Synthesizer::new(llm, config.llm.temperature, config.llm.max_tokens);

        info!(
            entries = index.len(),
            chunk_backend = chunker.backend().name(),
            scorer = reranker.scorer_name(),
            llm = synthesizer.provider_name(),
            "RAG engine ready"
        );

        Ok(Self {
            config,
            chunker,
            embedder,
            index,
            retriever,
            reranker,
            synthesizer,
        })
    }

    /// Ingest the given sources and return the number of chunks added.
    pub async fn load_knowledge<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, RagError> {
        let report = self.ingest(paths).await?;
        Ok(report.chunks.len())
    }

    /// Like [`load_knowledge`](Self::load_knowledge) but returns the full report.
    pub async fn ingest<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<IngestReport, RagError> {
        ingest::load_knowledge(
            paths,
            &self.chunker,
            self.embedder.clone(),
            self.config.embedding.batch_size,
            &mut self.index,
            &self.config.storage.index_dir,
        )
        .await
    }

    /// Answer a question from the knowledge base. Failures are reported in the outcome.
    pub async fn answer(&self, question: &str) -> AnswerOutcome {
        let retrieval = match self.retriever.retrieve(&self.index, question).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "retrieval failed");
                return AnswerOutcome::Failed(e.to_string());
            }
        };
        info!(candidates = retrieval.candidates.len(), "retrieved candidates");

        if retrieval.is_empty() {
            return AnswerOutcome::NoRelevantInformation;
        }

        let selected = self
            .reranker
            .rerank(&retrieval.query_vector, retrieval.candidates);
        let chunks: Vec<_> = selected.into_iter().map(|s| s.chunk).collect();
        self.synthesizer.synthesize(question, &chunks).await
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            index_dir: self.config.storage.index_dir.clone(),
            entries: self.index.len(),
            dimensions: self.index.dimensions(),
            chunk_backend: self.chunker.backend().name(),
            scorer: self.reranker.scorer_name(),
            selection: format!("{:?}", self.reranker.selection()),
            llm_provider: self.synthesizer.provider_name().to_string(),
        }
    }
}
