//! Recursive character chunking engine.
//!
//! Splits each page of a document into overlapping chunks bounded by a character
//! budget, trying separators from coarsest (paragraph) to finest (clause punctuation)
//! and only descending to a finer separator for pieces that are still too long.
//!
//! Two backends produce identical output: `Reference` splits pages sequentially,
//! `Parallel` splits them on a dedicated rayon pool. The parallel backend is probed
//! at construction and degrades to the reference one if its pool cannot be built.

mod helpers;
mod strategies;
mod types;

use std::sync::Arc;

use ecrag_core::config::ChunkingConfig;
use ecrag_core::{Chunk, SourceDocument};
use rayon::prelude::*;
use tracing::{info, warn};

pub use types::{ChunkConfig, DEFAULT_SEPARATORS};

use strategies::{assemble, split_page};

/// Execution strategy for page splitting.
#[derive(Clone)]
pub enum ChunkBackend {
    Reference,
    Parallel(Arc<rayon::ThreadPool>),
}

impl ChunkBackend {
    /// Build a rayon pool for the parallel backend; fall back to `Reference` when the
    /// pool cannot be created. `threads == 0` lets rayon pick.
    pub fn probe_parallel(threads: usize) -> Self {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("ecrag-chunk-{i}"));
        if threads > 0 {
            builder = builder.num_threads(threads);
        }
        match builder.build() {
            Ok(pool) => {
                info!(threads = pool.current_num_threads(), "parallel chunker enabled");
                ChunkBackend::Parallel(Arc::new(pool))
            }
            Err(e) => {
                warn!(error = %e, "parallel chunker unavailable, using reference chunker");
                ChunkBackend::Reference
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChunkBackend::Reference => "reference",
            ChunkBackend::Parallel(_) => "parallel",
        }
    }
}

impl std::fmt::Debug for ChunkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Splits documents into provenance-carrying chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
    backend: ChunkBackend,
}

impl Chunker {
    /// Sequential chunker.
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            backend: ChunkBackend::Reference,
        }
    }

    /// Chunker built from runtime configuration, probing the parallel backend when
    /// `CHUNK_PARALLEL` is on.
    pub fn from_config(cfg: &ChunkingConfig) -> Self {
        let backend = if cfg.parallel {
            ChunkBackend::probe_parallel(cfg.threads)
        } else {
            ChunkBackend::Reference
        };
        Self::with_backend(ChunkConfig::from(cfg), backend)
    }

    pub fn with_backend(config: ChunkConfig, backend: ChunkBackend) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn backend(&self) -> &ChunkBackend {
        &self.backend
    }

    /// Chunk every page of `doc`. Chunk indices run across the whole document;
    /// each chunk keeps its page's 0-based index.
    pub fn chunk_document(&self, doc: &SourceDocument) -> Vec<Chunk> {
        let per_page = match &self.backend {
            ChunkBackend::Reference => doc
                .pages
                .iter()
                .map(|page| split_page(page, &self.config))
                .collect(),
            ChunkBackend::Parallel(pool) => pool.install(|| {
                doc.pages
                    .par_iter()
                    .map(|page| split_page(page, &self.config))
                    .collect::<Vec<_>>()
            }),
        };
        assemble(doc, per_page)
    }
}

/// Chunk a document with the sequential backend.
pub fn chunk_document(doc: &SourceDocument, config: &ChunkConfig) -> Vec<Chunk> {
    Chunker::new(config.clone()).chunk_document(doc)
}
