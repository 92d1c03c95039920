//! Retrieval-augmented question answering over a persisted chunk index.
//!
//! [`RagEngine`] owns every long-lived component: chunker, embedder, index,
//! re-ranker and answer synthesizer. `load_knowledge` feeds documents through
//! chunking and batched embedding into the index; `answer` runs retrieval,
//! re-ranking and generation and always yields an [`AnswerOutcome`].

pub mod engine;
pub mod error;
pub mod ingest;
pub mod rerank;
pub mod retriever;
pub mod synthesize;

pub use engine::{EngineStats, RagEngine};
pub use error::RagError;
pub use ingest::IngestReport;
pub use rerank::{Reranker, ScoredChunk, Selection, SimilarityScorer};
pub use retriever::{Candidate, Retrieval, Retriever};
pub use synthesize::{AnswerOutcome, NOT_FOUND_REPLY, NO_RELEVANT_INFORMATION};
