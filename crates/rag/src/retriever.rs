use std::sync::Arc;

use ecrag_index::VectorIndex;
use ecrag_ingest::embedding::{Embedder, EmbeddingCache};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RagError;

/// A retrieval hit: chunk, stored vector, L2 distance and 0-based retrieval rank.
pub use ecrag_index::SearchHit as Candidate;

/// Query vector plus the nearest candidates, nearest first.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub query_vector: Vec<f32>,
    pub candidates: Vec<Candidate>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Embeds queries (with an LRU cache) and pulls `fetch_k` candidates from the index.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    cache: Mutex<EmbeddingCache>,
    fetch_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, cache_size: usize, fetch_k: usize) -> Self {
        Self {
            embedder,
            cache: Mutex::new(EmbeddingCache::new(cache_size)),
            fetch_k,
        }
    }

    pub fn fetch_k(&self) -> usize {
        self.fetch_k
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        if let Some(hit) = self.cache.lock().await.get(query) {
            debug!("query embedding served from cache");
            return Ok(hit);
        }
        let vector = self.embedder.embed_query(query).await?;
        self.cache.lock().await.put(query, vector.clone());
        Ok(vector)
    }

    /// Candidates for `query`. An empty index yields an empty result without
    /// calling the embedder.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<Retrieval, RagError> {
        if index.is_empty() {
            return Ok(Retrieval {
                query_vector: Vec::new(),
                candidates: Vec::new(),
            });
        }
        let query_vector = self.embed_query(query).await?;
        let candidates = index.search(&query_vector, self.fetch_k)?;
        debug!(candidates = candidates.len(), fetch_k = self.fetch_k, "retrieved candidates");
        Ok(Retrieval {
            query_vector,
            candidates,
        })
    }

    /// (hits, misses) of the query cache.
    pub async fn cache_stats(&self) -> (u64, u64) {
        let cache = self.cache.lock().await;
        (cache.hits(), cache.misses())
    }
}
