use std::sync::Arc;

use ecrag_core::Chunk;

use super::traits::{Embedder, EmbeddingError};

/// Collects chunks and embeds them in provider-sized batches.
pub struct EmbeddingBatcher {
    buffer: Vec<Chunk>,
    batch_size: usize,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingBatcher {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            embedder,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Add a chunk to the batch. Returns the embedded batch once it is full.
    pub async fn add(
        &mut self,
        chunk: Chunk,
    ) -> Result<Option<Vec<(Chunk, Vec<f32>)>>, EmbeddingError> {
        self.buffer.push(chunk);
        if self.buffer.len() >= self.batch_size {
            Ok(Some(self.flush().await?))
        } else {
            Ok(None)
        }
    }

    /// Force-flush remaining chunks.
    pub async fn flush(&mut self) -> Result<Vec<(Chunk, Vec<f32>)>, EmbeddingError> {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let batch: Vec<Chunk> = self.buffer.drain(..).collect();
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                sent: batch.len(),
                received: embeddings.len(),
            });
        }

        Ok(batch.into_iter().zip(embeddings).collect())
    }

    /// Number of chunks currently buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEmbedder {
        call_count: AtomicUsize,
        dims: usize,
    }

    impl FakeEmbedder {
        fn new(dims: usize) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                dims,
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32; self.dims])
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.dims
        }
    }

    fn chunk(index: usize, content: &str) -> Chunk {
        Chunk {
            index,
            content: content.to_string(),
            source: "rules.pdf".to_string(),
            page_index: 0,
            oversized: false,
        }
    }

    #[tokio::test]
    async fn flush_on_batch_size() {
        let embedder = Arc::new(FakeEmbedder::new(4));
        let mut batcher = EmbeddingBatcher::new(embedder.clone(), 3);

        assert!(batcher.add(chunk(0, "a")).await.unwrap().is_none());
        assert!(batcher.add(chunk(1, "bb")).await.unwrap().is_none());
        assert_eq!(batcher.pending(), 2);

        let embedded = batcher.add(chunk(2, "ccc")).await.unwrap().unwrap();
        assert_eq!(embedded.len(), 3);
        assert_eq!(batcher.pending(), 0);
        assert_eq!(embedder.call_count.load(Ordering::SeqCst), 1);

        // Vectors stay paired with the chunk they were computed from.
        for (c, v) in &embedded {
            assert_eq!(v[0], c.content.chars().count() as f32);
        }
    }

    #[tokio::test]
    async fn manual_flush() {
        let embedder = Arc::new(FakeEmbedder::new(4));
        let mut batcher = EmbeddingBatcher::new(embedder.clone(), 100);

        batcher.add(chunk(0, "a")).await.unwrap();
        batcher.add(chunk(1, "b")).await.unwrap();

        let result = batcher.flush().await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].0.index, 1);
        assert_eq!(batcher.pending(), 0);
    }

    #[tokio::test]
    async fn flush_empty_is_noop() {
        let embedder = Arc::new(FakeEmbedder::new(4));
        let mut batcher = EmbeddingBatcher::new(embedder.clone(), 10);

        let result = batcher.flush().await.unwrap();
        assert!(result.is_empty());
        assert_eq!(embedder.call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_batch_size_is_clamped() {
        let embedder = Arc::new(FakeEmbedder::new(2));
        let mut batcher = EmbeddingBatcher::new(embedder, 0);
        assert_eq!(batcher.batch_size(), 1);
        assert!(batcher.add(chunk(0, "a")).await.unwrap().is_some());
    }
}
