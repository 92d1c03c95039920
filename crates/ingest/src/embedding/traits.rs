use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch { sent: usize, received: usize },

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Trait for embedding backends (Zhipu, OpenAI, Ollama, ...).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input text (in order).
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                sent: 1,
                received: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }

    /// The dimensionality of the output vectors.
    fn dimensions(&self) -> usize;
}

/// Reject a provider response that does not line up with the request.
pub(crate) fn check_response(
    vectors: &[Vec<f32>],
    sent: usize,
    expected_dims: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != sent {
        return Err(EmbeddingError::CountMismatch {
            sent,
            received: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dims) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: expected_dims,
            actual: bad.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_checks() {
        let ok = vec![vec![0.0; 4], vec![1.0; 4]];
        assert!(check_response(&ok, 2, 4).is_ok());
        assert!(matches!(
            check_response(&ok, 3, 4),
            Err(EmbeddingError::CountMismatch { sent: 3, received: 2 })
        ));
        assert!(matches!(
            check_response(&ok, 2, 8),
            Err(EmbeddingError::DimensionMismatch { expected: 8, actual: 4 })
        ));
    }
}
