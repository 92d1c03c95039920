//! Ingestion pipeline: sources → chunks → batched embeddings → index.

use std::path::Path;
use std::sync::Arc;

use ecrag_core::Chunk;
use ecrag_index::{IndexEntry, VectorIndex};
use ecrag_ingest::document::chunker::Chunker;
use ecrag_ingest::document::{load_source, ExtractionError};
use ecrag_ingest::embedding::{Embedder, EmbeddingBatcher};
use tracing::{error, info, warn};

use crate::error::RagError;

/// Outcome of a successful ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Every chunk added to the index, in ingestion order.
    pub chunks: Vec<Chunk>,
    /// Size of each embedding batch, in the order they were sent.
    pub batch_sizes: Vec<usize>,
}

/// Extract and chunk each source in order. Sources that are missing or fail to
/// extract are logged and skipped.
pub fn collect_chunks<P: AsRef<Path>>(paths: &[P], chunker: &Chunker) -> Vec<Chunk> {
    let mut all = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let doc = match load_source(path) {
            Ok(doc) => doc,
            Err(ExtractionError::NotFound(source)) => {
                warn!(source = %source, "knowledge source not found, skipping");
                continue;
            }
            Err(e) => {
                error!(source = %path.display(), error = %e, "failed to extract knowledge source, skipping");
                continue;
            }
        };
        if doc.is_blank() {
            warn!(
                source = %doc.source,
                pages = doc.pages.len(),
                "document has no extractable text, skipping"
            );
            continue;
        }
        info!(
            source = %doc.source,
            pages = doc.pages.len(),
            chars = doc.total_chars(),
            "loaded document"
        );

        let chunks = chunker.chunk_document(&doc);
        info!(source = %doc.source, chunks = chunks.len(), "chunked document");
        all.extend(chunks);
    }
    all
}

/// Embed `chunks` in batches of `batch_size` and append each batch to `index`
/// as soon as it is embedded. Returns the batch sizes.
///
/// A failed batch aborts the run and removes every entry this call added, so
/// `index` is left as it was before the call.
pub async fn embed_into_index(
    chunks: &[Chunk],
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    index: &mut VectorIndex,
) -> Result<Vec<usize>, RagError> {
    let start = index.len();
    match embed_batches(chunks, embedder, batch_size, index).await {
        Ok(batch_sizes) => Ok(batch_sizes),
        Err(e) => {
            warn!(
                discarded = index.len() - start,
                error = %e,
                "ingestion aborted, rolling back partially added entries"
            );
            index.truncate(start);
            Err(e)
        }
    }
}

async fn embed_batches(
    chunks: &[Chunk],
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    index: &mut VectorIndex,
) -> Result<Vec<usize>, RagError> {
    let total = chunks.len();
    let mut batcher = EmbeddingBatcher::new(embedder, batch_size);
    let mut batch_sizes = Vec::with_capacity(total.div_ceil(batcher.batch_size()));
    let mut done = 0;

    for chunk in chunks {
        if let Some(batch) = batcher.add(chunk.clone()).await? {
            done += add_batch(index, batch, &mut batch_sizes)?;
            info!("ingested {done}/{total}");
        }
    }
    let rest = batcher.flush().await?;
    if !rest.is_empty() {
        done += add_batch(index, rest, &mut batch_sizes)?;
        info!("ingested {done}/{total}");
    }

    Ok(batch_sizes)
}

fn add_batch(
    index: &mut VectorIndex,
    batch: Vec<(Chunk, Vec<f32>)>,
    batch_sizes: &mut Vec<usize>,
) -> Result<usize, RagError> {
    let n = batch.len();
    index.add(
        batch
            .into_iter()
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect(),
    )?;
    batch_sizes.push(n);
    Ok(n)
}

/// Full ingestion run: chunk all sources, embed in batches, then persist the index.
pub async fn load_knowledge<P: AsRef<Path>>(
    paths: &[P],
    chunker: &Chunker,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    index: &mut VectorIndex,
    index_dir: &Path,
) -> Result<IngestReport, RagError> {
    let chunks = collect_chunks(paths, chunker);
    if chunks.is_empty() {
        error!("no knowledge content could be loaded");
        return Err(RagError::EmptyKnowledgeBase);
    }

    let start = index.len();
    let batch_sizes = embed_into_index(&chunks, embedder, batch_size, index).await?;
    if let Err(e) = index.save(index_dir) {
        index.truncate(start);
        return Err(e.into());
    }
    info!(
        chunks = chunks.len(),
        batches = batch_sizes.len(),
        index_entries = index.len(),
        "knowledge base ingestion complete"
    );

    Ok(IngestReport { chunks, batch_sizes })
}
