//! Chunk configuration.

use ecrag_core::config::ChunkingConfig;
use ecrag_core::OversizePolicy;

/// Separators tried in priority order: paragraph break, line break, sentence-ending
/// punctuation, then clause punctuation.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", "。", "！", "？", "，", "、"];

// ── Configuration ───────────────────────────────────────────────────────────

/// Configuration for the chunking engine. Sizes are in characters.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk (default: 500).
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks (default: 50).
    pub chunk_overlap: usize,
    /// Separators in priority order, coarsest first.
    pub separators: Vec<String>,
    /// Handling of a piece that no separator can bring under `chunk_size`.
    pub oversize: OversizePolicy,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            oversize: OversizePolicy::HardSplit,
        }
    }
}

impl From<&ChunkingConfig> for ChunkConfig {
    fn from(cfg: &ChunkingConfig) -> Self {
        Self {
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
            oversize: cfg.oversize_policy,
            ..Self::default()
        }
    }
}
