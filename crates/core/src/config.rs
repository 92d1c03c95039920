use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::document::OversizePolicy;
use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f32(profile: &str, key: &str, default: f32) -> f32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            storage: StorageConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            ollama: OllamaConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ECRAG_PROFILE`. When set (e.g. `PROD`), every key is
    /// first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ECRAG_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p),
            chunking: ChunkingConfig::from_env_profiled(p),
            embedding: EmbeddingConfig::from_env_profiled(p),
            retrieval: RetrievalConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            http: HttpConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Check cross-field constraints. Anything rejected here would otherwise surface as
    /// a silently wrong pipeline (oversized batches, inverted ranking, empty top-N).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        self.retrieval.validate()?;
        self.llm.validate()?;
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("REQUEST_TIMEOUT_SECS", "must be > 0"));
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:    index_dir={}", self.storage.index_dir.display());
        tracing::info!(
            "  chunking:   size={}, overlap={}, oversize={}, parallel={}",
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
            self.chunking.oversize_policy,
            self.chunking.parallel
        );
        tracing::info!(
            "  embedding:  provider={}, model={}, dims={}, batch={}/{}",
            self.embedding.provider,
            self.embedding.resolved_model(&self.ollama),
            self.embedding.dimensions,
            self.embedding.batch_size,
            self.embedding.max_batch
        );
        tracing::info!(
            "  retrieval:  fetch_k={}, top_n={}, mode={}, scale={}",
            self.retrieval.fetch_k,
            self.retrieval.top_n,
            self.retrieval.mode,
            self.retrieval.score_scale
        );
        tracing::info!(
            "  llm:        provider={}, configured={}",
            self.llm.provider,
            self.llm.is_configured()
        );
    }

    /// Return a redacted view safe to print (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "storage": { "index_dir": self.storage.index_dir },
            "chunking": {
                "chunk_size": self.chunking.chunk_size,
                "chunk_overlap": self.chunking.chunk_overlap,
                "oversize_policy": self.chunking.oversize_policy.to_string(),
                "parallel": self.chunking.parallel,
            },
            "embedding": {
                "provider": self.embedding.provider,
                "model": self.embedding.resolved_model(&self.ollama),
                "dimensions": self.embedding.dimensions,
                "batch_size": self.embedding.batch_size,
                "max_batch": self.embedding.max_batch,
            },
            "retrieval": {
                "fetch_k": self.retrieval.fetch_k,
                "top_n": self.retrieval.top_n,
                "mode": self.retrieval.mode,
                "score_scale": self.retrieval.score_scale,
            },
            "llm": {
                "provider": self.llm.provider,
                "configured": self.llm.is_configured(),
            },
        })
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Directory holding the persisted vector index. Absent on first run.
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("data/knowledge_index"),
        }
    }
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        let data_dir = PathBuf::from(profiled_env_or(p, "DATA_DIR", "data"));
        let index_dir = profiled_env_opt(p, "INDEX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("knowledge_index"));
        Self { data_dir, index_dir }
    }
}

// ── Chunking ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    pub oversize_policy: OversizePolicy,
    /// Chunk pages on a rayon pool instead of sequentially.
    pub parallel: bool,
    /// Worker threads for the parallel backend (0 = rayon default).
    pub threads: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            oversize_policy: OversizePolicy::HardSplit,
            parallel: true,
            threads: 0,
        }
    }
}

impl ChunkingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        let oversize_policy = profiled_env_opt(p, "CHUNK_OVERSIZE_POLICY")
            .and_then(|v| match v.parse() {
                Ok(policy) => Some(policy),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring CHUNK_OVERSIZE_POLICY, using default");
                    None
                }
            })
            .unwrap_or(defaults.oversize_policy);
        Self {
            chunk_size: profiled_env_usize(p, "CHUNK_SIZE", defaults.chunk_size),
            chunk_overlap: profiled_env_usize(p, "CHUNK_OVERLAP", defaults.chunk_overlap),
            oversize_policy,
            parallel: profiled_env_bool(p, "CHUNK_PARALLEL", defaults.parallel),
            threads: profiled_env_usize(p, "CHUNK_THREADS", defaults.threads),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("CHUNK_SIZE", "must be > 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::invalid(
                "CHUNK_OVERLAP",
                format!(
                    "overlap {} must be smaller than chunk size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            ));
        }
        Ok(())
    }
}

// ── Embedding ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "zhipu", "openai", "ollama"
    pub provider: String,
    /// Model override; provider default when unset.
    pub model: Option<String>,
    /// Fixed vector dimensionality for every stored and compared vector.
    pub dimensions: usize,
    /// Hard per-call item limit imposed by the provider.
    pub max_batch: usize,
    /// Items sent per ingestion call; must stay strictly below `max_batch`.
    pub batch_size: usize,
    /// Query embeddings kept in the LRU cache.
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "zhipu".to_string(),
            model: None,
            dimensions: 1024,
            max_batch: 64,
            batch_size: 60,
            cache_size: 256,
        }
    }
}

impl EmbeddingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            provider: profiled_env_or(p, "EMBEDDING_PROVIDER", &defaults.provider),
            model: profiled_env_opt(p, "EMBEDDING_MODEL"),
            dimensions: profiled_env_usize(p, "EMBEDDING_DIMENSIONS", defaults.dimensions),
            max_batch: profiled_env_usize(p, "EMBEDDING_MAX_BATCH", defaults.max_batch),
            batch_size: profiled_env_usize(p, "INGEST_BATCH_SIZE", defaults.batch_size),
            cache_size: profiled_env_usize(p, "EMBEDDING_CACHE_SIZE", defaults.cache_size),
        }
    }

    /// Model name to request, falling back to the provider's default.
    pub fn resolved_model(&self, ollama: &OllamaConfig) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small".to_string(),
            "ollama" => ollama.embedding_model.clone(),
            _ => "embedding-2".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.provider.as_str(), "zhipu" | "openai" | "ollama") {
            return Err(ConfigError::invalid(
                "EMBEDDING_PROVIDER",
                format!("unknown provider '{}'", self.provider),
            ));
        }
        if self.dimensions == 0 {
            return Err(ConfigError::invalid("EMBEDDING_DIMENSIONS", "must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("INGEST_BATCH_SIZE", "must be > 0"));
        }
        if self.batch_size >= self.max_batch {
            return Err(ConfigError::invalid(
                "INGEST_BATCH_SIZE",
                format!(
                    "batch size {} must be strictly below the provider limit {}",
                    self.batch_size, self.max_batch
                ),
            ));
        }
        Ok(())
    }
}

// ── Retrieval / re-ranking ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index before re-ranking.
    pub fetch_k: usize,
    /// Chunks kept after re-ranking.
    pub top_n: usize,
    /// "score" (top-N by re-rank score) or "mmr".
    pub mode: String,
    /// Relevance/diversity trade-off for MMR (1.0 = pure relevance).
    pub mmr_lambda: f32,
    /// Candidates scoring below this are dropped before selection.
    pub min_score: Option<f32>,
    /// Constant multiplier applied to re-rank scores. Must be > 0.
    pub score_scale: f32,
    /// Probe and use the unrolled cosine scorer.
    pub accelerated: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_k: 10,
            top_n: 3,
            mode: "score".to_string(),
            mmr_lambda: 0.5,
            min_score: None,
            score_scale: 1.0,
            accelerated: true,
        }
    }
}

impl RetrievalConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            fetch_k: profiled_env_usize(p, "FETCH_K", defaults.fetch_k),
            top_n: profiled_env_usize(p, "TOP_N", defaults.top_n),
            mode: profiled_env_or(p, "RERANK_MODE", &defaults.mode).to_lowercase(),
            mmr_lambda: profiled_env_f32(p, "MMR_LAMBDA", defaults.mmr_lambda),
            min_score: profiled_env_opt(p, "RERANK_MIN_SCORE").and_then(|v| v.parse().ok()),
            score_scale: profiled_env_f32(p, "RERANK_SCORE_SCALE", defaults.score_scale),
            accelerated: profiled_env_bool(p, "RERANK_ACCELERATED", defaults.accelerated),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n == 0 {
            return Err(ConfigError::invalid("TOP_N", "must be > 0"));
        }
        if self.fetch_k <= self.top_n {
            return Err(ConfigError::invalid(
                "FETCH_K",
                format!("fetch_k {} must exceed top_n {}", self.fetch_k, self.top_n),
            ));
        }
        if !matches!(self.mode.as_str(), "score" | "mmr") {
            return Err(ConfigError::invalid(
                "RERANK_MODE",
                format!("expected 'score' or 'mmr', got '{}'", self.mode),
            ));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(ConfigError::invalid("MMR_LAMBDA", "must be within [0, 1]"));
        }
        // A non-positive multiplier would flip or flatten the ranking.
        if !self.score_scale.is_finite() || self.score_scale <= 0.0 {
            return Err(ConfigError::invalid(
                "RERANK_SCORE_SCALE",
                format!("must be finite and > 0, got {}", self.score_scale),
            ));
        }
        Ok(())
    }
}

// ── LLM ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "zhipu", "openai", "anthropic", "ollama"
    pub provider: String,
    pub zhipu_api_key: Option<String>,
    pub zhipu_model: String,
    pub zhipu_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "zhipu".to_string(),
            zhipu_api_key: None,
            zhipu_model: "glm-4-flash".to_string(),
            zhipu_base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-5-20250929".to_string(),
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", &defaults.provider),
            zhipu_api_key: profiled_env_opt(p, "ZHIPU_API_KEY"),
            zhipu_model: profiled_env_or(p, "ZHIPU_MODEL", &defaults.zhipu_model),
            zhipu_base_url: profiled_env_or(p, "ZHIPU_BASE_URL", &defaults.zhipu_base_url),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", &defaults.openai_model),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", &defaults.anthropic_model),
            temperature: profiled_env_f32(p, "LLM_TEMPERATURE", defaults.temperature),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", defaults.max_tokens),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "zhipu" => self.zhipu_api_key.is_some(),
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.provider.as_str(),
            "zhipu" | "openai" | "anthropic" | "claude" | "ollama"
        ) {
            return Err(ConfigError::invalid(
                "LLM_PROVIDER",
                format!("unknown provider '{}'", self.provider),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("LLM_MAX_TOKENS", "must be > 0"));
        }
        Ok(())
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub embedding_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "qwen2.5".to_string(),
            embedding_model: "bge-m3".to_string(),
        }
    }
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", &defaults.url),
            model: profiled_env_or(p, "OLLAMA_MODEL", &defaults.model),
            embedding_model: profiled_env_or(
                p,
                "OLLAMA_EMBEDDING_MODEL",
                &defaults.embedding_model,
            ),
        }
    }
}

// ── HTTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for embedding and generation calls.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
        }
    }
}

impl HttpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            request_timeout_secs: profiled_env_opt(p, "REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(Self::default().request_timeout_secs),
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
