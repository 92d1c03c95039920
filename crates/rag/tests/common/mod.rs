#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ecrag_core::Config;
use ecrag_ingest::embedding::{Embedder, EmbeddingError};
use ecrag_llm::{LlmError, LlmProvider, Message};

pub const DIMS: usize = 32;

/// Bag-of-characters embedder: each char bumps one of `dims` buckets.
/// Texts sharing characters land close together, which is enough for retrieval tests.
pub struct CharBagEmbedder {
    pub dims: usize,
    pub batches: Mutex<Vec<usize>>,
    /// 0-based call number that fails with a rate-limit error, if any.
    pub fail_on_call: Mutex<Option<usize>>,
}

impl CharBagEmbedder {
    pub fn new(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            dims,
            batches: Mutex::new(Vec::new()),
            fail_on_call: Mutex::new(None),
        })
    }

    pub fn failing_on(dims: usize, call: usize) -> Arc<Self> {
        let embedder = Self::new(dims);
        *embedder.fail_on_call.lock().unwrap() = Some(call);
        embedder
    }

    pub fn recover(&self) {
        *self.fail_on_call.lock().unwrap() = None;
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dims];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            v[c as usize % self.dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for CharBagEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut batches = self.batches.lock().unwrap();
        if *self.fail_on_call.lock().unwrap() == Some(batches.len()) {
            return Err(EmbeddingError::Api("429: rate limited".into()));
        }
        batches.push(texts.len());
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Records every prompt and replies with a fixed answer or a fixed error.
pub struct RecordingLlm {
    pub reply: Result<String, String>,
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub calls: Arc<AtomicUsize>,
}

pub struct LlmProbe {
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub calls: Arc<AtomicUsize>,
}

impl LlmProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl RecordingLlm {
    pub fn replying(reply: &str) -> (Box<dyn LlmProvider>, LlmProbe) {
        Self::build(Ok(reply.to_string()))
    }

    pub fn failing(reason: &str) -> (Box<dyn LlmProvider>, LlmProbe) {
        Self::build(Err(reason.to_string()))
    }

    fn build(reply: Result<String, String>) -> (Box<dyn LlmProvider>, LlmProbe) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let llm = Self {
            reply,
            prompts: prompts.clone(),
            calls: calls.clone(),
        };
        (Box::new(llm), LlmProbe { prompts, calls })
    }
}

#[async_trait]
impl LlmProvider for RecordingLlm {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(reason) => Err(LlmError::ParseError(reason.clone())),
        }
    }
}

/// Test config rooted at `index_dir`, independent of the process environment.
pub fn test_config(index_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.index_dir = index_dir.to_path_buf();
    config.embedding.dimensions = DIMS;
    config.chunking.chunk_size = 60;
    config.chunking.chunk_overlap = 10;
    config.chunking.parallel = false;
    config
}

pub fn write_source(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

pub const RETURNS_POLICY: &str = "退货政策：买家可在收货后三十天内申请无理由退货。\n\
退货运费由买家承担，质量问题除外。\n\n\
Refund timing: refunds are issued within five business days after the return is received.";

pub const SHIPPING_POLICY: &str = "物流说明：FBA 配送费按商品尺寸和重量分段计算。\n\
超大件商品收取额外附加费。\n\n\
Customs: sellers must declare the HS code for every shipment.";
