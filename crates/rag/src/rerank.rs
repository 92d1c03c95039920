//! Re-ranking of retrieved candidates.
//!
//! Scoring goes through [`SimilarityScorer`]. The reference implementation is plain
//! cosine similarity; an unrolled variant is used when it passes a startup probe,
//! with per-call fallback to the reference. Selection is either top-score or
//! maximal marginal relevance.

use ecrag_core::config::RetrievalConfig;
use ecrag_core::{Chunk, ConfigError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::retriever::Candidate;

/// Squared-norm floor below which a vector is treated as zero.
const EPSILON: f32 = 1e-12;

/// Maximum disagreement tolerated between accelerated and reference scores in the probe.
const PROBE_TOLERANCE: f32 = 1e-5;

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    #[error("vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("{scorer} produced a non-finite score")]
    NonFinite { scorer: &'static str },
}

/// A similarity function over two equal-length vectors. Larger is more similar.
pub trait SimilarityScorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError>;
}

fn check_lengths(a: &[f32], b: &[f32]) -> Result<(), ScoreError> {
    if a.len() != b.len() {
        return Err(ScoreError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

fn cosine_from_parts(dot: f32, norm_a_sq: f32, norm_b_sq: f32) -> f32 {
    if norm_a_sq <= EPSILON || norm_b_sq <= EPSILON {
        return 0.0;
    }
    (dot / (norm_a_sq.sqrt() * norm_b_sq.sqrt())).clamp(-1.0, 1.0)
}

/// Canonical cosine similarity. Zero or empty vectors score 0.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineScorer;

impl SimilarityScorer for CosineScorer {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
        check_lengths(a, b)?;
        let mut dot = 0.0f32;
        let mut na = 0.0f32;
        let mut nb = 0.0f32;
        for (x, y) in a.iter().zip(b) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }
        Ok(cosine_from_parts(dot, na, nb))
    }
}

const LANES: usize = 8;

/// Cosine similarity with eight independent accumulators, which the compiler
/// vectorizes. Rejects non-finite results instead of passing them on.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnrolledCosineScorer;

impl SimilarityScorer for UnrolledCosineScorer {
    fn name(&self) -> &'static str {
        "cosine-unrolled"
    }

    fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
        check_lengths(a, b)?;
        let mut dot = [0.0f32; LANES];
        let mut na = [0.0f32; LANES];
        let mut nb = [0.0f32; LANES];

        let ca = a.chunks_exact(LANES);
        let cb = b.chunks_exact(LANES);
        let (ra, rb) = (ca.remainder(), cb.remainder());
        for (xa, xb) in ca.zip(cb) {
            for i in 0..LANES {
                dot[i] += xa[i] * xb[i];
                na[i] += xa[i] * xa[i];
                nb[i] += xb[i] * xb[i];
            }
        }

        let mut dot: f32 = dot.iter().sum();
        let mut na: f32 = na.iter().sum();
        let mut nb: f32 = nb.iter().sum();
        for (x, y) in ra.iter().zip(rb) {
            dot += x * y;
            na += x * x;
            nb += y * y;
        }

        let score = cosine_from_parts(dot, na, nb);
        if !score.is_finite() {
            return Err(ScoreError::NonFinite { scorer: self.name() });
        }
        Ok(score)
    }
}

/// Multiplies another scorer's output by a positive constant. Rank order is unchanged.
pub struct ScaledScorer {
    inner: Box<dyn SimilarityScorer>,
    scale: f32,
}

impl ScaledScorer {
    pub fn new(inner: Box<dyn SimilarityScorer>, scale: f32) -> Result<Self, ConfigError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::invalid(
                "RERANK_SCORE_SCALE",
                format!("must be finite and > 0, got {scale}"),
            ));
        }
        Ok(Self { inner, scale })
    }
}

impl SimilarityScorer for ScaledScorer {
    fn name(&self) -> &'static str {
        "scaled"
    }

    fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
        Ok(self.inner.score(a, b)? * self.scale)
    }
}

/// Fixed probe pair; its length is not a multiple of the lane count so the
/// remainder path is exercised too.
fn probe_pair() -> (Vec<f32>, Vec<f32>) {
    let a = (0..19).map(|i| (i as f32 * 0.37).sin()).collect();
    let b = (0..19).map(|i| (i as f32 * 0.11 + 1.0).cos()).collect();
    (a, b)
}

/// Uses an accelerated scorer when it agrees with the reference on a probe pair,
/// and falls back to the reference per call whenever the accelerated one errors.
pub struct FallbackScorer {
    accelerated: Option<Box<dyn SimilarityScorer>>,
    reference: CosineScorer,
}

impl FallbackScorer {
    pub fn reference_only() -> Self {
        Self {
            accelerated: None,
            reference: CosineScorer,
        }
    }

    /// Probe `accelerated` against the reference; keep it only if it agrees.
    pub fn probe(accelerated: Box<dyn SimilarityScorer>) -> Self {
        let reference = CosineScorer;
        let (a, b) = probe_pair();
        let agreed = match (accelerated.score(&a, &b), reference.score(&a, &b)) {
            (Ok(fast), Ok(slow)) if (fast - slow).abs() <= PROBE_TOLERANCE => true,
            (Ok(fast), Ok(slow)) => {
                warn!(
                    scorer = accelerated.name(),
                    accelerated = fast,
                    reference = slow,
                    "accelerated scorer disagrees with reference, using reference"
                );
                false
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(scorer = accelerated.name(), error = %e, "accelerated scorer probe failed, using reference");
                false
            }
        };
        if agreed {
            debug!(scorer = accelerated.name(), "accelerated scorer enabled");
        }
        Self {
            accelerated: agreed.then_some(accelerated),
            reference,
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated.is_some()
    }
}

impl SimilarityScorer for FallbackScorer {
    fn name(&self) -> &'static str {
        match &self.accelerated {
            Some(fast) => fast.name(),
            None => self.reference.name(),
        }
    }

    fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
        if let Some(fast) = &self.accelerated {
            match fast.score(a, b) {
                Ok(score) => return Ok(score),
                Err(e) => {
                    warn!(scorer = fast.name(), error = %e, "accelerated scoring failed, retrying with reference")
                }
            }
        }
        let score = self.reference.score(a, b)?;
        if !score.is_finite() {
            return Err(ScoreError::NonFinite {
                scorer: self.reference.name(),
            });
        }
        Ok(score)
    }
}

/// Build the scorer described by the retrieval settings.
pub fn build_scorer(cfg: &RetrievalConfig) -> Result<Box<dyn SimilarityScorer>, ConfigError> {
    let base = if cfg.accelerated {
        FallbackScorer::probe(Box::new(UnrolledCosineScorer))
    } else {
        FallbackScorer::reference_only()
    };
    if cfg.score_scale == 1.0 {
        Ok(Box::new(base))
    } else {
        Ok(Box::new(ScaledScorer::new(Box::new(base), cfg.score_scale)?))
    }
}

/// How the final `top_n` chunks are chosen from the scored candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// Highest score first; ties keep retrieval order.
    TopScore,
    /// Maximal marginal relevance. `lambda` = 1.0 is pure relevance.
    Mmr { lambda: f32 },
}

impl Selection {
    pub fn from_config(cfg: &RetrievalConfig) -> Result<Self, ConfigError> {
        match cfg.mode.as_str() {
            "score" => Ok(Selection::TopScore),
            "mmr" => Ok(Selection::Mmr {
                lambda: cfg.mmr_lambda,
            }),
            other => Err(ConfigError::invalid(
                "RERANK_MODE",
                format!("expected 'score' or 'mmr', got '{other}'"),
            )),
        }
    }
}

/// A chunk selected for the answer context.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Re-rank score against the query.
    pub score: f32,
    /// Position in the retrieval result this chunk came from.
    pub retrieval_rank: usize,
}

struct Scored {
    candidate: Candidate,
    score: f32,
}

pub struct Reranker {
    scorer: Box<dyn SimilarityScorer>,
    selection: Selection,
    top_n: usize,
    min_score: Option<f32>,
}

impl Reranker {
    pub fn new(
        scorer: Box<dyn SimilarityScorer>,
        selection: Selection,
        top_n: usize,
        min_score: Option<f32>,
    ) -> Self {
        Self {
            scorer,
            selection,
            top_n,
            min_score,
        }
    }

    pub fn from_config(cfg: &RetrievalConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            build_scorer(cfg)?,
            Selection::from_config(cfg)?,
            cfg.top_n,
            cfg.min_score,
        ))
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Score every candidate against `query` and select at most `top_n`.
    /// Candidates that cannot be scored are logged and dropped.
    pub fn rerank(&self, query: &[f32], candidates: Vec<Candidate>) -> Vec<ScoredChunk> {
        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .filter_map(|candidate| match self.scorer.score(query, &candidate.vector) {
                Ok(score) => Some(Scored { candidate, score }),
                Err(e) => {
                    warn!(
                        chunk = candidate.chunk.index,
                        source = %candidate.chunk.source,
                        error = %e,
                        "dropping candidate that could not be scored"
                    );
                    None
                }
            })
            .collect();

        if let Some(min) = self.min_score {
            scored.retain(|s| s.score >= min);
        }

        let selected = match self.selection {
            Selection::TopScore => {
                scored.sort_by(|a, b| b.score.total_cmp(&a.score));
                scored.truncate(self.top_n);
                scored
            }
            Selection::Mmr { lambda } => self.select_mmr(scored, lambda),
        };

        selected
            .into_iter()
            .map(|s| ScoredChunk {
                retrieval_rank: s.candidate.rank,
                chunk: s.candidate.chunk,
                score: s.score,
            })
            .collect()
    }

    fn pair_similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        self.scorer.score(a, b).unwrap_or_else(|e| {
            warn!(error = %e, "pairwise similarity failed, treating as unrelated");
            0.0
        })
    }

    fn select_mmr(&self, mut pool: Vec<Scored>, lambda: f32) -> Vec<Scored> {
        let mut selected: Vec<Scored> = Vec::with_capacity(self.top_n.min(pool.len()));

        while selected.len() < self.top_n && !pool.is_empty() {
            let mut best: Option<(usize, f32)> = None;
            for (i, cand) in pool.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|s| self.pair_similarity(&cand.candidate.vector, &s.candidate.vector))
                    .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |m| m.max(sim))))
                    .unwrap_or(0.0);
                let value = if selected.is_empty() {
                    cand.score
                } else {
                    lambda * cand.score - (1.0 - lambda) * redundancy
                };
                if best.map_or(true, |(_, v)| value > v) {
                    best = Some((i, value));
                }
            }
            match best {
                Some((i, _)) => selected.push(pool.remove(i)),
                None => break,
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: usize, vector: Vec<f32>) -> Candidate {
        Candidate {
            chunk: Chunk {
                index,
                content: format!("chunk {index}"),
                source: "rules.pdf".into(),
                page_index: 0,
                oversized: false,
            },
            vector,
            distance: index as f32,
            rank: index,
        }
    }

    fn indices(chunks: &[ScoredChunk]) -> Vec<usize> {
        chunks.iter().map(|c| c.chunk.index).collect()
    }

    // ── Scorers ─────────────────────────────────────────────────────

    #[test]
    fn cosine_basics() {
        let s = CosineScorer;
        assert!((s.score(&[1.0, 0.0], &[2.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(s.score(&[1.0, 0.0], &[0.0, 3.0]).unwrap().abs() < 1e-6);
        assert!((s.score(&[1.0, 1.0], &[-1.0, -1.0]).unwrap() + 1.0).abs() < 1e-6);
        assert_eq!(s.score(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert_eq!(s.score(&[], &[]).unwrap(), 0.0);
        assert_eq!(
            s.score(&[1.0], &[1.0, 2.0]),
            Err(ScoreError::LengthMismatch { left: 1, right: 2 })
        );
    }

    #[test]
    fn unrolled_matches_reference() {
        let reference = CosineScorer;
        let fast = UnrolledCosineScorer;
        for len in [1usize, 7, 8, 9, 16, 31, 1024] {
            let a: Vec<f32> = (0..len).map(|i| ((i * 13 % 17) as f32 - 8.0) / 3.0).collect();
            let b: Vec<f32> = (0..len).map(|i| ((i * 5 % 11) as f32 - 4.0) / 2.0).collect();
            let r = reference.score(&a, &b).unwrap();
            let f = fast.score(&a, &b).unwrap();
            assert!((r - f).abs() < 1e-5, "len {len}: {r} vs {f}");
        }
    }

    #[test]
    fn unrolled_rejects_non_finite() {
        let v = [f32::NAN, 1.0, 2.0];
        assert!(matches!(
            UnrolledCosineScorer.score(&v, &[1.0, 1.0, 1.0]),
            Err(ScoreError::NonFinite { .. })
        ));
    }

    #[test]
    fn scale_must_be_positive() {
        assert!(ScaledScorer::new(Box::new(CosineScorer), 0.0).is_err());
        assert!(ScaledScorer::new(Box::new(CosineScorer), -1.2).is_err());
        assert!(ScaledScorer::new(Box::new(CosineScorer), f32::INFINITY).is_err());
        let s = ScaledScorer::new(Box::new(CosineScorer), 1.2).unwrap();
        assert!((s.score(&[1.0], &[1.0]).unwrap() - 1.2).abs() < 1e-6);
    }

    // ── Fallback ────────────────────────────────────────────────────

    struct BrokenScorer;

    impl SimilarityScorer for BrokenScorer {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn score(&self, _: &[f32], _: &[f32]) -> Result<f32, ScoreError> {
            Err(ScoreError::NonFinite { scorer: "broken" })
        }
    }

    /// Agrees with the reference except on vectors containing 42.0.
    struct FlakyScorer;

    impl SimilarityScorer for FlakyScorer {
        fn name(&self) -> &'static str {
            "flaky"
        }
        fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
            if a.contains(&42.0) || b.contains(&42.0) {
                return Err(ScoreError::NonFinite { scorer: "flaky" });
            }
            CosineScorer.score(a, b)
        }
    }

    struct SkewedScorer;

    impl SimilarityScorer for SkewedScorer {
        fn name(&self) -> &'static str {
            "skewed"
        }
        fn score(&self, a: &[f32], b: &[f32]) -> Result<f32, ScoreError> {
            Ok(CosineScorer.score(a, b)? + 0.5)
        }
    }

    #[test]
    fn probe_keeps_a_correct_accelerated_scorer() {
        let s = FallbackScorer::probe(Box::new(UnrolledCosineScorer));
        assert!(s.is_accelerated());
        assert_eq!(s.name(), "cosine-unrolled");
    }

    #[test]
    fn probe_rejects_failing_or_disagreeing_scorers() {
        let broken = FallbackScorer::probe(Box::new(BrokenScorer));
        assert!(!broken.is_accelerated());
        assert_eq!(broken.name(), "cosine");
        assert!((broken.score(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);

        assert!(!FallbackScorer::probe(Box::new(SkewedScorer)).is_accelerated());
    }

    #[test]
    fn call_time_failure_uses_reference() {
        let s = FallbackScorer::probe(Box::new(FlakyScorer));
        assert!(s.is_accelerated());
        let a = [42.0, 0.0];
        let b = [1.0, 0.0];
        assert!((s.score(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unscorable_candidate_is_dropped() {
        let reranker = Reranker::new(
            Box::new(FallbackScorer::probe(Box::new(UnrolledCosineScorer))),
            Selection::TopScore,
            3,
            None,
        );
        let out = reranker.rerank(
            &[1.0, 0.0],
            vec![
                candidate(0, vec![f32::NAN, 0.0]),
                candidate(1, vec![1.0, 0.0]),
                candidate(2, vec![1.0]),
            ],
        );
        assert_eq!(indices(&out), vec![1]);
    }

    // ── Selection ───────────────────────────────────────────────────

    #[test]
    fn top_score_sorts_and_truncates() {
        let reranker = Reranker::new(Box::new(CosineScorer), Selection::TopScore, 2, None);
        let out = reranker.rerank(
            &[1.0, 0.0],
            vec![
                candidate(0, vec![0.0, 1.0]),
                candidate(1, vec![1.0, 0.2]),
                candidate(2, vec![1.0, 0.0]),
            ],
        );
        assert_eq!(indices(&out), vec![2, 1]);
        assert_eq!(out[0].retrieval_rank, 2);
        assert!(out[0].score >= out[1].score);
    }

    #[test]
    fn ties_keep_retrieval_order() {
        let reranker = Reranker::new(Box::new(CosineScorer), Selection::TopScore, 3, None);
        let out = reranker.rerank(
            &[1.0, 0.0],
            vec![
                candidate(0, vec![2.0, 0.0]),
                candidate(1, vec![1.0, 0.0]),
                candidate(2, vec![5.0, 0.0]),
            ],
        );
        assert_eq!(indices(&out), vec![0, 1, 2]);
    }

    #[test]
    fn min_score_filters() {
        let reranker = Reranker::new(Box::new(CosineScorer), Selection::TopScore, 3, Some(0.5));
        let out = reranker.rerank(
            &[1.0, 0.0],
            vec![candidate(0, vec![0.0, 1.0]), candidate(1, vec![1.0, 0.1])],
        );
        assert_eq!(indices(&out), vec![1]);
    }

    #[test]
    fn scaling_preserves_order() {
        let cands = || {
            vec![
                candidate(0, vec![0.3, 1.0]),
                candidate(1, vec![1.0, 0.1]),
                candidate(2, vec![1.0, 0.6]),
                candidate(3, vec![-1.0, 0.0]),
            ]
        };
        let plain = Reranker::new(Box::new(CosineScorer), Selection::TopScore, 4, None)
            .rerank(&[1.0, 0.0], cands());
        let scaled = Reranker::new(
            Box::new(ScaledScorer::new(Box::new(CosineScorer), 1.2).unwrap()),
            Selection::TopScore,
            4,
            None,
        )
        .rerank(&[1.0, 0.0], cands());
        assert_eq!(indices(&plain), indices(&scaled));
        for (p, s) in plain.iter().zip(&scaled) {
            assert!((p.score * 1.2 - s.score).abs() < 1e-6);
        }
    }

    #[test]
    fn mmr_prefers_diverse_second_pick() {
        // 0 and 1 are near-duplicates; 2 is less relevant but different.
        let cands = vec![
            candidate(0, vec![1.0, 0.1, 0.0]),
            candidate(1, vec![1.0, 0.11, 0.0]),
            candidate(2, vec![0.7, 0.0, 0.7]),
        ];
        let mmr = Reranker::new(Box::new(CosineScorer), Selection::Mmr { lambda: 0.5 }, 2, None)
            .rerank(&[1.0, 0.0, 0.0], cands.clone());
        assert_eq!(indices(&mmr), vec![0, 2]);

        let greedy = Reranker::new(Box::new(CosineScorer), Selection::TopScore, 2, None)
            .rerank(&[1.0, 0.0, 0.0], cands);
        assert_eq!(indices(&greedy), vec![0, 1]);
    }

    #[test]
    fn mmr_with_lambda_one_is_relevance_order() {
        let cands = vec![
            candidate(0, vec![0.5, 0.5]),
            candidate(1, vec![1.0, 0.0]),
            candidate(2, vec![0.9, 0.1]),
        ];
        let out = Reranker::new(Box::new(CosineScorer), Selection::Mmr { lambda: 1.0 }, 3, None)
            .rerank(&[1.0, 0.0], cands);
        assert_eq!(indices(&out), vec![1, 2, 0]);
    }

    #[test]
    fn selection_from_config() {
        let mut cfg = RetrievalConfig::default();
        assert_eq!(Selection::from_config(&cfg).unwrap(), Selection::TopScore);
        cfg.mode = "mmr".into();
        cfg.mmr_lambda = 0.3;
        assert_eq!(
            Selection::from_config(&cfg).unwrap(),
            Selection::Mmr { lambda: 0.3 }
        );
        cfg.mode = "random".into();
        assert!(Selection::from_config(&cfg).is_err());
    }

    #[test]
    fn never_more_than_top_n() {
        let cands: Vec<Candidate> = (0..10).map(|i| candidate(i, vec![1.0, i as f32])).collect();
        for selection in [Selection::TopScore, Selection::Mmr { lambda: 0.5 }] {
            let out = Reranker::new(Box::new(CosineScorer), selection, 3, None)
                .rerank(&[1.0, 0.0], cands.clone());
            assert_eq!(out.len(), 3);
        }
    }
}
