//! Cross-encoder reranking using FastEmbed

use crate::config::RerankingConfig;
use crate::retrieval::ScoredChunk;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Unsupported reranker model: {0}")]
    UnsupportedModel(String),
}

/// Reorders hybrid candidates and truncates them to the final width
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, final_k: usize)
        -> Vec<ScoredChunk>;

    fn name(&self) -> &str;
}

/// Keeps the hybrid order and takes the first `final_k`
pub struct PassThroughReranker;

impl Reranker for PassThroughReranker {
    fn rerank(
        &self,
        _query: &str,
        mut candidates: Vec<ScoredChunk>,
        final_k: usize,
    ) -> Vec<ScoredChunk> {
        candidates.truncate(final_k);
        candidates
    }

    fn name(&self) -> &str {
        "pass-through"
    }
}

/// Cross-encoder reranker for improving result precision
pub struct CrossEncoderReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl CrossEncoderReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "BAAI/bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        tracing::info!("Initializing reranker model: {}", model_name);

        let model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "jinaai/jina-reranker-v1-turbo-en" | "jina-reranker-v1-turbo-en" => {
                RerankerModel::JINARerankerV1TurboEn
            }
            other => return Err(RerankError::UnsupportedModel(other.to_string())),
        };

        let init_options = RerankInitOptions::new(model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    /// One relevance score per candidate, in candidate order
    pub fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let results = self
            .model
            .rerank(query, documents.to_vec(), false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        let mut scores = vec![f32::NEG_INFINITY; documents.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }
}

impl Reranker for CrossEncoderReranker {
    fn rerank(&self, query: &str, candidates: Vec<ScoredChunk>, final_k: usize) -> Vec<ScoredChunk> {
        if candidates.is_empty() {
            return candidates;
        }

        let documents: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        match self.score(query, &documents) {
            Ok(scores) => order_by_scores(candidates, &scores, final_k),
            Err(e) => {
                tracing::warn!("Reranking failed, keeping hybrid order: {}", e);
                PassThroughReranker.rerank(query, candidates, final_k)
            }
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

/// Sort candidates by descending score and keep `final_k`
///
/// The sort is stable, so equal scores keep the incoming order. Each
/// candidate's score is replaced by its reranker score.
pub fn order_by_scores(
    candidates: Vec<ScoredChunk>,
    scores: &[f32],
    final_k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .zip(scores.iter().copied())
        .map(|(mut candidate, score)| {
            candidate.score = score;
            candidate
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(final_k);
    scored
}

/// Select the reranker once for the process lifetime
///
/// A model that fails to load degrades to [`PassThroughReranker`].
pub fn load_reranker(config: &RerankingConfig) -> Arc<dyn Reranker> {
    if !config.enabled {
        tracing::info!("Reranking disabled; keeping hybrid order");
        return Arc::new(PassThroughReranker);
    }

    match CrossEncoderReranker::new(&config.model) {
        Ok(reranker) => Arc::new(reranker),
        Err(e) => {
            tracing::warn!("Reranker unavailable, keeping hybrid order: {}", e);
            Arc::new(PassThroughReranker)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;

    fn candidates(n: usize) -> Vec<ScoredChunk> {
        (0..n)
            .map(|i| ScoredChunk {
                id: i as u64,
                chunk: Chunk::new(format!("candidate {}", i), "a.txt", i),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    fn ids(chunks: &[ScoredChunk]) -> Vec<u64> {
        chunks.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_pass_through_truncates_in_order() {
        let out = PassThroughReranker.rerank("q", candidates(6), 4);
        assert_eq!(ids(&out), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_pass_through_short_list() {
        let out = PassThroughReranker.rerank("q", candidates(2), 4);
        assert_eq!(ids(&out), vec![0, 1]);
        assert!(PassThroughReranker.rerank("q", Vec::new(), 4).is_empty());
    }

    #[test]
    fn test_order_by_scores_is_stable() {
        let out = order_by_scores(candidates(4), &[0.2, 0.9, 0.2, 0.5], 3);
        assert_eq!(ids(&out), vec![1, 3, 0]);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn test_disabled_config_passes_through() {
        let config = RerankingConfig {
            enabled: false,
            model: "BAAI/bge-reranker-base".to_string(),
        };
        assert_eq!(load_reranker(&config).name(), "pass-through");
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let config = RerankingConfig {
            enabled: true,
            model: "no-such/reranker".to_string(),
        };
        assert_eq!(load_reranker(&config).name(), "pass-through");
    }

    #[test]
    #[ignore] // Requires model download
    fn test_cross_encoder_prefers_relevant_text() {
        let reranker = CrossEncoderReranker::new("BAAI/bge-reranker-base").unwrap();
        let mut pool = candidates(2);
        pool[0].chunk.text = "Bananas are yellow fruit.".to_string();
        pool[1].chunk.text = "The duty of care was established in Donoghue v Stevenson.".to_string();

        let out = reranker.rerank("what created the duty of care?", pool, 1);
        assert_eq!(out[0].id, 1);
    }
}
