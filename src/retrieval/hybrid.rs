//! Hybrid search combining dense and lexical retrieval

use crate::config::RetrievalConfig;
use crate::index::{IndexError, SharedCorpus};
use crate::retrieval::{
    deduplicate_chunks, reciprocal_rank_fusion, FocusMode, FusionConfig, FusionError,
    RetrievalQuery, ScoredChunk,
};
use std::collections::BTreeSet;

/// Lexical hits are over-fetched when post-filtering by source
const FILTER_WIDENING: usize = 4;

/// Hybrid retriever over the shared corpus
///
/// Always queries the dense index. The lexical retriever joins through
/// weighted RRF when enabled; if it fails the query degrades to dense-only.
#[derive(Clone)]
pub struct HybridRetriever {
    corpus: SharedCorpus,
    fusion: FusionConfig,
    first_k: usize,
}

impl HybridRetriever {
    pub fn new(corpus: SharedCorpus, fusion: FusionConfig, first_k: usize) -> Self {
        Self {
            corpus,
            fusion,
            first_k,
        }
    }

    pub fn from_config(corpus: SharedCorpus, config: &RetrievalConfig) -> Result<Self, FusionError> {
        let fusion = FusionConfig::new(config.rrf_k, config.dense_weight, config.lexical_weight)?;
        Ok(Self::new(corpus, fusion, config.first_k))
    }

    pub fn corpus(&self) -> &SharedCorpus {
        &self.corpus
    }

    pub fn first_k(&self) -> usize {
        self.first_k
    }

    /// Candidates for the reranker at the configured width
    pub async fn retrieve_candidates(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.retrieve(query, self.first_k).await
    }

    /// Up to `k` chunks per retrieval pass, best first
    ///
    /// With a `Restrict` focus every hit comes from a focus file. With
    /// `Prioritize`, focus-file hits come first, followed by whole-corpus
    /// hits not already present, so the list may hold up to `2k` chunks.
    pub async fn retrieve(
        &self,
        query: &RetrievalQuery,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let text = query.text.trim();
        if text.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query.focus_filter.is_empty() {
            return self.search(text, k, None).await;
        }

        let filter = &query.focus_filter;
        match query.focus_mode {
            FocusMode::Restrict => {
                let hits = self.search(text, k, Some(filter)).await?;
                Ok(hits
                    .into_iter()
                    .filter(|hit| filter.contains(&hit.chunk.source_file))
                    .collect())
            }
            FocusMode::Prioritize => {
                let mut combined = self.search(text, k, Some(filter)).await?;
                combined.extend(self.search(text, k, None).await?);
                Ok(deduplicate_chunks(combined))
            }
        }
    }

    async fn search(
        &self,
        text: &str,
        k: usize,
        filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        // Lock order is lexical before index; the lexical guard is released
        // before the index is read
        let lexical_hits = {
            let lexical = self.corpus.lexical().await;
            if lexical.is_enabled() {
                let width = if filter.is_some() { k * FILTER_WIDENING } else { k };
                match lexical.query(text, width) {
                    Ok(hits) => hits,
                    Err(e) => {
                        tracing::warn!("Lexical retrieval failed, using dense results only: {}", e);
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            }
        };

        let index = self.corpus.read().await;
        let dense = index.query(text, k, filter)?;

        let lexical_ids: Vec<u64> = lexical_hits
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| match (filter, index.chunk(*id)) {
                (_, None) => false,
                (None, Some(_)) => true,
                (Some(sources), Some(chunk)) => sources.contains(&chunk.source_file),
            })
            .take(k)
            .collect();

        tracing::debug!(
            "Retrieved {} dense and {} lexical candidates (filtered: {})",
            dense.len(),
            lexical_ids.len(),
            filter.is_some()
        );

        if lexical_ids.is_empty() {
            return Ok(dense);
        }

        let dense_ids: Vec<u64> = dense.iter().map(|hit| hit.id).collect();
        let fused = reciprocal_rank_fusion(&dense_ids, &lexical_ids, &self.fusion);

        Ok(fused
            .into_iter()
            .take(k)
            .filter_map(|(id, score)| {
                index.chunk(id).map(|chunk| ScoredChunk {
                    id,
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect())
    }
}
