//! Hybrid retrieval and reranking
//!
//! Dense and lexical candidates are fused with weighted Reciprocal Rank
//! Fusion, narrowed by an optional focus filter, then reordered by a
//! cross-encoder (or passed through when none is available).

mod deduplication;
mod fusion;
mod hybrid;
mod lexical;
mod reranker;

pub use deduplication::deduplicate_chunks;
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use hybrid::HybridRetriever;
pub use lexical::{LexicalRetriever, NoLexical};
pub use reranker::{
    load_reranker, order_by_scores, CrossEncoderReranker, PassThroughReranker, RerankError,
    Reranker,
};

use crate::chunking::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a focus filter narrows retrieval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusMode {
    /// Focus files first, then the rest of the corpus
    #[default]
    Prioritize,
    /// Focus files only
    Restrict,
}

/// Retrieval request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub text: String,
    /// Source file names; empty means the whole corpus
    #[serde(default)]
    pub focus_filter: BTreeSet<String>,
    #[serde(default)]
    pub focus_mode: FocusMode,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn focus(
        mut self,
        files: impl IntoIterator<Item = impl Into<String>>,
        mode: FocusMode,
    ) -> Self {
        self.focus_filter = files.into_iter().map(Into::into).collect();
        self.focus_mode = mode;
        self
    }
}

/// A chunk with its id in the corpus index and a stage-specific score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: u64,
    pub chunk: Chunk,
    pub score: f32,
}
