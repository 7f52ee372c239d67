//! Lexical retrieval capability

use crate::embedding::{KeywordIndex, KeywordIndexError};

/// Keyword retriever consulted alongside the dense index
///
/// Selected once at startup; [`NoLexical`] keeps the hybrid path
/// unconditional when keyword search is disabled or unavailable.
pub trait LexicalRetriever: Send + Sync {
    /// Make chunks searchable under their corpus ids
    fn index_chunks(&mut self, entries: &[(u64, &str)]) -> Result<(), KeywordIndexError>;

    /// Up to `k` (id, score) pairs, best first
    fn query(&self, text: &str, k: usize) -> Result<Vec<(u64, f32)>, KeywordIndexError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

impl LexicalRetriever for KeywordIndex {
    fn index_chunks(&mut self, entries: &[(u64, &str)]) -> Result<(), KeywordIndexError> {
        self.insert_batch(entries.iter().copied())?;
        self.commit()
    }

    fn query(&self, text: &str, k: usize) -> Result<Vec<(u64, f32)>, KeywordIndexError> {
        Ok(self
            .search(text, k)?
            .into_iter()
            .map(|hit| (hit.id, hit.score))
            .collect())
    }
}

/// Lexical retrieval switched off
pub struct NoLexical;

impl LexicalRetriever for NoLexical {
    fn index_chunks(&mut self, _entries: &[(u64, &str)]) -> Result<(), KeywordIndexError> {
        Ok(())
    }

    fn query(&self, _text: &str, _k: usize) -> Result<Vec<(u64, f32)>, KeywordIndexError> {
        Ok(Vec::new())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
