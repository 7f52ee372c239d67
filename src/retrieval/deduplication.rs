//! Result deduplication by content identity

use crate::retrieval::ScoredChunk;
use ahash::AHashSet;

/// Drop repeated chunks, keeping the first occurrence
///
/// Two hits are the same chunk when they share source file and text, even
/// under different ids (a session upload of a file already in the corpus).
pub fn deduplicate_chunks(chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut seen: AHashSet<(String, String)> = AHashSet::with_capacity(chunks.len());

    chunks
        .into_iter()
        .filter(|hit| seen.insert((hit.chunk.source_file.clone(), hit.chunk.text.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;

    fn hit(id: u64, source: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            id,
            chunk: Chunk::new(text, source, 0),
            score,
        }
    }

    #[test]
    fn test_deduplication_keeps_first() {
        let deduped = deduplicate_chunks(vec![
            hit(1, "a.txt", "text1", 0.9),
            hit(2, "a.txt", "text2", 0.8),
            hit(7, "a.txt", "text1", 0.7),
        ]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, 1);
        assert_eq!(deduped[0].score, 0.9);
    }

    #[test]
    fn test_same_text_different_source_is_kept() {
        let deduped = deduplicate_chunks(vec![
            hit(1, "a.txt", "shared clause", 0.9),
            hit(2, "b.txt", "shared clause", 0.8),
        ]);
        assert_eq!(deduped.len(), 2);
    }
}
