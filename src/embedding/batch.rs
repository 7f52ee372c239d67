/// Batched embedding with per-item fallback
use super::{EmbeddingError, EmbeddingProvider};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Item to be embedded, tagged with the caller's position
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub position: usize,
    pub text: String,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchResult {
    /// (position, vector) for every item that embedded, in input order
    pub embedded: Vec<(usize, Vec<f32>)>,
    /// Positions that could not be embedded
    pub skipped: Vec<usize>,
    pub duration_ms: u64,
}

/// Embeds items in fixed-size batches
///
/// A failing batch is retried one item at a time so a single bad chunk
/// (empty after extraction, tokenizer failure) costs only itself.
pub struct BatchProcessor<'a> {
    provider: &'a dyn EmbeddingProvider,
    batch_size: usize,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn process(&self, items: &[BatchItem]) -> BatchResult {
        let start = Instant::now();
        let mut result = BatchResult::default();

        if items.is_empty() {
            return result;
        }

        info!("Embedding {} items in batches of {}", items.len(), self.batch_size);

        for batch in items.chunks(self.batch_size) {
            match self.embed_batch(batch) {
                Ok(vectors) => {
                    debug!("Embedded batch of {} items", vectors.len());
                    result
                        .embedded
                        .extend(batch.iter().map(|item| item.position).zip(vectors));
                }
                Err(e) => {
                    warn!("Batch embedding failed ({}); retrying items one by one", e);
                    for item in batch {
                        match self.embed_one(item) {
                            Ok(vector) => result.embedded.push((item.position, vector)),
                            Err(e) => {
                                warn!("Skipping item {}: {}", item.position, e);
                                result.skipped.push(item.position);
                            }
                        }
                    }
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Embedding complete: {} embedded, {} skipped, {}ms",
            result.embedded.len(),
            result.skipped.len(),
            result.duration_ms
        );
        result
    }

    fn embed_batch(&self, batch: &[BatchItem]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let texts: Vec<String> = batch.iter().map(|item| item.text.clone()).collect();
        let vectors = self.provider.embed_batch(&texts)?;

        if vectors.len() != batch.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn embed_one(&self, item: &BatchItem) -> Result<Vec<f32>, EmbeddingError> {
        if item.text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        self.provider.embed(&item.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    fn items(texts: &[&str]) -> Vec<BatchItem> {
        texts
            .iter()
            .enumerate()
            .map(|(position, text)| BatchItem {
                position,
                text: text.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_all_items_embedded() {
        let embedder = HashEmbedder::default();
        let processor = BatchProcessor::new(&embedder, 2);

        let result = processor.process(&items(&["offer", "acceptance", "consideration"]));
        assert_eq!(result.embedded.len(), 3);
        assert!(result.skipped.is_empty());
        let positions: Vec<_> = result.embedded.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_bad_item_only_costs_itself() {
        let embedder = HashEmbedder::default();
        let processor = BatchProcessor::new(&embedder, 4);

        let result = processor.process(&items(&["offer", "", "consideration", "§§"]));
        let positions: Vec<_> = result.embedded.iter().map(|(p, _)| *p).collect();
        assert_eq!(positions, vec![0, 2]);
        assert_eq!(result.skipped, vec![1, 3]);
    }

    #[test]
    fn test_empty_input() {
        let embedder = HashEmbedder::default();
        let result = BatchProcessor::new(&embedder, 8).process(&[]);
        assert!(result.embedded.is_empty());
        assert!(result.skipped.is_empty());
    }
}
