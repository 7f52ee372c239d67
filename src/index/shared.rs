//! Shared handle over the corpus index and its lexical companion

use super::{CorpusIndex, IndexError};
use crate::chunking::Chunk;
use crate::retrieval::{LexicalRetriever, NoLexical};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

/// Result of adding session documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: usize,
    pub skipped: usize,
}

/// Cloneable handle giving many concurrent readers and one writer
///
/// Queries take read locks. `add` holds the writer mutex for its whole
/// duration, embeds under a read lock (queries keep running) and takes the
/// write locks only to publish, so readers never observe a half-added
/// batch. Both locks are always acquired lexical first.
#[derive(Clone)]
pub struct SharedCorpus {
    index: Arc<RwLock<CorpusIndex>>,
    lexical: Arc<RwLock<Box<dyn LexicalRetriever>>>,
    writer: Arc<Mutex<()>>,
}

impl SharedCorpus {
    /// Wrap an index, feeding every existing chunk to the lexical retriever
    ///
    /// If the lexical retriever cannot be populated it is replaced by
    /// [`NoLexical`] and retrieval continues dense-only.
    pub fn new(index: CorpusIndex, mut lexical: Box<dyn LexicalRetriever>) -> Self {
        if lexical.is_enabled() {
            let entries: Vec<(u64, &str)> = index
                .chunks()
                .map(|(id, chunk)| (id, chunk.text.as_str()))
                .collect();

            if let Err(e) = lexical.index_chunks(&entries) {
                tracing::warn!("Lexical index unavailable, using dense retrieval only: {}", e);
                lexical = Box::new(NoLexical);
            } else {
                tracing::debug!("Lexical index holds {} chunks", entries.len());
            }
        }

        Self {
            index: Arc::new(RwLock::new(index)),
            lexical: Arc::new(RwLock::new(lexical)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Dense-only handle
    pub fn dense_only(index: CorpusIndex) -> Self {
        Self::new(index, Box::new(NoLexical))
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CorpusIndex> {
        self.index.read().await
    }

    pub async fn lexical(&self) -> RwLockReadGuard<'_, Box<dyn LexicalRetriever>> {
        self.lexical.read().await
    }

    /// Append chunks to the live index
    ///
    /// Embedding runs on the blocking pool, off the async workers.
    pub async fn add(&self, chunks: Vec<Chunk>) -> Result<AddReport, IndexError> {
        if chunks.is_empty() {
            return Ok(AddReport::default());
        }

        let _writer = self.writer.lock().await;

        // Embedding is CPU-bound; queries keep their read access meanwhile
        let index = self.index.clone().read_owned().await;
        let prepared = tokio::task::spawn_blocking(move || index.prepare(chunks))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?;
        let skipped = prepared.skipped();
        let texts: Vec<String> = prepared.texts().map(str::to_string).collect();

        // Lock order is lexical before index, everywhere
        let mut lexical = self.lexical.write().await;
        let mut index = self.index.write().await;
        let ids = index.commit(prepared)?;

        if lexical.is_enabled() {
            let entries: Vec<(u64, &str)> = ids
                .iter()
                .copied()
                .zip(texts.iter().map(String::as_str))
                .collect();
            if let Err(e) = lexical.index_chunks(&entries) {
                tracing::warn!("Failed to add session chunks to lexical index: {}", e);
            }
        }

        tracing::info!("Added {} session chunks ({} skipped)", ids.len(), skipped);
        Ok(AddReport {
            added: ids.len(),
            skipped,
        })
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingError, EmbeddingProvider, HashEmbedder};
    use crate::index::IndexParams;
    use std::sync::Mutex;
    use std::thread::ThreadId;
    use tempfile::TempDir;

    /// Hashing embedder that remembers which threads embedded
    struct ThreadRecorder {
        inner: HashEmbedder,
        threads: Mutex<Vec<ThreadId>>,
    }

    impl ThreadRecorder {
        fn record(&self) {
            self.threads.lock().unwrap().push(std::thread::current().id());
        }
    }

    impl EmbeddingProvider for ThreadRecorder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.record();
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.record();
            self.inner.embed_batch(texts)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    #[tokio::test]
    async fn test_add_embeds_off_the_runtime_thread() {
        let temp = TempDir::new().unwrap();
        let recorder = Arc::new(ThreadRecorder {
            inner: HashEmbedder::default(),
            threads: Mutex::new(Vec::new()),
        });
        let index = CorpusIndex::build(
            &temp.path().join("index.sqlite"),
            recorder.clone(),
            IndexParams::default(),
            vec![Chunk::new("Rent is payable monthly in advance.", "lease.txt", 0)],
            None,
        )
        .unwrap();
        recorder.threads.lock().unwrap().clear();

        let corpus = SharedCorpus::dense_only(index);
        let report = corpus
            .add(vec![
                Chunk::new("Estoppel prevents going back on a promise.", "notes.txt", 0),
                Chunk::new("A licence confers no interest in land.", "notes.txt", 1),
            ])
            .await
            .unwrap();

        assert_eq!(report, AddReport { added: 2, skipped: 0 });
        assert_eq!(corpus.len().await, 3);

        let runtime_thread = std::thread::current().id();
        let threads = recorder.threads.lock().unwrap();
        assert!(!threads.is_empty());
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test]
    async fn test_add_nothing_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let index = CorpusIndex::build(
            &temp.path().join("index.sqlite"),
            Arc::new(HashEmbedder::default()),
            IndexParams::default(),
            Vec::new(),
            None,
        )
        .unwrap();

        let corpus = SharedCorpus::dense_only(index);
        assert_eq!(corpus.add(Vec::new()).await.unwrap(), AddReport::default());
        assert!(corpus.is_empty().await);
    }
}
