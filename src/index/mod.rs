//! Corpus index: chunk store plus dense vector search
//!
//! Built once from the corpus, persisted to SQLite (chunks, vectors, build
//! metadata) and reloaded on later starts without re-embedding. Documents
//! uploaded during a session are added in memory only and never reach the
//! persisted file.

mod shared;
mod store;

pub use shared::{AddReport, SharedCorpus};
pub use store::{IndexMeta, IndexStore, StoredChunk};

use crate::chunking::Chunk;
use crate::config::Config;
use crate::embedding::{
    BatchItem, BatchProcessor, EmbeddingError, EmbeddingProvider, KeywordIndexError, VectorIndex,
    VectorIndexError,
};
use crate::retrieval::ScoredChunk;
use crate::storage::{Journal, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index error: {0}")]
    Vector(#[from] VectorIndexError),

    #[error("Keyword index error: {0}")]
    Keyword(#[from] KeywordIndexError),

    #[error(
        "Index was built with embedding model '{stored}' but '{configured}' is configured; run `lexground index rebuild`"
    )]
    ModelMismatch { stored: String, configured: String },

    #[error("Index is corrupt: {0}")]
    Corrupt(String),

    #[error("Index task failed: {0}")]
    Task(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

/// Freshness of the persisted index relative to the corpus directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    /// No index file
    Missing,
    /// Built from the current corpus with the configured model
    Fresh { chunks: usize, built_at: String },
    /// Corpus files changed since the build
    Stale { chunks: usize, built_at: String },
    /// Built with a different embedding model
    ModelChanged { stored: String },
}

/// Build and search parameters
#[derive(Debug, Clone)]
pub struct IndexParams {
    pub batch_size: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl IndexParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.embedding.batch_size,
            hnsw_m: config.indexing.hnsw_m,
            hnsw_ef_construction: config.indexing.hnsw_ef_construction,
            hnsw_ef_search: config.indexing.hnsw_ef_search,
        }
    }
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            batch_size: 32,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
        }
    }
}

/// Chunks embedded but not yet visible to queries
pub struct PreparedChunks {
    rows: Vec<(Chunk, Vec<f32>)>,
    skipped: usize,
}

impl PreparedChunks {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|(chunk, _)| chunk.text.as_str())
    }
}

/// Dense index over the corpus chunks
///
/// Chunk ids are dense: the id of a chunk is its position in `chunks`.
pub struct CorpusIndex {
    chunks: Vec<Chunk>,
    by_source: BTreeMap<String, Vec<u64>>,
    vectors: VectorIndex,
    provider: Arc<dyn EmbeddingProvider>,
    params: IndexParams,
    meta: IndexMeta,
    session_chunks: usize,
}

impl CorpusIndex {
    /// Load the index at `path` if one exists, otherwise build it from the
    /// chunks produced by `chunks` and persist it
    ///
    /// `chunks` is only invoked when a build is needed. A loaded index is
    /// trusted as-is; use [`status`](Self::status) to detect staleness.
    pub fn build_or_load<F>(
        path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        params: IndexParams,
        corpus_fingerprint: Option<String>,
        chunks: F,
    ) -> Result<Self, IndexError>
    where
        F: FnOnce() -> Vec<Chunk>,
    {
        if Self::exists(path) {
            Self::load(path, provider, params)
        } else {
            Self::build(path, provider, params, chunks(), corpus_fingerprint)
        }
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Embed, persist atomically, then serve
    ///
    /// Rows are written to a scratch file that is renamed over `path` only
    /// after the transaction commits, so a failed or interrupted build
    /// leaves any previous index untouched.
    pub fn build(
        path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        params: IndexParams,
        chunks: Vec<Chunk>,
        corpus_fingerprint: Option<String>,
    ) -> Result<Self, IndexError> {
        tracing::info!(
            "Building corpus index from {} chunks with {}",
            chunks.len(),
            provider.model_name()
        );

        let mut index = Self::empty(provider, params, corpus_fingerprint, chunks.len());
        let prepared = index.prepare(chunks);
        if prepared.skipped > 0 {
            tracing::warn!("{} chunks could not be embedded and were skipped", prepared.skipped);
        }
        index.commit(prepared)?;
        index.session_chunks = 0;
        index.meta.chunk_count = index.chunks.len();

        let scratch = scratch_path(path);
        let result = index.persist_to(&scratch).and_then(|_| {
            std::fs::rename(&scratch, path).map_err(|e| IndexError::Io {
                source: e,
                context: format!("Failed to move index into place at {:?}", path),
            })
        });

        if let Err(e) = result {
            remove_if_exists(&scratch);
            return Err(e);
        }

        tracing::info!("Persisted {} chunks to {:?}", index.chunks.len(), path);
        Ok(index)
    }

    /// Rebuild the HNSW graph from stored vectors
    pub fn load(
        path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        params: IndexParams,
    ) -> Result<Self, IndexError> {
        let store = IndexStore::open(path, Journal::Wal)?;
        let meta = store.read_meta()?.ok_or_else(|| {
            IndexError::Corrupt(format!("{:?} has no completed build", path))
        })?;

        if meta.embedding_model != provider.model_name() {
            return Err(IndexError::ModelMismatch {
                stored: meta.embedding_model,
                configured: provider.model_name().to_string(),
            });
        }

        let rows = store.load_chunks()?;
        if rows.len() != meta.chunk_count {
            return Err(IndexError::Corrupt(format!(
                "expected {} chunks, found {}",
                meta.chunk_count,
                rows.len()
            )));
        }

        let mut index = Self::empty(
            provider,
            params,
            meta.corpus_fingerprint.clone(),
            rows.len(),
        );
        index.meta = meta;

        for (expected, row) in rows.into_iter().enumerate() {
            if row.id != expected as u64 {
                return Err(IndexError::Corrupt(format!(
                    "chunk ids are not contiguous at {}",
                    row.id
                )));
            }
            if row.embedding.len() != index.vectors.dimension() {
                return Err(IndexError::Corrupt(format!(
                    "chunk {} has a {}-dimensional vector, expected {}",
                    row.id,
                    row.embedding.len(),
                    index.vectors.dimension()
                )));
            }
            index.push(row.chunk, row.embedding)?;
        }

        tracing::info!(
            "Loaded corpus index ({} chunks, built {})",
            index.chunks.len(),
            index.meta.built_at
        );
        Ok(index)
    }

    /// `capacity` sizes the graph for the expected number of chunks
    fn empty(
        provider: Arc<dyn EmbeddingProvider>,
        params: IndexParams,
        corpus_fingerprint: Option<String>,
        capacity: usize,
    ) -> Self {
        let vectors = VectorIndex::new(
            provider.dimension(),
            params.hnsw_m,
            params.hnsw_ef_construction,
            params.hnsw_ef_search,
            capacity,
        );
        let meta = IndexMeta {
            embedding_model: provider.model_name().to_string(),
            dimension: provider.dimension(),
            corpus_fingerprint,
            built_at: chrono::Utc::now().to_rfc3339(),
            chunk_count: 0,
        };

        Self {
            chunks: Vec::new(),
            by_source: BTreeMap::new(),
            vectors,
            provider,
            params,
            meta,
            session_chunks: 0,
        }
    }

    fn persist_to(&self, path: &Path) -> Result<(), IndexError> {
        remove_if_exists(path);
        let store = IndexStore::open(path, Journal::Rollback)?;

        let rows: Vec<(u64, &Chunk, &[f32])> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(id, chunk)| {
                self.vectors
                    .vector(id as u64)
                    .map(|vector| (id as u64, chunk, vector))
            })
            .collect();

        store.write_all(&rows, &self.meta)?;
        Ok(())
    }

    /// Embed chunks without touching the index
    ///
    /// Empty chunks and chunks the provider rejects are skipped.
    pub fn prepare(&self, chunks: Vec<Chunk>) -> PreparedChunks {
        let items: Vec<BatchItem> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.text.trim().is_empty())
            .map(|(position, chunk)| BatchItem {
                position,
                text: chunk.text.clone(),
            })
            .collect();

        let result = BatchProcessor::new(self.provider.as_ref(), self.params.batch_size)
            .process(&items);

        let mut slots: Vec<Option<Chunk>> = chunks.into_iter().map(Some).collect();
        let skipped = slots.len() - result.embedded.len();
        let rows = result
            .embedded
            .into_iter()
            .filter_map(|(position, vector)| {
                slots
                    .get_mut(position)
                    .and_then(Option::take)
                    .map(|chunk| (chunk, vector))
            })
            .collect();

        PreparedChunks { rows, skipped }
    }

    /// Make prepared chunks searchable; returns their ids
    pub fn commit(&mut self, prepared: PreparedChunks) -> Result<Vec<u64>, IndexError> {
        let dimension = self.vectors.dimension();
        if let Some((_, bad)) = prepared.rows.iter().find(|(_, v)| v.len() != dimension) {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            }
            .into());
        }

        let mut ids = Vec::with_capacity(prepared.rows.len());
        for (chunk, vector) in prepared.rows {
            ids.push(self.push(chunk, vector)?);
            self.session_chunks += 1;
        }
        Ok(ids)
    }

    /// Embed and append in one step
    pub fn add(&mut self, chunks: Vec<Chunk>) -> Result<Vec<u64>, IndexError> {
        let prepared = self.prepare(chunks);
        self.commit(prepared)
    }

    fn push(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<u64, IndexError> {
        let id = self.chunks.len() as u64;
        self.vectors.insert(id, vector)?;
        self.by_source
            .entry(chunk.source_file.clone())
            .or_default()
            .push(id);
        self.chunks.push(chunk);
        Ok(id)
    }

    /// Top-k chunks by cosine similarity, optionally restricted to a set of
    /// source files
    ///
    /// With a filter, every returned chunk comes from a listed file. A
    /// query with nothing embeddable returns no hits.
    pub fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&BTreeSet<String>>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = match self.provider.embed(text) {
            Ok(v) => v,
            Err(EmbeddingError::InvalidInput(reason)) => {
                tracing::debug!("Query not embeddable ({}); no dense hits", reason);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let hits = match filter {
            None => self.vectors.search(&query_vector, k)?,
            Some(sources) => {
                let allowed = self.ids_for_sources(sources);
                self.vectors.search_filtered(&query_vector, k, &allowed)?
            }
        };

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.chunk(hit.id).map(|chunk| ScoredChunk {
                    id: hit.id,
                    chunk: chunk.clone(),
                    score: hit.score,
                })
            })
            .filter(|hit| filter.map_or(true, |f| f.contains(&hit.chunk.source_file)))
            .collect())
    }

    /// Ids of every chunk from the given files
    pub fn ids_for_sources(&self, sources: &BTreeSet<String>) -> Vec<u64> {
        let mut ids: Vec<u64> = sources
            .iter()
            .filter_map(|s| self.by_source.get(s))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn chunk(&self, id: u64) -> Option<&Chunk> {
        self.chunks.get(id as usize)
    }

    /// All chunks in id order
    pub fn chunks(&self) -> impl Iterator<Item = (u64, &Chunk)> {
        self.chunks.iter().enumerate().map(|(id, c)| (id as u64, c))
    }

    /// Distinct source files, sorted
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.by_source.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks added since build or load
    pub fn session_chunk_count(&self) -> usize {
        self.session_chunks
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Delete the persisted index so the next start rebuilds it
    pub fn invalidate(path: &Path) -> Result<(), IndexError> {
        for file in [path.to_path_buf(), sidecar(path, "-wal"), sidecar(path, "-shm")] {
            if file.exists() {
                std::fs::remove_file(&file).map_err(|e| IndexError::Io {
                    source: e,
                    context: format!("Failed to remove {:?}", file),
                })?;
            }
        }
        tracing::info!("Invalidated corpus index at {:?}", path);
        Ok(())
    }

    /// Compare the persisted index with the corpus and configured model
    pub fn status(
        path: &Path,
        current_fingerprint: &str,
        configured_model: &str,
    ) -> Result<IndexStatus, IndexError> {
        if !Self::exists(path) {
            return Ok(IndexStatus::Missing);
        }

        let store = IndexStore::open(path, Journal::Wal)?;
        let meta = store
            .read_meta()?
            .ok_or_else(|| IndexError::Corrupt(format!("{:?} has no completed build", path)))?;

        if meta.embedding_model != configured_model {
            return Ok(IndexStatus::ModelChanged {
                stored: meta.embedding_model,
            });
        }

        let fresh = meta.corpus_fingerprint.as_deref() == Some(current_fingerprint);
        Ok(if fresh {
            IndexStatus::Fresh {
                chunks: meta.chunk_count,
                built_at: meta.built_at,
            }
        } else {
            IndexStatus::Stale {
                chunks: meta.chunk_count,
                built_at: meta.built_at,
            }
        })
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn scratch_path(path: &Path) -> PathBuf {
    sidecar(path, &format!(".building-{}", uuid::Uuid::new_v4().simple()))
}

fn remove_if_exists(path: &Path) {
    for file in [path.to_path_buf(), sidecar(path, "-journal")] {
        if file.exists() {
            if let Err(e) = std::fs::remove_file(&file) {
                tracing::warn!("Failed to remove {:?}: {}", file, e);
            }
        }
    }
}
