//! Embedding and first-stage indexes
//!
//! - `EmbeddingProvider` abstracts the embedding backend
//! - `FastEmbedProvider` runs a local ONNX model (all-MiniLM-L6-v2, 384-dim)
//! - `HashEmbedder` is the model-free fallback
//! - `VectorIndex` wraps HNSW for dense search
//! - `KeywordIndex` wraps Tantivy for BM25 search
mod batch;
mod keyword_index;
mod provider;
mod vector_index;

pub use batch::{BatchItem, BatchProcessor, BatchResult};
pub use keyword_index::{KeywordIndex, KeywordIndexError, KeywordSearchResult};
pub use provider::{
    load_provider, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashEmbedder, HASH_MODEL,
};
pub use vector_index::{cosine_similarity, SearchResult, VectorIndex, VectorIndexError};
