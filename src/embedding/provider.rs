/// Embedding provider trait, FastEmbed and hashing implementations
use crate::config::EmbeddingConfig;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// Implementations must be deterministic for a given model: the index
/// stores their vectors and later compares fresh query vectors to them.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one vector per input in
    /// input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Model name selecting [`HashEmbedder`]
pub const HASH_MODEL: &str = "hash";

/// Build the provider named by the configuration
pub fn load_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    if config.model == HASH_MODEL {
        tracing::info!("Using hashing embedder ({} dims)", HashEmbedder::DEFAULT_DIMENSION);
        return Ok(Arc::new(HashEmbedder::default()));
    }
    Ok(Arc::new(FastEmbedProvider::new(&config.model)?))
}

/// FastEmbed provider for local embedding generation
///
/// Uses all-MiniLM-L6-v2 model (384 dimensions) by default.
/// Runs fully offline once the model is cached.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand on first use.
    /// - all-MiniLM-L6-v2: 90MB (384 dims)
    /// - bge-small-en-v1.5: 130MB (384 dims)
    /// - bge-base-en-v1.5: 440MB (768 dims)
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, {}",
                    model_name, HASH_MODEL
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empties would misalign outputs with inputs
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at batch position {}",
                pos
            )));
        }

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self
            .model
            .embed(inputs, None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Embedding count mismatch: expected {}, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Model-free embedder based on signed feature hashing of word tokens
///
/// Vectors are L2-normalised, so cosine similarity tracks shared
/// vocabulary. Needs no download, which makes it the embedder for tests
/// and air-gapped setups.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut seen = 0usize;

        for token in Self::tokens(text) {
            let digest = blake3::hash(token.as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest.as_bytes()[..8]);
            let h = u64::from_le_bytes(head);

            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            seen += 1;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if seen == 0 || norm == 0.0 {
            return Err(EmbeddingError::InvalidInput(
                "Text has no embeddable tokens".to_string(),
            ));
        }

        vector.iter_mut().for_each(|x| *x /= norm);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASH_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_normalised() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("The duty of care is owed to neighbours").unwrap();
        let b = embedder.embed("The duty of care is owed to neighbours").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HashEmbedder::DEFAULT_DIMENSION);

        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hash_embedder_tracks_shared_vocabulary() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("adverse possession limitation period").unwrap();
        let related = embedder
            .embed("The limitation period for adverse possession is twelve years")
            .unwrap();
        let unrelated = embedder.embed("Consideration must move from the promisee").unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hash_embedder_rejects_tokenless_text() {
        let embedder = HashEmbedder::default();
        assert!(matches!(
            embedder.embed("  §§ -- "),
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(embedder
            .embed_batch(&["valid words".to_string(), "".to_string()])
            .is_err());
    }

    #[test]
    fn test_load_hash_provider() {
        let config = EmbeddingConfig {
            model: HASH_MODEL.to_string(),
            batch_size: 8,
        };
        let provider = load_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "hash");
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(matches!(
            FastEmbedProvider::new("no-such-model"),
            Err(EmbeddingError::InitializationError(_))
        ));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_provider_creation() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        assert_eq!(provider.dimension(), 384);
        assert_eq!(provider.model_name(), "all-MiniLM-L6-v2");
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_batch_embedding_keeps_alignment() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let texts = vec![
            "An offer may be revoked before acceptance.".to_string(),
            "Silence does not amount to acceptance.".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        let single = provider.embed(&texts[0]).unwrap();
        assert!(cosine_similarity(&embeddings[0], &single) > 0.99);

        let empty = provider.embed_batch(&["ok".to_string(), " ".to_string()]);
        assert!(matches!(empty, Err(EmbeddingError::InvalidInput(_))));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_semantic_similarity() {
        let provider = FastEmbedProvider::with_default_model().unwrap();

        let emb1 = provider.embed("The tenant must pay rent monthly.").unwrap();
        let emb2 = provider.embed("Rent is payable by the lessee each month.").unwrap();
        let emb3 = provider.embed("Python programming language.").unwrap();

        assert!(cosine_similarity(&emb1, &emb2) > cosine_similarity(&emb1, &emb3));
    }
}
