use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{LexgroundError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_evidence(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LexgroundError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is not checked: directories are created on first use
        let paths = [
            ("storage.data_dir", &config.storage.data_dir),
            ("storage.corpus_dir", &config.storage.corpus_dir),
            ("storage.index_path", &config.storage.index_path),
            ("storage.facts_path", &config.storage.facts_path),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(key, "Path cannot be empty"));
            }
        }

        if config.storage.index_path == config.storage.facts_path {
            errors.push(ValidationError::new(
                "storage.facts_path",
                "Facts must not share a file with the rebuildable index",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if config.chunking.chunk_overlap >= config.chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    config.chunking.chunk_overlap, config.chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.final_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.final_k",
                "final_k must be at least 1",
            ));
        }

        if retrieval.first_k < retrieval.final_k {
            errors.push(ValidationError::new(
                "retrieval.first_k",
                format!(
                    "first_k ({}) must not be smaller than final_k ({})",
                    retrieval.first_k, retrieval.final_k
                ),
            ));
        }

        if retrieval.dense_weight <= 0.0 || retrieval.lexical_weight <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.dense_weight",
                "Fusion weights must be positive",
            ));
        }

        if retrieval.rrf_k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "RRF constant cannot be negative",
            ));
        }
    }

    fn validate_evidence(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.evidence.max_chunk_chars == 0 {
            errors.push(ValidationError::new(
                "evidence.max_chunk_chars",
                "Evidence character budget must be greater than 0",
            ));
        }

        if config.evidence.max_user_snippets > 10 {
            errors.push(ValidationError::new(
                "evidence.max_user_snippets",
                format!(
                    "At most 10 user snippets are kept, got {}",
                    config.evidence.max_user_snippets
                ),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // The API key is checked when the client is built, so offline
        // commands work without it.
        if config.llm.temperature != 0.0 {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!(
                    "Grounded answering runs at temperature 0, got {}",
                    config.llm.temperature
                ),
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        if config.llm.max_tokens == 0 {
            errors.push(ValidationError::new(
                "llm.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        if config.llm.base_url.is_empty() {
            errors.push(ValidationError::new(
                "llm.base_url",
                "Base URL cannot be empty",
            ));
        }

        if config.session.max_turns == 0 {
            errors.push(ValidationError::new(
                "session.max_turns",
                "max_turns must be greater than 0",
            ));
        }
    }
}
