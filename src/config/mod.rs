//! Configuration management for lexground
//!
//! Loads the TOML configuration, applies profile and environment overrides,
//! and validates the result before any component is built from it.

use crate::error::{LexgroundError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Schema version written by `Config::default()`
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub reranking: RerankingConfig,
    pub evidence: EvidenceConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub ocr: OcrConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where the corpus, the persisted index and the fact log live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub index_path: PathBuf,
    pub facts_path: PathBuf,
}

/// Chunk sizing, in characters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// fastembed model name, or "hash" for the model-free hashing embedder
    pub model: String,
    pub batch_size: usize,
}

/// HNSW graph parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate width of each first-stage retriever
    pub first_k: usize,
    /// Number of document chunks that survive reranking
    pub final_k: usize,
    /// RRF K constant (typically 60)
    pub rrf_k: f32,
    pub dense_weight: f32,
    pub lexical_weight: f32,
    pub enable_lexical: bool,
}

/// Cross-encoder reranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingConfig {
    pub enabled: bool,
    pub model: String,
}

/// Evidence assembly limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    pub max_chunk_chars: usize,
    pub max_user_snippets: usize,
}

/// LLM configuration (any OpenAI-compatible chat completions endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Previous turns replayed to the model as conversation context
    pub context_turns: usize,
}

/// Interactive session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_turns: usize,
}

/// Image text extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub enabled: bool,
    /// Vision model; falls back to `llm.model` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranking_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_lexical: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LexgroundError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LexgroundError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LexgroundError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| LexgroundError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(enabled) = overrides.reranking_enabled {
            self.reranking.enabled = enabled;
        }
        if let Some(enabled) = overrides.enable_lexical {
            self.retrieval.enable_lexical = enabled;
        }
        if let Some(final_k) = overrides.final_k {
            self.retrieval.final_k = final_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LEXGROUND_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LEXGROUND_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "LLM__BASE_URL" => {
                self.llm.base_url = value.to_string();
            }
            "LLM__TIMEOUT_SECS" => {
                self.llm.timeout_secs = parse_env(path, value)?;
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "RERANKING__ENABLED" => {
                self.reranking.enabled = parse_env(path, value)?;
            }
            "RETRIEVAL__ENABLE_LEXICAL" => {
                self.retrieval.enable_lexical = parse_env(path, value)?;
            }
            "STORAGE__DATA_DIR" => {
                self.relocate(PathBuf::from(value));
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Point every storage path below a new data directory
    pub fn relocate(&mut self, data_dir: PathBuf) {
        self.storage = StorageConfig::under(data_dir);
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            LexgroundError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("lexground").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| LexgroundError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".lexground"))
    }

    /// Model used for image transcription
    pub fn ocr_model(&self) -> &str {
        self.ocr.model.as_deref().unwrap_or(&self.llm.model)
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| LexgroundError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl StorageConfig {
    /// Standard layout below a data directory
    pub fn under(data_dir: PathBuf) -> Self {
        Self {
            corpus_dir: data_dir.join("corpus"),
            index_path: data_dir.join("store").join("index.sqlite"),
            facts_path: data_dir.join("store").join("facts.sqlite"),
            data_dir,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::under(PathBuf::from("~/.lexground")),
            chunking: ChunkingConfig {
                chunk_size: 600,
                chunk_overlap: 100,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            indexing: IndexingConfig {
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            retrieval: RetrievalConfig {
                first_k: 30,
                final_k: 4,
                rrf_k: 60.0,
                dense_weight: 0.7,
                lexical_weight: 0.3,
                enable_lexical: true,
            },
            reranking: RerankingConfig {
                enabled: true,
                model: "BAAI/bge-reranker-base".to_string(),
            },
            evidence: EvidenceConfig {
                max_chunk_chars: 1000,
                max_user_snippets: 10,
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.0,
                max_tokens: 800,
                timeout_secs: 60,
                context_turns: 6,
            },
            session: SessionConfig { max_turns: 30 },
            ocr: OcrConfig {
                enabled: true,
                model: None,
            },
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
        assert_eq!(config.retrieval.first_k, 30);
        assert_eq!(config.retrieval.final_k, 4);
        assert_eq!(config.chunking.chunk_size, 600);
        assert_eq!(config.chunking.chunk_overlap, 100);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.final_k = 6;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.final_k, 6);
        assert_eq!(loaded.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(&temp.path().join("absent.toml"));
        assert!(matches!(result, Err(LexgroundError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "offline".to_string(),
            ProfileOverrides {
                embedding_model: Some("hash".to_string()),
                llm_model: None,
                reranking_enabled: Some(false),
                enable_lexical: None,
                final_k: Some(2),
            },
        );

        config.apply_profile("offline").unwrap();
        assert_eq!(config.embedding.model, "hash");
        assert!(!config.reranking.enabled);
        assert_eq!(config.retrieval.final_k, 2);

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_relocate_storage() {
        let mut config = Config::default();
        config.relocate(PathBuf::from("/tmp/lg"));
        assert_eq!(config.storage.corpus_dir, PathBuf::from("/tmp/lg/corpus"));
        assert_eq!(
            config.storage.index_path,
            PathBuf::from("/tmp/lg/store/index.sqlite")
        );
    }
}
