use std::path::PathBuf;
use thiserror::Error;

use crate::grounding::ModelError;
use crate::index::IndexError;
use crate::ingest::IngestionError;
use crate::storage::StoreError;

/// Main error type for lexground
#[derive(Error, Debug)]
pub enum LexgroundError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// A file could not be turned into documents
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    /// Corpus index build, load or update failed
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The language model call failed or timed out
    #[error(transparent)]
    ModelCall(#[from] ModelError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] StoreError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LexgroundError {
    /// Whether the caller may reasonably retry the same turn
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelCall(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for lexground operations
pub type Result<T> = std::result::Result<T, LexgroundError>;
