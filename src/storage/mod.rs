//! Storage layer for lexground
//!
//! Owns the on-disk layout: the corpus directory of uploaded files, the
//! rebuildable index database and the durable fact log.

pub mod database;
pub mod facts;

pub use database::{Database, DbPool, Journal, StoreError};
pub use facts::FactStore;

use crate::config::StorageConfig;
use crate::error::{LexgroundError, Result};
use crate::index::CorpusIndex;
use crate::ingest::{base_name, corpus_files, is_supported};
use std::path::{Path, PathBuf};

/// A file in the corpus directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub name: String,
    pub size_bytes: u64,
}

/// Storage manager coordinating the corpus directory and the stores
pub struct StorageManager {
    config: StorageConfig,
}

impl StorageManager {
    /// Create the directory layout if needed
    pub fn new(config: &StorageConfig) -> Result<Self> {
        for dir in [&config.data_dir, &config.corpus_dir] {
            std::fs::create_dir_all(dir).map_err(|e| LexgroundError::Io {
                source: e,
                context: format!("Failed to create directory: {}", dir.display()),
            })?;
        }

        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.config.corpus_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.config.index_path
    }

    /// Open the permanent fact log
    pub fn open_facts(&self) -> Result<FactStore> {
        Ok(FactStore::open(&self.config.facts_path)?)
    }

    /// Copy an upload into the corpus under its base name
    ///
    /// Overwrites a file of the same name and invalidates the persisted
    /// index, so the next start rebuilds it with the new content.
    pub fn save_to_corpus(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = base_name(file_name);
        if name.is_empty() || !is_supported(&name) {
            return Err(LexgroundError::Config(format!(
                "Unsupported corpus file: {}",
                file_name
            )));
        }

        let target = self.config.corpus_dir.join(&name);
        std::fs::write(&target, bytes).map_err(|e| LexgroundError::Io {
            source: e,
            context: format!("Failed to write corpus file: {}", target.display()),
        })?;

        tracing::info!("Saved {} to corpus ({} bytes)", name, bytes.len());
        self.invalidate_index()?;
        Ok(target)
    }

    /// Delete a corpus file; returns false if it did not exist
    pub fn remove_from_corpus(&self, file_name: &str) -> Result<bool> {
        let target = self.config.corpus_dir.join(base_name(file_name));
        if !target.is_file() {
            return Ok(false);
        }

        std::fs::remove_file(&target).map_err(|e| LexgroundError::Io {
            source: e,
            context: format!("Failed to remove corpus file: {}", target.display()),
        })?;

        tracing::info!("Removed {} from corpus", target.display());
        self.invalidate_index()?;
        Ok(true)
    }

    /// Supported corpus files in name order
    pub fn list_corpus(&self) -> Result<Vec<CorpusEntry>> {
        corpus_files(&self.config.corpus_dir)?
            .into_iter()
            .map(|path| {
                let metadata = std::fs::metadata(&path).map_err(|e| LexgroundError::Io {
                    source: e,
                    context: format!("Failed to stat {}", path.display()),
                })?;
                Ok(CorpusEntry {
                    name: path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default()
                        .to_string(),
                    size_bytes: metadata.len(),
                })
            })
            .collect()
    }

    /// Drop the persisted index
    pub fn invalidate_index(&self) -> Result<()> {
        CorpusIndex::invalidate(&self.config.index_path)?;
        Ok(())
    }

    /// Format bytes as human-readable size
    pub fn format_size(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> StorageManager {
        StorageManager::new(&StorageConfig::under(temp.path().to_path_buf())).unwrap()
    }

    #[test]
    fn test_layout_created() {
        let temp = TempDir::new().unwrap();
        let storage = manager(&temp);
        assert!(storage.corpus_dir().is_dir());
        assert!(storage.list_corpus().unwrap().is_empty());
    }

    #[test]
    fn test_save_uses_base_name_and_invalidates_index() {
        let temp = TempDir::new().unwrap();
        let storage = manager(&temp);

        std::fs::create_dir_all(storage.index_path().parent().unwrap()).unwrap();
        std::fs::write(storage.index_path(), b"stale index").unwrap();

        let saved = storage
            .save_to_corpus("../../elsewhere/lease.txt", b"Clause 1 Rent")
            .unwrap();
        assert_eq!(saved, storage.corpus_dir().join("lease.txt"));
        assert!(!storage.index_path().exists());

        let listed = storage.list_corpus().unwrap();
        assert_eq!(
            listed,
            vec![CorpusEntry {
                name: "lease.txt".to_string(),
                size_bytes: 13
            }]
        );
    }

    #[test]
    fn test_unsupported_upload_rejected() {
        let temp = TempDir::new().unwrap();
        let storage = manager(&temp);
        assert!(storage.save_to_corpus("tool.exe", b"MZ").is_err());
    }

    #[test]
    fn test_remove_from_corpus() {
        let temp = TempDir::new().unwrap();
        let storage = manager(&temp);
        storage.save_to_corpus("a.txt", b"text").unwrap();

        assert!(storage.remove_from_corpus("a.txt").unwrap());
        assert!(!storage.remove_from_corpus("a.txt").unwrap());
        assert!(storage.list_corpus().unwrap().is_empty());
    }

    #[test]
    fn test_facts_store_opens_under_layout() {
        let temp = TempDir::new().unwrap();
        let storage = manager(&temp);
        let facts = storage.open_facts().unwrap();
        facts.append("Acting for the tenant").unwrap();
        assert_eq!(facts.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(StorageManager::format_size(0), "0 B");
        assert_eq!(StorageManager::format_size(1023), "1023 B");
        assert_eq!(StorageManager::format_size(1024), "1.00 KB");
        assert_eq!(StorageManager::format_size(1024 * 1024), "1.00 MB");
    }
}
