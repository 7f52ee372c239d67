//! Document ingestion
//!
//! Turns raw file bytes into text documents tagged with their base file
//! name. Format is chosen by extension; unsupported extensions yield no
//! documents rather than an error.

mod office;
mod ocr;
mod pdf;

pub use ocr::{image_mime_type, NoOcr, OcrEngine, VisionOcr};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Extensions the loader understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "pptx", "txt", "csv", "png", "jpg", "jpeg",
];

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Not a valid document: {file}")]
    NotAValidDocument { file: String },

    #[error("Failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("IO error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
}

/// Extracted text of (part of) one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    /// Base file name, used for citations and focus filters
    pub source_file: String,
    /// Format-specific metadata such as `page`, `slide` or `row`
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(text: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_file: source_file.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Final path component of a file name, as shown in citations
pub fn base_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name)
        .to_string()
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether the loader has an extractor for this file name
pub fn is_supported(file_name: &str) -> bool {
    extension_of(file_name)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Format dispatch over the individual extractors
#[derive(Clone)]
pub struct DocumentLoader {
    ocr: Arc<dyn OcrEngine>,
}

impl DocumentLoader {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    /// A loader whose images contribute no text
    pub fn without_ocr() -> Self {
        Self::new(Arc::new(NoOcr))
    }

    pub fn ocr(&self) -> &Arc<dyn OcrEngine> {
        &self.ocr
    }

    /// Extract documents from raw bytes
    pub async fn load_document(
        &self,
        bytes: &[u8],
        file_name: &str,
    ) -> Result<Vec<Document>, IngestionError> {
        let source = base_name(file_name);
        let Some(extension) = extension_of(&source) else {
            tracing::debug!("Skipping {} (no extension)", source);
            return Ok(Vec::new());
        };

        let documents = match extension.as_str() {
            "pdf" => {
                let owned = bytes.to_vec();
                let name = source.clone();
                tokio::task::spawn_blocking(move || pdf::extract_pages(&owned, &name))
                    .await
                    .map_err(|e| IngestionError::Parse {
                        file: source.clone(),
                        reason: e.to_string(),
                    })??
            }
            "docx" => office::extract_docx(bytes, &source)?,
            "pptx" => office::extract_pptx(bytes, &source)?,
            "txt" | "doc" => single(decode_text(bytes), &source),
            "csv" => csv_rows(&decode_text(bytes), &source),
            "png" | "jpg" | "jpeg" => {
                let mime_type = image_mime_type(&extension).unwrap_or("image/png");
                let text = self.ocr.extract_text(bytes, mime_type).await?;
                single(text, &source)
            }
            _ => {
                tracing::debug!("Skipping {} (unsupported type)", source);
                Vec::new()
            }
        };

        tracing::debug!("Extracted {} documents from {}", documents.len(), source);
        Ok(documents)
    }

    /// Read and extract a file on disk
    pub async fn load_path(&self, path: &Path) -> Result<Vec<Document>, IngestionError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| IngestionError::Io {
            source: e,
            context: format!("Failed to read {:?}", path),
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.load_document(&bytes, &name).await
    }

    /// Extract every supported file of a directory in name order
    ///
    /// Files that fail to parse are logged and skipped so one bad upload
    /// cannot block the corpus.
    pub async fn load_corpus_dir(&self, dir: &Path) -> Result<Vec<Document>, IngestionError> {
        let mut documents = Vec::new();

        for path in corpus_files(dir)? {
            match self.load_path(&path).await {
                Ok(mut docs) => documents.append(&mut docs),
                Err(e) => tracing::warn!("Skipping {:?}: {}", path, e),
            }
        }

        tracing::info!(
            "Loaded {} documents from {:?}",
            documents.len(),
            dir
        );
        Ok(documents)
    }
}

/// Supported files of a corpus directory, sorted by name
pub fn corpus_files(dir: &Path) -> Result<Vec<PathBuf>, IngestionError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| IngestionError::Io {
        source: e,
        context: format!("Failed to list corpus directory {:?}", dir),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(is_supported)
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// BLAKE3 digest over the names and contents of the corpus files
pub fn corpus_fingerprint(dir: &Path) -> Result<String, IngestionError> {
    let mut hasher = blake3::Hasher::new();

    for path in corpus_files(dir)? {
        let bytes = std::fs::read(&path).map_err(|e| IngestionError::Io {
            source: e,
            context: format!("Failed to read {:?}", path),
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn single(text: String, source: &str) -> Vec<Document> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![Document::new(text, source)]
    }
}

/// Lossy UTF-8 with control characters other than line breaks and tabs
/// removed (legacy binary formats decode to noise otherwise)
fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r' | '\x0c'))
        .collect()
}

/// One document per data row, rendered as `column: value` lines
fn csv_rows(text: &str, source: &str) -> Vec<Document> {
    let mut records = parse_csv(text).into_iter();
    let Some(header) = records.next() else {
        return Vec::new();
    };

    records
        .enumerate()
        .filter(|(_, record)| record.iter().any(|field| !field.trim().is_empty()))
        .map(|(row, record)| {
            let text = header
                .iter()
                .zip(record.iter())
                .map(|(column, value)| format!("{}: {}", column.trim(), value.trim()))
                .collect::<Vec<_>>()
                .join("\n");
            let mut document = Document::new(text, source);
            document
                .metadata
                .insert("row".to_string(), serde_json::json!(row));
            document
        })
        .collect()
}

/// Minimal RFC 4180 reader: quoted fields, doubled quotes, embedded
/// newlines
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_plain_text_document() {
        let loader = DocumentLoader::without_ocr();
        let docs = loader
            .load_document(b"Section 1\nThe duty of care applies.", "uploads/tort.txt")
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_file, "tort.txt");
        assert!(docs[0].text.contains("duty of care"));
    }

    #[tokio::test]
    async fn test_unsupported_extension_yields_nothing() {
        let loader = DocumentLoader::without_ocr();
        let docs = loader.load_document(b"#!/bin/sh", "script.sh").await.unwrap();
        assert!(docs.is_empty());
        let docs = loader.load_document(b"data", "README").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_docx_rejected() {
        let loader = DocumentLoader::without_ocr();
        let result = loader.load_document(b"not a zip", "brief.docx").await;
        assert!(matches!(
            result,
            Err(IngestionError::NotAValidDocument { .. })
        ));
    }

    #[tokio::test]
    async fn test_images_without_ocr_contribute_nothing() {
        let loader = DocumentLoader::without_ocr();
        let docs = loader
            .load_document(&[0x89, b'P', b'N', b'G'], "scan.png")
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_csv_rows_become_documents() {
        let csv = "case,holding\n\"Donoghue v Stevenson\",\"Duty of care owed to \"\"neighbours\"\"\"\nCarlill,\"Unilateral offer,\naccepted by performance\"\n";
        let docs = csv_rows(csv, "cases.csv");
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].text,
            "case: Donoghue v Stevenson\nholding: Duty of care owed to \"neighbours\""
        );
        assert!(docs[1].text.contains("Unilateral offer,\naccepted"));
        assert_eq!(docs[1].metadata["row"], serde_json::json!(1));
    }

    #[test]
    fn test_decode_strips_binary_noise() {
        let text = decode_text(b"Clause\x00 7\x01\nbody");
        assert_eq!(text, "Clause 7\nbody");
    }

    #[tokio::test]
    async fn test_corpus_dir_in_name_order_skipping_failures() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.txt"), "Second file.").unwrap();
        std::fs::write(temp.path().join("a.txt"), "First file.").unwrap();
        std::fs::write(temp.path().join("broken.docx"), "not a zip").unwrap();
        std::fs::write(temp.path().join("ignored.rs"), "fn main() {}").unwrap();

        let loader = DocumentLoader::without_ocr();
        let docs = loader.load_corpus_dir(temp.path()).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.source_file.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "one").unwrap();
        let first = corpus_fingerprint(temp.path()).unwrap();
        assert_eq!(first, corpus_fingerprint(temp.path()).unwrap());

        std::fs::write(temp.path().join("a.txt"), "two").unwrap();
        assert_ne!(first, corpus_fingerprint(temp.path()).unwrap());

        let missing = corpus_fingerprint(&temp.path().join("absent")).unwrap();
        assert_eq!(missing, blake3::hash(b"").to_hex().to_string());
    }
}
