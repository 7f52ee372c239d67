//! Legal-structure aware chunking
//!
//! A first pass groups lines into sections at headings such as
//! "Section 12.3", "Article 5", "Clause 7(a)" or "§ 2"; a second pass runs the
//! recursive splitter inside each section, so no chunk straddles two
//! sections.

mod splitter;

pub use splitter::RecursiveSplitter;

use crate::config::ChunkingConfig;
use crate::ingest::Document;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A bounded, citable span of one source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Base file name of the originating document
    pub source_file: String,
    /// Position of this chunk within its source file
    pub sequence_position: usize,
    /// Metadata inherited from the source document (e.g. `page`)
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_file: impl Into<String>, position: usize) -> Self {
        Self {
            text: text.into(),
            source_file: source_file.into(),
            sequence_position: position,
            extra_metadata: BTreeMap::new(),
        }
    }

    /// BLAKE3 digest of source and content; two chunks with the same text
    /// from the same file are the same chunk for deduplication purposes
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source_file.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

fn heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:(?:section|article|clause)\s+|§\s*)\d+[\w.\-()]*")
            .expect("heading pattern is valid")
    })
}

/// Whether a line opens a new legal section
pub fn is_section_heading(line: &str) -> bool {
    heading_pattern().is_match(line)
}

/// Group lines into sections; a heading closes the running section
pub fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_section_heading(line) && !current.is_empty() {
            sections.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }

    if !current.is_empty() {
        sections.push(current.join("\n"));
    }

    sections
}

/// Chunker honouring section boundaries before size limits
#[derive(Debug, Clone)]
pub struct LegalChunker {
    splitter: RecursiveSplitter,
}

impl LegalChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            splitter: RecursiveSplitter::new(chunk_size, chunk_overlap),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split one text into ordered chunks labelled with `source_label`
    pub fn split(&self, document_text: &str, source_label: &str) -> Vec<Chunk> {
        self.split_texts(document_text)
            .into_iter()
            .enumerate()
            .map(|(position, text)| Chunk::new(text, source_label, position))
            .collect()
    }

    /// Split a set of documents; positions run on across documents of the
    /// same source file (e.g. the pages of one PDF)
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut next_position: BTreeMap<&str, usize> = BTreeMap::new();
        let mut chunks = Vec::new();

        for document in documents {
            let position = next_position
                .entry(document.source_file.as_str())
                .or_insert(0);

            for text in self.split_texts(&document.text) {
                chunks.push(Chunk {
                    text,
                    source_file: document.source_file.clone(),
                    sequence_position: *position,
                    extra_metadata: document.metadata.clone(),
                });
                *position += 1;
            }
        }

        chunks
    }

    fn split_texts(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        split_sections(text)
            .iter()
            .flat_map(|section| self.splitter.split(section))
            .collect()
    }
}

impl Default for LegalChunker {
    fn default() -> Self {
        Self::new(600, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_detection() {
        assert!(is_section_heading("Section 12.3 Termination"));
        assert!(is_section_heading("ARTICLE 5"));
        assert!(is_section_heading("clause 7(a) Remedies"));
        assert!(is_section_heading("§ 2 Definitions"));
        assert!(is_section_heading("§12"));
        assert!(is_section_heading("   Section 4"));
        assert!(!is_section_heading("This section applies to tenants."));
        assert!(!is_section_heading("Section without number"));
    }

    #[test]
    fn test_sections_split_at_headings() {
        let text = "Preamble line\nSection 1 Scope\nApplies to all.\nSection 2 Terms\nPayment due.";
        let sections = split_sections(text);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], "Preamble line");
        assert!(sections[1].starts_with("Section 1"));
        assert!(sections[2].ends_with("Payment due."));
    }

    #[test]
    fn test_no_headings_is_one_section() {
        let sections = split_sections("Just prose.\nMore prose.");
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn test_chunks_never_straddle_sections() {
        let chunker = LegalChunker::default();
        let text = "Section 1 Offer\nAn offer must be communicated.\nSection 2 Acceptance\nAcceptance must mirror the offer.";
        let chunks = chunker.split(text, "contracts.txt");

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("offer must be communicated"));
        assert!(!chunks[0].text.contains("Acceptance must"));
        assert_eq!(chunks[1].sequence_position, 1);
        assert_eq!(chunks[1].source_file, "contracts.txt");
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let chunker = LegalChunker::default();
        assert!(chunker.split("", "empty.txt").is_empty());
        assert!(chunker.split(" \n\t\n", "blank.txt").is_empty());
    }

    #[test]
    fn test_chunking_is_idempotent() {
        let chunker = LegalChunker::new(120, 30);
        let text = "Article 1\n".to_string()
            + &"The tenant shall keep the premises in repair. ".repeat(12)
            + "\nArticle 2\n"
            + &"The landlord may inspect on notice. ".repeat(9);

        let first = chunker.split(&text, "lease.txt");
        let second = chunker.split(&text, "lease.txt");
        assert_eq!(first, second);
        assert!(first.len() > 2);
    }

    #[test]
    fn test_documents_inherit_metadata_and_positions_run_on() {
        let chunker = LegalChunker::default();
        let mut page_one = Document::new("Page one text.", "act.pdf");
        page_one.metadata.insert("page".into(), serde_json::json!(1));
        let mut page_two = Document::new("Page two text.", "act.pdf");
        page_two.metadata.insert("page".into(), serde_json::json!(2));
        let other = Document::new("Other file.", "notes.txt");

        let chunks = chunker.split_documents(&[page_one, page_two, other]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].sequence_position, 0);
        assert_eq!(chunks[1].sequence_position, 1);
        assert_eq!(chunks[1].extra_metadata["page"], serde_json::json!(2));
        assert_eq!(chunks[2].sequence_position, 0);
        assert_eq!(chunks[2].source_file, "notes.txt");
    }

    #[test]
    fn test_content_hash_depends_on_source() {
        let a = Chunk::new("same text", "a.txt", 0);
        let b = Chunk::new("same text", "b.txt", 0);
        let a_later = Chunk::new("same text", "a.txt", 5);
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), a_later.content_hash());
    }
}
