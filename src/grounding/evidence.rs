//! Evidence assembly: numbered, citable material for one answer

use crate::config::Config;
use crate::retrieval::ScoredChunk;
use crate::session::SessionMemory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Citation tag of an evidence item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceTag {
    /// `#n`, a retrieved document chunk (1-based)
    Document(usize),
    /// `#Un`, a user-stated snippet (1-based)
    User(usize),
}

impl EvidenceTag {
    /// Parse `#3`, `3`, `#U2`, `U2` or a bracketed form such as `[#2]`
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim().trim_start_matches('[').trim_end_matches(']').trim();
        let body = trimmed.strip_prefix('#').unwrap_or(trimmed);

        let (user, digits) = match body.strip_prefix(['U', 'u']) {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let n: usize = digits.parse().ok()?;
        if n == 0 {
            return None;
        }
        Some(if user { Self::User(n) } else { Self::Document(n) })
    }
}

impl fmt::Display for EvidenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(n) => write!(f, "#{}", n),
            Self::User(n) => write!(f, "#U{}", n),
        }
    }
}

/// Where an evidence item came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum EvidenceOrigin {
    Document { source_file: String, chunk_id: u64 },
    User,
}

/// One numbered, citable piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub tag: EvidenceTag,
    pub origin: EvidenceOrigin,
    pub text: String,
}

impl EvidenceItem {
    /// Source file for documents, `user` for user snippets
    pub fn label(&self) -> &str {
        match &self.origin {
            EvidenceOrigin::Document { source_file, .. } => source_file,
            EvidenceOrigin::User => "user",
        }
    }

    /// `[#1] (contract.pdf) text`
    pub fn render(&self) -> String {
        format!("[{}] ({}) {}", self.tag, self.label(), self.text)
    }
}

/// Everything the answerer may rely on for one turn
#[derive(Debug, Clone, Default)]
pub struct EvidenceSet {
    /// Documents `#1..` followed by user snippets `#U1..`
    pub items: Vec<EvidenceItem>,
    /// Permanent facts then session facts; not numbered
    pub facts: Vec<String>,
    pub persona: Option<String>,
}

impl EvidenceSet {
    pub fn get(&self, tag: EvidenceTag) -> Option<&EvidenceItem> {
        self.items.iter().find(|item| item.tag == tag)
    }

    pub fn documents(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items
            .iter()
            .filter(|item| matches!(item.tag, EvidenceTag::Document(_)))
    }

    pub fn user_snippets(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.items
            .iter()
            .filter(|item| matches!(item.tag, EvidenceTag::User(_)))
    }

    /// Whether there is any numbered evidence
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether there is evidence or at least one fact
    pub fn has_support(&self) -> bool {
        !self.items.is_empty() || !self.facts.is_empty()
    }
}

/// Merges reranked chunks with session memory into an [`EvidenceSet`]
#[derive(Debug, Clone)]
pub struct EvidenceAssembler {
    final_k: usize,
    max_chunk_chars: usize,
    max_user_snippets: usize,
}

impl EvidenceAssembler {
    pub fn new(final_k: usize, max_chunk_chars: usize, max_user_snippets: usize) -> Self {
        Self {
            final_k,
            max_chunk_chars,
            max_user_snippets,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retrieval.final_k,
            config.evidence.max_chunk_chars,
            config.evidence.max_user_snippets,
        )
    }

    pub fn assemble(&self, ranked: &[ScoredChunk], memory: &SessionMemory) -> EvidenceSet {
        let mut items: Vec<EvidenceItem> = ranked
            .iter()
            .take(self.final_k)
            .enumerate()
            .map(|(i, hit)| EvidenceItem {
                tag: EvidenceTag::Document(i + 1),
                origin: EvidenceOrigin::Document {
                    source_file: hit.chunk.source_file.clone(),
                    chunk_id: hit.id,
                },
                text: clip(&hit.chunk.text, self.max_chunk_chars),
            })
            .collect();

        let snippets: Vec<&str> = memory.recent_user_snippets().collect();
        let skip = snippets.len().saturating_sub(self.max_user_snippets);
        items.extend(
            snippets
                .into_iter()
                .skip(skip)
                .enumerate()
                .map(|(i, snippet)| EvidenceItem {
                    tag: EvidenceTag::User(i + 1),
                    origin: EvidenceOrigin::User,
                    text: snippet.to_string(),
                }),
        );

        EvidenceSet {
            items,
            facts: memory.facts().map(str::to_string).collect(),
            persona: memory.persona().map(str::to_string),
        }
    }
}

/// Collapse whitespace runs to single spaces and keep at most `max_chars`
/// characters
pub fn clip(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match normalized.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => normalized[..byte_pos].to_string(),
        None => normalized,
    }
}
