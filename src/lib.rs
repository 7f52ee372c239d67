//! Lexground - citation-grounded question answering
//!
//! Answers questions strictly from a bounded, user-supplied document corpus.
//! Documents are chunked along legal structure, retrieved with hybrid dense
//! and lexical search, reranked, and handed to a language model that must
//! cite a numbered snippet for every substantive claim or refuse. Answers
//! are then audited for uncited sentences.

pub mod assistant;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod grounding;
pub mod index;
pub mod ingest;
pub mod retrieval;
pub mod session;
pub mod storage;

pub use assistant::{Assistant, AssistantBuilder, Reply, TurnOptions, TurnOutcome};
pub use error::{LexgroundError, Result};
