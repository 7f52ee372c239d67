//! Session memory
//!
//! Per-conversation state: facts, persona, recent user statements and the
//! turn history. Owned by exactly one conversation; permanent facts are
//! additionally appended to the shared fact store by the caller.

mod command;

pub use command::Command;

use crate::config::Config;
use crate::grounding::EvidenceItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub message: String,
    /// Evidence the message actually cites (assistant turns only)
    #[serde(default)]
    pub cited_evidence: Vec<EvidenceItem>,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            message: message.into(),
            cited_evidence: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn assistant(message: impl Into<String>, cited_evidence: Vec<EvidenceItem>) -> Self {
        Self {
            role: TurnRole::Assistant,
            message: message.into(),
            cited_evidence,
            at: Utc::now(),
        }
    }

    /// `#1 -> contract.pdf` lines for the sources this turn cites
    pub fn legend(&self) -> Vec<String> {
        self.cited_evidence
            .iter()
            .map(|item| format!("{} -> {}", item.tag, item.label()))
            .collect()
    }
}

/// Transient state of one conversation
#[derive(Debug, Clone)]
pub struct SessionMemory {
    id: Uuid,
    started_at: DateTime<Utc>,
    permanent_facts: Vec<String>,
    session_facts: Vec<String>,
    persona: Option<String>,
    recent_user_snippets: VecDeque<String>,
    history: VecDeque<Turn>,
    last_evidence: Vec<EvidenceItem>,
    max_user_snippets: usize,
    max_turns: usize,
}

impl SessionMemory {
    /// Start a session seeded with the facts already in the fact store
    ///
    /// History keeps the last `max_turns` exchanges (two turns each).
    pub fn new(permanent_facts: Vec<String>, max_turns: usize, max_user_snippets: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            permanent_facts,
            session_facts: Vec::new(),
            persona: None,
            recent_user_snippets: VecDeque::with_capacity(max_user_snippets),
            history: VecDeque::new(),
            last_evidence: Vec::new(),
            max_user_snippets,
            max_turns,
        }
    }

    pub fn from_config(permanent_facts: Vec<String>, config: &Config) -> Self {
        Self::new(
            permanent_facts,
            config.session.max_turns,
            config.evidence.max_user_snippets,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record a fact that outlives the session
    pub fn remember(&mut self, fact: impl Into<String>) {
        self.permanent_facts.push(fact.into());
    }

    /// Record a fact for this session only
    pub fn note(&mut self, fact: impl Into<String>) {
        self.session_facts.push(fact.into());
    }

    pub fn set_persona(&mut self, persona: Option<String>) {
        self.persona = persona.filter(|p| !p.trim().is_empty());
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn permanent_facts(&self) -> &[String] {
        &self.permanent_facts
    }

    pub fn session_facts(&self) -> &[String] {
        &self.session_facts
    }

    /// Permanent facts, then session facts
    pub fn facts(&self) -> impl Iterator<Item = &str> {
        self.permanent_facts
            .iter()
            .chain(self.session_facts.iter())
            .map(String::as_str)
    }

    /// Remember something the user said, dropping the oldest beyond the cap
    pub fn push_user_snippet(&mut self, snippet: impl Into<String>) {
        if self.max_user_snippets == 0 {
            return;
        }
        while self.recent_user_snippets.len() >= self.max_user_snippets {
            self.recent_user_snippets.pop_front();
        }
        self.recent_user_snippets.push_back(snippet.into());
    }

    /// Recent user statements, oldest first
    pub fn recent_user_snippets(&self) -> impl Iterator<Item = &str> {
        self.recent_user_snippets.iter().map(String::as_str)
    }

    /// Record a completed question and answer
    ///
    /// The question also becomes a user snippet for later turns.
    pub fn record_exchange(
        &mut self,
        question: &str,
        answer: &str,
        cited_evidence: Vec<EvidenceItem>,
    ) {
        self.push_user_snippet(question);
        self.push_turn(Turn::user(question));
        self.push_turn(Turn::assistant(answer, cited_evidence));
    }

    /// Append a turn, dropping the oldest beyond the cap
    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push_back(turn);
        let cap = self.max_turns.saturating_mul(2);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }

    /// History, oldest first
    pub fn history(&self) -> Vec<Turn> {
        self.history.iter().cloned().collect()
    }

    pub fn turn_count(&self) -> usize {
        self.history.len()
    }

    /// Keep the evidence shown to the model for `show snippet`
    pub fn set_last_evidence(&mut self, items: Vec<EvidenceItem>) {
        self.last_evidence = items;
    }

    /// Evidence of the most recent answer
    pub fn last_evidence(&self) -> &[EvidenceItem] {
        &self.last_evidence
    }

    /// Most recent assistant turn
    pub fn last_answer(&self) -> Option<&Turn> {
        self.history
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Assistant)
    }
}
