//! Prompt construction for grounded answers

use crate::grounding::{ChatMessage, ChatRole, ContentPart, EvidenceSet};
use crate::session::{Turn, TurnRole};

/// Exact answer when neither evidence nor facts support a reply
pub const REFUSAL: &str =
    "I don't have enough information in the provided material to answer that.";

/// Fixed instruction encoding the authority hierarchy and citation rule
pub const SYSTEM_INSTRUCTION: &str = "\
You are a friendly but meticulous legal study assistant.

GROUND RULES
- Your sources, in order of authority:
  1. Provided snippets, numbered [#n] for documents and [#Un] for things the user said.
  2. Stored facts, given as \"Fact:\" messages.
  3. Generally known public facts, only when obviously harmless.
- Every sentence that states a legal rule, holding, statute section, date, or anything \
that might be challenged must end with its citation tag, e.g. [#2].
- If the necessary information is not present in 1 or 2, respond exactly with:
\"I don't have enough information in the provided material to answer that.\"

STYLE
- Open with one conversational line restating the question.
- Give a detailed, logically structured answer (IRAC only if asked).
- Explain legal jargon in plain English.
- Keep the tone peer-to-peer, confident and concise.

(NO CITATION MEANS NO CLAIM.)";

/// Image attached to a question
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Everything that goes into one model request
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub question: &'a str,
    pub evidence: &'a EvidenceSet,
    pub ocr_text: Option<&'a str>,
    pub image: Option<&'a ImageInput>,
    /// Earlier turns, oldest first
    pub history: &'a [Turn],
}

/// System instruction with the persona modifier, if any
pub fn system_instruction(persona: Option<&str>) -> String {
    match persona.map(str::trim).filter(|p| !p.is_empty()) {
        Some(persona) => format!("{} Adopt persona: {}.", SYSTEM_INSTRUCTION, persona),
        None => SYSTEM_INSTRUCTION.to_string(),
    }
}

/// Ordered message list: instruction, snippets, facts, OCR, the most
/// recent `context_turns` history messages, then the question
pub fn build_messages(input: &PromptInput<'_>, context_turns: usize) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_instruction(
        input.evidence.persona.as_deref(),
    ))];

    if !input.evidence.items.is_empty() {
        let snippets: Vec<String> = input.evidence.items.iter().map(|item| item.render()).collect();
        messages.push(ChatMessage::system(format!("Snippets:\n{}", snippets.join("\n\n"))));
    }

    for fact in &input.evidence.facts {
        messages.push(ChatMessage::system(format!("Fact: {}", fact)));
    }

    if let Some(ocr) = input.ocr_text.map(str::trim).filter(|t| !t.is_empty()) {
        messages.push(ChatMessage::system(format!("OCR:\n{}", ocr)));
    }

    let skip = input.history.len().saturating_sub(context_turns);
    for turn in &input.history[skip..] {
        let role = match turn.role {
            TurnRole::User => ChatRole::User,
            TurnRole::Assistant => ChatRole::Assistant,
        };
        messages.push(ChatMessage::text(role, turn.message.clone()));
    }

    let mut parts = vec![ContentPart::Text(input.question.to_string())];
    if let Some(image) = input.image {
        parts.push(ContentPart::Image {
            mime_type: image.mime_type.clone(),
            data: image.data.clone(),
        });
    }
    messages.push(ChatMessage {
        role: ChatRole::User,
        parts,
    });

    messages
}

/// Whether a model answer is the refusal, tolerating quotes, typographic
/// apostrophes and case
pub fn is_refusal(answer: &str) -> bool {
    fn normalize(text: &str) -> String {
        text.replace(['\u{2019}', '\u{2018}'], "'")
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\u{201c}' | '\u{201d}' | '*'))
            .trim()
            .to_lowercase()
    }

    let answer = normalize(answer);
    let refusal = normalize(REFUSAL);
    answer == refusal || answer.starts_with(refusal.trim_end_matches('.'))
}
