//! Evidence assembly, grounded answering and citation auditing

pub mod answerer;
pub mod audit;
pub mod evidence;
pub mod llm;
pub mod prompt;

pub use answerer::{AnswerOutcome, GroundedAnswerer, ANSWER_TEMPERATURE};
pub use audit::{audit, audit_answer, extract_used_tags, has_citation, AuditReport};
pub use evidence::{EvidenceAssembler, EvidenceItem, EvidenceOrigin, EvidenceSet, EvidenceTag};
pub use llm::{
    data_url, ChatMessage, ChatRequest, ChatRole, ContentPart, LanguageModel, ModelError,
    OpenAiChatModel,
};
pub use prompt::{is_refusal, ImageInput, PromptInput, REFUSAL};
