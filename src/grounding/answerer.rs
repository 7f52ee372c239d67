//! Grounded answering: one model call constrained to the evidence

use crate::config::LlmConfig;
use crate::grounding::audit::has_citation;
use crate::grounding::prompt::{build_messages, is_refusal, PromptInput, REFUSAL};
use crate::grounding::{ChatRequest, LanguageModel, ModelError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Grounded answers are always requested at temperature 0
pub const ANSWER_TEMPERATURE: f32 = 0.0;

/// Outcome of one grounded answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnswerOutcome {
    Answered {
        text: String,
        /// The single evidence tag was appended because the model cited nothing
        auto_cited: bool,
    },
    Refused { text: String },
}

impl AnswerOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Answered { text, .. } | Self::Refused { text } => text,
        }
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }

    fn refused() -> Self {
        Self::Refused {
            text: REFUSAL.to_string(),
        }
    }
}

/// Invokes the language model under the grounding instruction
pub struct GroundedAnswerer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_tokens: u32,
    context_turns: usize,
}

impl GroundedAnswerer {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            model,
            timeout,
            max_tokens,
            context_turns: 0,
        }
    }

    pub fn from_config(model: Arc<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self::new(model, Duration::from_secs(config.timeout_secs), config.max_tokens)
            .with_context_turns(config.context_turns)
    }

    /// Number of earlier history messages sent with each question
    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Answer a question from the prepared evidence
    ///
    /// Without evidence, facts, OCR text or an image the refusal is returned
    /// without calling the model. A call exceeding the timeout fails with
    /// [`ModelError::Timeout`].
    pub async fn answer(&self, input: &PromptInput<'_>) -> Result<AnswerOutcome, ModelError> {
        let has_ocr = input.ocr_text.is_some_and(|t| !t.trim().is_empty());
        if !input.evidence.has_support() && !has_ocr && input.image.is_none() {
            tracing::debug!("No evidence, facts or image; refusing without a model call");
            return Ok(AnswerOutcome::refused());
        }

        let mut prompt = *input;
        if prompt.image.is_some() && !self.model.supports_images() {
            tracing::warn!(
                "Model {} does not accept images; sending OCR text only",
                self.model.model_name()
            );
            prompt.image = None;
        }

        let request = ChatRequest {
            messages: build_messages(&prompt, self.context_turns),
            temperature: ANSWER_TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            "Asking {} with {} evidence items and {} facts",
            self.model.model_name(),
            input.evidence.items.len(),
            input.evidence.facts.len()
        );

        let raw = tokio::time::timeout(self.timeout, self.model.complete(&request))
            .await
            .map_err(|_| ModelError::Timeout(self.timeout))??;

        if is_refusal(&raw) {
            return Ok(AnswerOutcome::refused());
        }

        // Only a lone evidence item is credited automatically
        if let [only] = input.evidence.items.as_slice() {
            if !has_citation(&raw) {
                return Ok(AnswerOutcome::Answered {
                    text: format!("{} [{}]", raw.trim_end(), only.tag),
                    auto_cited: true,
                });
            }
        }

        Ok(AnswerOutcome::Answered {
            text: raw,
            auto_cited: false,
        })
    }
}
