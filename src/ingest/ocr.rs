//! Image text extraction
//!
//! Images in the corpus and images attached to a question are transcribed
//! by a vision-capable chat model. `NoOcr` stands in when OCR is disabled
//! or no model is configured; images then contribute no text.

use super::IngestionError;
use crate::grounding::{ChatMessage, ChatRequest, ChatRole, ContentPart, LanguageModel};
use async_trait::async_trait;
use std::sync::Arc;

const TRANSCRIPTION_PROMPT: &str = "Transcribe all text visible in this image. \
Preserve headings, numbering and table layout as plain text. \
Reply with the transcription only. If there is no text, reply with nothing.";

const MAX_TRANSCRIPTION_TOKENS: u32 = 2048;

/// Anything that can turn image bytes into text
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String, IngestionError>;

    /// Whether this engine actually reads images
    fn is_enabled(&self) -> bool {
        true
    }
}

/// OCR through a multimodal chat model
pub struct VisionOcr {
    model: Arc<dyn LanguageModel>,
}

impl VisionOcr {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn extract_text(&self, image: &[u8], mime_type: &str) -> Result<String, IngestionError> {
        let request = ChatRequest {
            messages: vec![ChatMessage {
                role: ChatRole::User,
                parts: vec![
                    ContentPart::Text(TRANSCRIPTION_PROMPT.to_string()),
                    ContentPart::Image {
                        mime_type: mime_type.to_string(),
                        data: image.to_vec(),
                    },
                ],
            }],
            temperature: 0.0,
            max_tokens: MAX_TRANSCRIPTION_TOKENS,
        };

        let text = self
            .model
            .complete(&request)
            .await
            .map_err(|e| IngestionError::Ocr(e.to_string()))?;

        tracing::debug!(
            "Transcribed {} image bytes into {} chars with {}",
            image.len(),
            text.len(),
            self.model.model_name()
        );
        Ok(text)
    }
}

/// OCR that reads nothing
pub struct NoOcr;

#[async_trait]
impl OcrEngine for NoOcr {
    async fn extract_text(&self, _image: &[u8], _mime_type: &str) -> Result<String, IngestionError> {
        Ok(String::new())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// MIME type for an image extension
pub fn image_mime_type(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
