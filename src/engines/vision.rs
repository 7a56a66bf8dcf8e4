//! Vision-language model OCR
//!
//! Sends the whole image with a fixed transcription prompt and returns the
//! reply as a single record without geometry.

use crate::engine::{EngineKind, OcrEngine, OcrOutcome};
use crate::error::OcrError;
use crate::normalize;
use crate::vision::{ChatCompletion, CompletionOptions};
use std::path::Path;

/// Reply the model is instructed to give for an image without text
pub const NO_TEXT_SENTINEL: &str = "No text found.";

const OCR_PROMPT: &str = "Extract text from the image. Return the text exactly as it appears in \
the image but with proper formatting. If no text is found, return \"No text found.\"";

/// Vision OCR adapter
pub struct VisionOcrEngine<'a> {
    client: Result<&'a dyn ChatCompletion, String>,
}

impl<'a> VisionOcrEngine<'a> {
    /// `client` is `Err` with the reason when the service could not be set up
    pub fn new(client: Result<&'a dyn ChatCompletion, String>) -> Self {
        Self { client }
    }
}

impl OcrEngine for VisionOcrEngine<'_> {
    fn kind(&self) -> EngineKind {
        EngineKind::Vision
    }

    fn perform_ocr(&self, image_path: &Path) -> OcrOutcome {
        let client = match &self.client {
            Ok(client) => client,
            Err(reason) => return OcrOutcome::Unavailable(reason.clone()),
        };

        match client.complete(OCR_PROMPT, image_path, CompletionOptions::default()) {
            Ok(reply) => interpret_reply(&reply),
            Err(OcrError::EngineUnavailable(reason)) => OcrOutcome::Unavailable(reason),
            Err(e) => {
                tracing::warn!("Error performing vision OCR: {}", e);
                OcrOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Whether a reply is the model's "no text" answer rather than content
pub fn is_no_text_reply(reply: &str) -> bool {
    let reply = reply.trim().trim_end_matches('.').trim();
    reply.eq_ignore_ascii_case(NO_TEXT_SENTINEL.trim_end_matches('.'))
}

fn interpret_reply(reply: &str) -> OcrOutcome {
    let text = reply.trim();
    if text.is_empty() || is_no_text_reply(text) {
        return OcrOutcome::NoText;
    }
    OcrOutcome::Recognized(vec![normalize::from_vision(text)])
}
