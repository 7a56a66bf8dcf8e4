//! Blocking client for an OpenAI-style chat-completion endpoint with image input
//!
//! Shared by the vision OCR adapter, the document parameter extractor and the
//! ad-hoc document query.

use crate::config::VisionSettings;
use crate::error::OcrError;
use base64::{prelude::BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sampling options for one completion
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A chat-completion service that accepts one prompt and one image
pub trait ChatCompletion: Send + Sync {
    /// Send `prompt` together with the image at `image_path`; return the reply text
    fn complete(
        &self,
        prompt: &str,
        image_path: &Path,
        options: CompletionOptions,
    ) -> Result<String, OcrError>;
}

/// Vision-language model client
pub struct VisionClient {
    agent: ureq::Agent,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl VisionClient {
    /// Build a client, or report why the vision service cannot be used
    pub fn new(settings: &VisionSettings, timeout: Duration) -> Result<Self, OcrError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            OcrError::EngineUnavailable("no API key configured for the vision service".to_string())
        })?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            agent,
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
            timeout,
        })
    }

    fn transport_error(&self, error: ureq::Error) -> OcrError {
        match error {
            ureq::Error::Timeout(_) => OcrError::Timeout(self.timeout),
            ureq::Error::StatusCode(code) => {
                OcrError::EngineInvocation(format!("Vision service returned HTTP {}", code))
            }
            other => OcrError::EngineInvocation(format!("Vision request failed: {}", other)),
        }
    }
}

impl ChatCompletion for VisionClient {
    fn complete(
        &self,
        prompt: &str,
        image_path: &Path,
        options: CompletionOptions,
    ) -> Result<String, OcrError> {
        let image_url = image_data_url(image_path)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ],
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        tracing::debug!("Sending chat completion to {} (model {})", self.api_url, self.model);

        let mut response = self
            .agent
            .post(&self.api_url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(&request)
            .map_err(|e| self.transport_error(e))?;

        let reply: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| OcrError::EngineInvocation(format!("Invalid completion response: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OcrError::EngineInvocation("Completion contained no message".to_string()))
    }
}

/// Stand-in service used when the vision endpoint is not configured
pub struct Unconfigured(pub String);

impl ChatCompletion for Unconfigured {
    fn complete(
        &self,
        _prompt: &str,
        _image_path: &Path,
        _options: CompletionOptions,
    ) -> Result<String, OcrError> {
        Err(OcrError::EngineUnavailable(self.0.clone()))
    }
}

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(data))
}

/// Read an image file into a `data:` URL, typed by its format
fn image_data_url(path: &Path) -> Result<String, OcrError> {
    let data = std::fs::read(path).map_err(|e| {
        OcrError::EngineInvocation(format!("Image not found at {}: {}", path.display(), e))
    })?;

    let mime_type = image::guess_format(&data)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg");

    Ok(data_url(mime_type, &data))
}
