//! OCR engine adapters
//!
//! One adapter per back-end, all behind the `OcrEngine` trait. Adapters are
//! built per request from that request's parameters; only the catalog of
//! what is installed is process-wide.

pub mod easyocr;
pub mod tesseract;
pub mod vision;

use crate::config::{Config, EasyOcrConfig, TesseractConfig};
use crate::engine::{EngineKind, OcrEngine, OcrOutcome};
use crate::process::run_with_timeout;
use crate::vision::{ChatCompletion, VisionClient};
use serde::Serialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Information about an engine and whether it can be used
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Availability of every engine, checked once at startup
pub struct EngineCatalog {
    engines: Vec<EngineInfo>,
}

impl EngineCatalog {
    pub fn detect(config: &Config) -> Self {
        let engines = EngineKind::ALL
            .iter()
            .map(|&kind| {
                let result = match kind {
                    EngineKind::Tesseract => check_command(&config.tesseract_cmd),
                    EngineKind::EasyOcr => check_command(&config.easyocr_cmd),
                    EngineKind::Vision => VisionClient::new(&config.vision, config.engine_timeout)
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                };

                match &result {
                    Ok(()) => tracing::info!("{} engine available", kind),
                    Err(reason) => tracing::warn!("{} engine unavailable: {}", kind, reason),
                }

                EngineInfo {
                    name: kind.as_str(),
                    description: description(kind),
                    available: result.is_ok(),
                    reason: result.err(),
                }
            })
            .collect();

        Self { engines }
    }

    pub fn info(&self) -> &[EngineInfo] {
        &self.engines
    }

    /// Why `kind` was found unusable at startup, if it was
    pub fn unavailable_reason(&self, kind: EngineKind) -> Option<&str> {
        self.engines
            .iter()
            .find(|e| e.name == kind.as_str() && !e.available)
            .map(|e| e.reason.as_deref().unwrap_or("not available"))
    }
}

fn description(kind: EngineKind) -> &'static str {
    match kind {
        EngineKind::Tesseract => "Tesseract OCR - per-word boxes and confidence",
        EngineKind::EasyOcr => "EasyOCR neural detector/recognizer - polygon detections",
        EngineKind::Vision => "Vision-language model transcription - text only, no geometry",
    }
}

fn check_command(program: &str) -> Result<(), String> {
    let mut command = Command::new(program);
    command.arg("--version");
    run_with_timeout(program, command, DETECT_TIMEOUT)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Engine parameters supplied with one request
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub tesseract: TesseractConfig,
    pub easyocr: EasyOcrConfig,
}

/// Stands in for an engine startup found unusable
struct UnavailableEngine {
    kind: EngineKind,
    reason: String,
}

impl OcrEngine for UnavailableEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn perform_ocr(&self, _image_path: &Path) -> OcrOutcome {
        OcrOutcome::Unavailable(self.reason.clone())
    }
}

/// Build the adapter for `kind` with this request's settings
pub fn build_engine<'a>(
    kind: EngineKind,
    settings: &EngineSettings,
    config: &Config,
    catalog: &EngineCatalog,
    vision_client: Result<&'a dyn ChatCompletion, String>,
) -> Box<dyn OcrEngine + 'a> {
    if let Some(reason) = catalog.unavailable_reason(kind) {
        return Box::new(UnavailableEngine {
            kind,
            reason: reason.to_string(),
        });
    }

    match kind {
        EngineKind::Tesseract => Box::new(tesseract::TesseractEngine::new(
            config.tesseract_cmd.clone(),
            settings.tesseract.clone(),
            config.engine_timeout,
        )),
        EngineKind::EasyOcr => Box::new(easyocr::EasyOcrEngine::new(
            config.easyocr_cmd.clone(),
            settings.easyocr.clone(),
            config.engine_timeout,
        )),
        EngineKind::Vision => Box::new(vision::VisionOcrEngine::new(vision_client)),
    }
}
