//! EasyOCR engine implementation
//!
//! EasyOCR is driven through an external helper executable that loads the
//! detector/recognizer and prints its detections as a JSON array of
//! `[polygon, text, probability]` triples on stdout.

use crate::config::EasyOcrConfig;
use crate::engine::{EngineKind, OcrEngine, OcrOutcome};
use crate::error::OcrError;
use crate::normalize::{self, OcrRecord};
use crate::process::run_with_timeout;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// EasyOCR helper adapter
pub struct EasyOcrEngine {
    program: String,
    config: EasyOcrConfig,
    timeout: Duration,
}

impl EasyOcrEngine {
    pub fn new(program: impl Into<String>, config: EasyOcrConfig, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            config,
            timeout,
        }
    }

    fn command(&self, image_path: &Path) -> Command {
        let config = &self.config;
        let mut command = Command::new(&self.program);
        command
            .args(["--languages", &config.languages.join(",")])
            .args(["--text-threshold", &config.text_threshold.to_string()])
            .args(["--low-text", &config.low_text.to_string()])
            .args(["--link-threshold", &config.link_threshold.to_string()])
            .args(["--canvas-size", &config.canvas_size.to_string()])
            .args(["--mag-ratio", &config.mag_ratio.to_string()])
            .arg(if config.gpu { "--gpu" } else { "--cpu" })
            .arg(image_path);
        command
    }

    fn run(&self, image_path: &Path) -> Result<Vec<OcrRecord>, OcrError> {
        let output = run_with_timeout(&self.program, self.command(image_path), self.timeout)?;
        if !output.stderr.trim().is_empty() {
            tracing::debug!("{} stderr: {}", self.program, output.stderr.trim());
        }
        parse_detections(&output.stdout)
    }
}

impl OcrEngine for EasyOcrEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::EasyOcr
    }

    fn perform_ocr(&self, image_path: &Path) -> OcrOutcome {
        match self.run(image_path) {
            Ok(records) => OcrOutcome::from_records(records),
            Err(OcrError::EngineUnavailable(reason)) => {
                tracing::warn!("EasyOCR unavailable: {}", reason);
                OcrOutcome::Unavailable(reason)
            }
            Err(e) => {
                tracing::warn!("Error performing EasyOCR: {}", e);
                OcrOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Normalize the helper's JSON output; malformed detections are skipped
pub fn parse_detections(stdout: &str) -> Result<Vec<OcrRecord>, OcrError> {
    let detections: Vec<Value> = serde_json::from_str(stdout.trim()).map_err(|e| {
        OcrError::MalformedRecord(format!("EasyOCR output is not a JSON array: {}", e))
    })?;

    Ok(normalize::collect_records(
        EngineKind::EasyOcr,
        detections.iter().map(normalize::from_easyocr),
    ))
}
