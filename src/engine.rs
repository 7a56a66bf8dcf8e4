use crate::normalize::OcrRecord;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// The OCR back-ends that can be compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Tesseract,
    #[serde(rename = "easyocr")]
    EasyOcr,
    Vision,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Tesseract, EngineKind::EasyOcr, EngineKind::Vision];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::EasyOcr => "easyocr",
            Self::Vision => "vision",
        }
    }

    /// Parse an engine name as it appears in requests
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Some(Self::Tesseract),
            "easyocr" => Some(Self::EasyOcr),
            "vision" | "llama" | "llamaocr" => Some(Self::Vision),
            _ => None,
        }
    }

    /// Whether this engine reports per-span geometry
    pub fn has_geometry(&self) -> bool {
        !matches!(self, Self::Vision)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one adapter invocation.
///
/// Adapters never fail past their own boundary; every failure mode is one of
/// these variants so callers can tell them apart without comparing strings.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    /// Recognized spans in the engine's native detection order
    Recognized(Vec<OcrRecord>),
    /// The engine ran and found no text
    NoText,
    /// The engine could not be initialized (missing binary, credentials, ...)
    Unavailable(String),
    /// The engine was invoked and failed or timed out
    Failed(String),
}

impl OcrOutcome {
    /// Wrap a record sequence, collapsing an empty one into `NoText`
    pub fn from_records(records: Vec<OcrRecord>) -> Self {
        if records.is_empty() {
            Self::NoText
        } else {
            Self::Recognized(records)
        }
    }

    /// Records for display and export; empty for every non-content outcome
    pub fn records(&self) -> &[OcrRecord] {
        match self {
            Self::Recognized(records) => records,
            _ => &[],
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Recognized(_) => "recognized",
            Self::NoText => "no_text",
            Self::Unavailable(_) => "unavailable",
            Self::Failed(_) => "failed",
        }
    }

    /// Human-readable reason for a non-content outcome
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Recognized(_) => None,
            Self::NoText => Some("No text found."),
            Self::Unavailable(reason) | Self::Failed(reason) => Some(reason),
        }
    }

    /// Whether a download should be offered for this outcome
    pub fn is_downloadable(&self) -> bool {
        !self.records().is_empty()
    }

    /// Concatenated text of all records, only for genuine content
    pub fn downloadable_text(&self) -> Option<String> {
        if !self.is_downloadable() {
            return None;
        }
        let text = self
            .records()
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Some(text)
    }
}

/// Trait that all OCR adapters implement
pub trait OcrEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Run OCR over one image file.
    ///
    /// Failures are reported through the outcome and logged, never raised.
    fn perform_ocr(&self, image_path: &Path) -> OcrOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::BoundingBox;

    fn record(text: &str) -> OcrRecord {
        OcrRecord {
            text: text.to_string(),
            confidence: Some(0.9),
            bounding_box: Some(BoundingBox::new(0, 0, 4, 4)),
            source_engine: EngineKind::Tesseract,
        }
    }

    #[test]
    fn test_empty_records_become_no_text() {
        assert_eq!(OcrOutcome::from_records(Vec::new()), OcrOutcome::NoText);
    }

    #[test]
    fn test_non_content_outcomes_are_not_downloadable() {
        for outcome in [
            OcrOutcome::NoText,
            OcrOutcome::Unavailable("missing API key".to_string()),
            OcrOutcome::Failed("image not found".to_string()),
        ] {
            assert!(outcome.records().is_empty());
            assert!(!outcome.is_downloadable());
            assert!(outcome.downloadable_text().is_none());
            assert!(outcome.message().is_some());
        }
    }

    #[test]
    fn test_statuses_are_distinct() {
        let statuses = [
            OcrOutcome::Recognized(vec![record("a")]).status(),
            OcrOutcome::NoText.status(),
            OcrOutcome::Unavailable(String::new()).status(),
            OcrOutcome::Failed(String::new()).status(),
        ];
        for (i, a) in statuses.iter().enumerate() {
            for b in &statuses[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_downloadable_text_joins_records() {
        let outcome = OcrOutcome::Recognized(vec![record("Invoice"), record("Total")]);
        assert_eq!(outcome.downloadable_text().as_deref(), Some("Invoice\nTotal"));
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!(EngineKind::parse(" EasyOCR "), Some(EngineKind::EasyOcr));
        assert_eq!(EngineKind::parse("vision"), Some(EngineKind::Vision));
        assert_eq!(EngineKind::parse("paddle"), None);
    }
}
