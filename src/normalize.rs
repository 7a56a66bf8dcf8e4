//! Engine-agnostic OCR records
//!
//! Each adapter converts its native output into [`OcrRecord`]s through the
//! functions here. Conversion is per detection: a detection that cannot be
//! converted yields a [`SkipReason`] and its siblings are unaffected.

use crate::engine::EngineKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Axis-aligned box anchored at the top-left corner, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One recognized text span.
///
/// Engines without spatial data leave `confidence` and `bounding_box` unset,
/// which serializes as `null` rather than a zeroed box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrRecord {
    pub text: String,
    pub confidence: Option<f32>,
    pub bounding_box: Option<BoundingBox>,
    pub source_engine: EngineKind,
}

/// Why a single native detection was left out of the normalized sequence
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("empty text")]
    EmptyText,

    #[error("confidence {confidence} at or below minimum {min_conf}")]
    LowConfidence { confidence: f32, min_conf: f32 },

    #[error("malformed detection: {0}")]
    Malformed(String),
}

/// A Tesseract word as reported by its TSV output
#[derive(Debug, Clone, PartialEq)]
pub struct TesseractToken {
    pub text: String,
    /// Native 0-100 confidence; -1 for non-word rows
    pub conf: f32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

/// Convert a Tesseract token, applying the adapter's filtering rules
pub fn from_tesseract(token: TesseractToken, min_conf: f32) -> Result<OcrRecord, SkipReason> {
    if token.conf.is_nan() {
        return Err(SkipReason::Malformed("confidence is not a number".to_string()));
    }

    let confidence = token.conf / 100.0;
    if token.text.trim().is_empty() {
        return Err(SkipReason::EmptyText);
    }
    if confidence <= min_conf {
        return Err(SkipReason::LowConfidence {
            confidence,
            min_conf,
        });
    }
    if token.width < 0 || token.height < 0 {
        return Err(SkipReason::Malformed(format!(
            "negative size {}x{}",
            token.width, token.height
        )));
    }

    Ok(OcrRecord {
        text: token.text,
        confidence: Some(confidence.clamp(0.0, 1.0)),
        bounding_box: Some(BoundingBox::new(
            token.left,
            token.top,
            token.width as u32,
            token.height as u32,
        )),
        source_engine: EngineKind::Tesseract,
    })
}

/// Convert one EasyOCR detection of the form `[polygon, text, probability]`.
///
/// The box is the axis-aligned hull of the polygon's vertices.
pub fn from_easyocr(detection: &Value) -> Result<OcrRecord, SkipReason> {
    let parts = detection
        .as_array()
        .filter(|parts| parts.len() >= 3)
        .ok_or_else(|| SkipReason::Malformed("expected [polygon, text, probability]".to_string()))?;

    let text = parts[1]
        .as_str()
        .ok_or_else(|| SkipReason::Malformed("text is not a string".to_string()))?;
    if text.trim().is_empty() {
        return Err(SkipReason::EmptyText);
    }

    let probability = parts[2]
        .as_f64()
        .ok_or_else(|| SkipReason::Malformed("probability is not a number".to_string()))?;

    let bounding_box = polygon_bounds(&parts[0])?;

    Ok(OcrRecord {
        text: text.to_string(),
        confidence: Some((probability as f32).clamp(0.0, 1.0)),
        bounding_box: Some(bounding_box),
        source_engine: EngineKind::EasyOcr,
    })
}

/// `(min_x, min_y, max_x - min_x, max_y - min_y)` over a polygon's vertices
fn polygon_bounds(polygon: &Value) -> Result<BoundingBox, SkipReason> {
    let vertices = polygon
        .as_array()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SkipReason::Malformed("polygon has no vertices".to_string()))?;

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for vertex in vertices {
        let (x, y) = match vertex.as_array().map(|v| v.as_slice()) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => {
                    return Err(SkipReason::Malformed(format!(
                        "non-numeric vertex {}",
                        vertex
                    )))
                }
            },
            _ => {
                return Err(SkipReason::Malformed(format!(
                    "vertex is not a point: {}",
                    vertex
                )))
            }
        };
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    // Truncate each extreme to whole pixels before taking the size
    let (min_x, min_y) = (min_x.trunc() as i32, min_y.trunc() as i32);
    let (max_x, max_y) = (max_x.trunc() as i32, max_y.trunc() as i32);

    Ok(BoundingBox::new(
        min_x,
        min_y,
        max_x.saturating_sub(min_x).max(0) as u32,
        max_y.saturating_sub(min_y).max(0) as u32,
    ))
}

/// A vision-model reply; no spatial data or confidence is available
pub fn from_vision(text: &str) -> OcrRecord {
    OcrRecord {
        text: text.to_string(),
        confidence: None,
        bounding_box: None,
        source_engine: EngineKind::Vision,
    }
}

/// Keep converted records in detection order, logging every skipped one
pub fn collect_records<I>(engine: EngineKind, converted: I) -> Vec<OcrRecord>
where
    I: IntoIterator<Item = Result<OcrRecord, SkipReason>>,
{
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, item) in converted.into_iter().enumerate() {
        match item {
            Ok(record) => records.push(record),
            Err(reason) => {
                skipped += 1;
                tracing::debug!("{}: skipping detection {}: {}", engine, index, reason);
            }
        }
    }

    tracing::debug!("{}: kept {} records, skipped {}", engine, records.len(), skipped);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(text: &str, conf: f32) -> TesseractToken {
        TesseractToken {
            text: text.to_string(),
            conf,
            left: 10,
            top: 10,
            width: 50,
            height: 20,
        }
    }

    #[test]
    fn test_tesseract_confidence_is_scaled() {
        for native in [1.0_f32, 42.5, 92.0, 100.0] {
            let record = from_tesseract(token("word", native), 0.0).unwrap();
            let confidence = record.confidence.unwrap();
            assert!((0.0..=1.0).contains(&confidence));
            assert!((confidence - native / 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tesseract_empty_text_dropped_regardless_of_confidence() {
        assert_eq!(from_tesseract(token("", 99.0), 0.0), Err(SkipReason::EmptyText));
        assert_eq!(from_tesseract(token("  \t", 99.0), 0.0), Err(SkipReason::EmptyText));
    }

    #[test]
    fn test_tesseract_min_confidence_is_exclusive() {
        assert!(matches!(
            from_tesseract(token("word", 50.0), 0.5),
            Err(SkipReason::LowConfidence { .. })
        ));
        assert!(from_tesseract(token("word", 51.0), 0.5).is_ok());
        // Non-word rows carry -1
        assert!(from_tesseract(token("word", -1.0), 0.0).is_err());
    }

    #[test]
    fn test_tesseract_keeps_interior_whitespace() {
        let record = from_tesseract(token(" two  words ", 80.0), 0.0).unwrap();
        assert_eq!(record.text, " two  words ");
        assert_eq!(record.bounding_box, Some(BoundingBox::new(10, 10, 50, 20)));
    }

    #[test]
    fn test_easyocr_box_is_polygon_hull() {
        let detection = json!([[[12.7, 5.0], [60.2, 8.0], [61.9, 30.5], [10.1, 28.0]], "Total", 0.87]);
        let record = from_easyocr(&detection).unwrap();
        assert_eq!(record.bounding_box, Some(BoundingBox::new(10, 5, 51, 25)));
        assert_eq!(record.source_engine, EngineKind::EasyOcr);
        assert!((record.confidence.unwrap() - 0.87).abs() < 1e-6);
    }

    #[test]
    fn test_easyocr_degenerate_polygon_has_zero_size() {
        let detection = json!([[[4, 4], [4, 4]], "dot", 0.5]);
        let record = from_easyocr(&detection).unwrap();
        assert_eq!(record.bounding_box, Some(BoundingBox::new(4, 4, 0, 0)));
    }

    #[test]
    fn test_easyocr_malformed_vertex_is_skipped() {
        let detection = json!([[[1, 2], ["a", 3], [5, 6]], "bad", 0.9]);
        assert!(matches!(from_easyocr(&detection), Err(SkipReason::Malformed(_))));

        let detection = json!([[], "bad", 0.9]);
        assert!(matches!(from_easyocr(&detection), Err(SkipReason::Malformed(_))));

        let detection = json!([[[1, 2]], "bad", "high"]);
        assert!(matches!(from_easyocr(&detection), Err(SkipReason::Malformed(_))));
    }

    #[test]
    fn test_vision_record_has_no_geometry() {
        let record = from_vision("Hello");
        assert!(record.bounding_box.is_none());
        assert!(record.confidence.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["bounding_box"].is_null());
        assert!(json["confidence"].is_null());
    }

    #[test]
    fn test_collect_records_keeps_order_and_drops_skips() {
        let converted = vec![
            from_tesseract(token("first", 90.0), 0.0),
            from_tesseract(token("", 90.0), 0.0),
            from_tesseract(token("second", 80.0), 0.0),
        ];
        let records = collect_records(EngineKind::Tesseract, converted);
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }
}
