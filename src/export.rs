//! CSV exports offered as downloads

use crate::analysis::table::ParameterRow;
use crate::error::OcrError;
use crate::normalize::OcrRecord;
use serde::{Deserialize, Serialize};

/// The exportable subset of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConfidenceRow {
    #[serde(rename = "Text")]
    pub text: String,
    #[serde(rename = "Confidence")]
    pub confidence: Option<f32>,
}

/// `Text,Confidence` table for a record sequence, in record order
pub fn records_to_csv(records: &[OcrRecord]) -> Result<String, OcrError> {
    write_csv(records.iter().map(|r| TextConfidenceRow {
        text: r.text.clone(),
        confidence: r.confidence,
    }))
}

/// `Parameter,Value,Document` table for a combined analysis
pub fn parameters_to_csv(rows: &[ParameterRow]) -> Result<String, OcrError> {
    write_csv(rows.iter())
}

fn write_csv<T, I>(rows: I) -> Result<String, OcrError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut empty = true;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| OcrError::Internal(format!("Failed to write CSV row: {}", e)))?;
        empty = false;
    }
    if empty {
        return Ok(String::new());
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| OcrError::Internal(format!("Failed to flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| OcrError::Internal(format!("CSV is not UTF-8: {}", e)))
}

/// Download file name derived from the upload's name
pub fn download_name(upload_name: &str, suffix: &str, extension: &str) -> String {
    let stem = std::path::Path::new(upload_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    format!("{}_{}.{}", stem, suffix, extension)
}
