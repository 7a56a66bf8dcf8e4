//! Side-by-side comparison of OCR engines over one upload

use crate::artifact::TempArtifact;
use crate::config::Config;
use crate::engine::{EngineKind, OcrEngine, OcrOutcome};
use crate::engines::{build_engine, EngineCatalog, EngineSettings};
use crate::error::OcrError;
use crate::export::{download_name, records_to_csv};
use crate::normalize::OcrRecord;
use crate::overlay::draw_boxes;
use crate::rasterize::{load_pages, UploadKind};
use crate::vision::{data_url, ChatCompletion};
use image::DynamicImage;
use serde::Serialize;
use std::time::Instant;

/// One upload and the engine parameters chosen for it
#[derive(Debug, Clone)]
pub struct CompareRequest {
    pub file_name: String,
    pub mime: Option<String>,
    pub data: Vec<u8>,
    pub engines: Vec<EngineKind>,
    pub settings: EngineSettings,
}

/// A file offered for download
#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub file_name: String,
    pub mime_type: &'static str,
    pub content: String,
}

/// One engine's result on one page
#[derive(Debug, Clone, Serialize)]
pub struct EngineComparison {
    pub engine: EngineKind,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Records in the engine's detection order
    pub records: Vec<OcrRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes_drawn: Option<usize>,
    /// PNG data URL of the page with this engine's boxes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_download: Option<Download>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_download: Option<Download>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageComparison {
    /// 1-based page number in the source document
    pub page: u32,
    /// `compared`, or `unsupported` for a page with no decodable image
    pub status: &'static str,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub results: Vec<EngineComparison>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub file_name: String,
    pub pages: Vec<PageComparison>,
}

/// Run every requested engine over every page of the upload, in turn
pub fn compare_upload(
    request: &CompareRequest,
    config: &Config,
    catalog: &EngineCatalog,
    vision_client: Result<&dyn ChatCompletion, String>,
) -> Result<ComparisonReport, OcrError> {
    let kind = UploadKind::detect(&request.data, &request.file_name, request.mime.as_deref());
    let pages = load_pages(&request.data, kind)?;

    let engines: Vec<Box<dyn OcrEngine + '_>> = request
        .engines
        .iter()
        .map(|&kind| {
            build_engine(kind, &request.settings, config, catalog, vision_client.clone())
        })
        .collect();

    tracing::info!(
        "Comparing {} engine(s) over {} page(s) of {}",
        engines.len(),
        pages.len(),
        request.file_name
    );

    let mut report = Vec::with_capacity(pages.len());
    for page in &pages {
        let Some(image) = &page.image else {
            report.push(PageComparison {
                page: page.number,
                status: "unsupported",
                width: 0,
                height: 0,
                message: Some(format!("Page {} has no decodable image", page.number)),
                results: Vec::new(),
            });
            continue;
        };

        let artifact = TempArtifact::from_image(image)?;
        let results = compare_page(image, &artifact, &engines, &request.file_name)?;
        report.push(PageComparison {
            page: page.number,
            status: "compared",
            width: image.width(),
            height: image.height(),
            message: None,
            results,
        });
    }

    Ok(ComparisonReport {
        file_name: request.file_name.clone(),
        pages: report,
    })
}

/// Compare engines on a single page image already written to `artifact`
pub fn compare_page(
    page: &DynamicImage,
    artifact: &TempArtifact,
    engines: &[Box<dyn OcrEngine + '_>],
    upload_name: &str,
) -> Result<Vec<EngineComparison>, OcrError> {
    let mut results = Vec::with_capacity(engines.len());

    for engine in engines {
        let start = Instant::now();
        let kind = engine.kind();
        let outcome = engine.perform_ocr(artifact.path());
        let processing_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "{}: {} with {} record(s) in {}ms",
            kind,
            outcome.status(),
            outcome.records().len(),
            processing_time_ms
        );

        results.push(summarize(kind, &outcome, page, upload_name, processing_time_ms)?);
    }

    Ok(results)
}

fn summarize(
    kind: EngineKind,
    outcome: &OcrOutcome,
    page: &DynamicImage,
    upload_name: &str,
    processing_time_ms: u64,
) -> Result<EngineComparison, OcrError> {
    let records = outcome.records().to_vec();

    let (boxes_drawn, annotated_image) = if kind.has_geometry() {
        let overlay = draw_boxes(page, &records);
        (Some(overlay.drawn), Some(png_data_url(&overlay.image)?))
    } else {
        (None, None)
    };

    let table_download = if kind.has_geometry() && outcome.is_downloadable() {
        Some(Download {
            file_name: download_name(upload_name, kind.as_str(), "csv"),
            mime_type: "text/csv",
            content: records_to_csv(&records)?,
        })
    } else {
        None
    };

    let text_download = match outcome.downloadable_text() {
        Some(text) if !kind.has_geometry() => Some(Download {
            file_name: download_name(upload_name, kind.as_str(), "txt"),
            mime_type: "text/plain",
            content: text,
        }),
        _ => None,
    };

    Ok(EngineComparison {
        engine: kind,
        status: outcome.status(),
        message: outcome.message().map(str::to_string),
        records,
        boxes_drawn,
        annotated_image,
        table_download,
        text_download,
        processing_time_ms,
    })
}

fn png_data_url(image: &image::RgbImage) -> Result<String, OcrError> {
    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| OcrError::Internal(format!("Failed to encode annotated image: {}", e)))?;
    Ok(data_url("image/png", &png))
}
