//! Financial document analysis
//!
//! A batch of documents of one type is rasterized (first page only), sent to
//! the vision model with the type's extraction prompt, and the replies parsed
//! into parameter tables. Accepted tables are concatenated into one table with
//! a `Document` column. A document that fails or whose reply lacks the
//! required columns is reported on its own and the rest of the batch goes on.

pub mod document_type;
pub mod table;

use crate::artifact::TempArtifact;
use crate::compare::Download;
use crate::error::OcrError;
use crate::export::parameters_to_csv;
use crate::rasterize::{load_first_page, UploadKind};
use crate::vision::{ChatCompletion, CompletionOptions};
use document_type::DocumentType;
use serde::Serialize;
use std::path::Path;
use table::{combine, common_parameters, document_label, ParameterRow, ParameterTable};

const QUERY_OPTIONS: CompletionOptions = CompletionOptions {
    max_tokens: Some(500),
    temperature: Some(0.3),
};

/// Where a document got to in extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    Idle,
    Rasterized,
    Extracted,
    TableValid,
    TableRejected,
}

/// One uploaded document
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub mime: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub document_type: DocumentType,
    pub documents: Vec<DocumentUpload>,
    pub question: Option<String>,
    /// Zero-based index of the document the question is about
    pub query_document: usize,
}

/// Per-document result
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub file_name: String,
    pub label: String,
    pub state: ExtractionState,
    pub parameters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub file_name: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub document_type: DocumentType,
    pub documents: Vec<DocumentReport>,
    pub parameters: Vec<ParameterRow>,
    pub common_parameters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<Download>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryReport>,
}

/// Extracts a parameter table from one document image
pub struct ParameterExtractor<'a> {
    service: &'a dyn ChatCompletion,
    document_type: DocumentType,
    state: ExtractionState,
}

impl<'a> ParameterExtractor<'a> {
    pub fn new(service: &'a dyn ChatCompletion, document_type: DocumentType) -> Self {
        Self {
            service,
            document_type,
            state: ExtractionState::Idle,
        }
    }

    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Rasterize the first page of `upload` into a temp image
    pub fn rasterize(&mut self, upload: &DocumentUpload) -> Result<TempArtifact, OcrError> {
        let kind = UploadKind::detect(&upload.data, &upload.file_name, upload.mime.as_deref());
        let page = load_first_page(&upload.data, kind)?;
        let artifact = TempArtifact::from_image(&page)?;
        self.state = ExtractionState::Rasterized;
        Ok(artifact)
    }

    /// Ask the model for the parameters and validate the reply's columns
    pub fn extract(&mut self, image_path: &Path) -> Result<ParameterTable, OcrError> {
        let reply = self.service.complete(
            &self.document_type.prompt(),
            image_path,
            CompletionOptions::default(),
        )?;
        self.state = ExtractionState::Extracted;

        match ParameterTable::parse(&reply) {
            Ok(table) => {
                self.state = ExtractionState::TableValid;
                Ok(table)
            }
            Err(e) => {
                self.state = ExtractionState::TableRejected;
                Err(e)
            }
        }
    }
}

/// Answer a free-form question about one document image
pub fn query_document(
    service: &dyn ChatCompletion,
    image_path: &Path,
    question: &str,
) -> Result<String, OcrError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(OcrError::InvalidRequest("question must not be empty".to_string()));
    }
    service.complete(question, image_path, QUERY_OPTIONS)
}

/// Analyze a batch of documents of one type
pub fn analyze_documents(
    request: &AnalysisRequest,
    service: &dyn ChatCompletion,
) -> Result<AnalysisReport, OcrError> {
    if request.documents.is_empty() {
        return Err(OcrError::MissingFile);
    }
    if request.question.is_some() && request.query_document >= request.documents.len() {
        return Err(OcrError::InvalidRequest(format!(
            "query_document must be between 1 and {}",
            request.documents.len()
        )));
    }

    let batch_size = request.documents.len();
    tracing::info!(
        "Analyzing {} {} document(s)",
        batch_size,
        request.document_type.label()
    );

    // Kept alive until the batch is done so the query can reuse them
    let mut artifacts: Vec<Option<TempArtifact>> = Vec::with_capacity(batch_size);
    let mut accepted: Vec<(String, ParameterTable)> = Vec::new();
    let mut reports = Vec::with_capacity(batch_size);

    for upload in &request.documents {
        let label = document_label(&upload.file_name, batch_size);
        let mut extractor = ParameterExtractor::new(service, request.document_type);
        let mut report = DocumentReport {
            file_name: upload.file_name.clone(),
            label: label.clone(),
            state: ExtractionState::Idle,
            parameters: 0,
            warning: None,
            error: None,
        };

        let artifact = match extractor.rasterize(upload) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::error!("Error processing {}: {}", upload.file_name, e);
                report.error = Some(e.to_string());
                None
            }
        };

        if let Some(artifact) = &artifact {
            match extractor.extract(artifact.path()) {
                Ok(table) => {
                    report.parameters = table.len();
                    accepted.push((label, table));
                }
                Err(OcrError::SchemaMismatch(reason)) => {
                    tracing::warn!(
                        "Extracted data for {} does not have the required columns: {}",
                        upload.file_name,
                        reason
                    );
                    report.warning = Some(format!(
                        "Extracted data does not have the required columns: {}",
                        reason
                    ));
                }
                Err(e) => {
                    tracing::error!("Error processing {}: {}", upload.file_name, e);
                    report.error = Some(e.to_string());
                }
            }
        }

        report.state = extractor.state();
        reports.push(report);
        artifacts.push(artifact);
    }

    let parameters = combine(
        accepted
            .iter()
            .map(|(label, table)| (label.as_str(), table)),
    );
    let common = common_parameters(&parameters);

    let download = if parameters.is_empty() {
        None
    } else {
        Some(Download {
            file_name: format!("{}_parameters.csv", request.document_type.file_stem()),
            mime_type: "text/csv",
            content: parameters_to_csv(&parameters)?,
        })
    };

    let query = request.question.as_deref().map(|question| {
        let index = request.query_document;
        let upload = &request.documents[index];
        let result = match &artifacts[index] {
            Some(artifact) => query_document(service, artifact.path(), question),
            None => Err(OcrError::UnsupportedFormat(format!(
                "{} could not be rasterized",
                upload.file_name
            ))),
        };
        if let Err(e) = &result {
            tracing::error!("Error answering query about {}: {}", upload.file_name, e);
        }
        QueryReport {
            file_name: upload.file_name.clone(),
            question: question.to_string(),
            answer: result.as_ref().ok().cloned(),
            error: result.err().map(|e| e.to_string()),
        }
    });

    Ok(AnalysisReport {
        document_type: request.document_type,
        documents: reports,
        parameters,
        common_parameters: common,
        download,
        query,
    })
}
