use crate::analysis::document_type::DocumentType;
use crate::analysis::{analyze_documents, query_document, AnalysisReport, AnalysisRequest, DocumentUpload};
use crate::artifact::TempArtifact;
use crate::compare::{compare_upload, CompareRequest, ComparisonReport};
use crate::config::{Config, EasyOcrConfig, TesseractConfig};
use crate::engine::EngineKind;
use crate::engines::{EngineCatalog, EngineInfo, EngineSettings};
use crate::error::OcrError;
use crate::rasterize::{load_first_page, UploadKind};
use crate::vision::{ChatCompletion, Unconfigured, VisionClient};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Upper bound on documents in one /analyze request
const MAX_DOCUMENTS: usize = 10;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<EngineCatalog>,
    pub vision: Arc<Result<VisionClient, String>>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub max_file_size_bytes: usize,
    pub engines: Vec<EngineInfo>,
    pub document_types: Vec<&'static str>,
}

/// Comparison response
#[derive(Serialize)]
pub struct CompareResponse {
    #[serde(flatten)]
    pub report: ComparisonReport,
    pub processing_time_ms: u64,
}

/// Document analysis response
#[derive(Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub processing_time_ms: u64,
}

/// Ad-hoc query response
#[derive(Serialize)]
pub struct QueryResponse {
    pub file_name: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let max_file_size = config.max_file_size;

    let detect_config = config.clone();
    let catalog = tokio::task::spawn_blocking(move || EngineCatalog::detect(&detect_config)).await?;
    let vision = VisionClient::new(&config.vision, config.engine_timeout).map_err(|e| e.to_string());

    let state = AppState {
        config: Arc::new(config),
        catalog: Arc::new(catalog),
        vision: Arc::new(vision),
    };

    let app = router(state, max_file_size);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_file_size: usize) -> Router {
    // Several documents may arrive in one /analyze request; each file is
    // checked against max_file_size on its own
    let body_limit = max_file_size.saturating_mul(MAX_DOCUMENTS);

    Router::new()
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .route("/compare", post(handle_compare))
        .route("/analyze", post(handle_analyze))
        .route("/query", post(handle_query))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a multipart read failure, keeping the body limit as 413
fn multipart_error(context: &str, error: MultipartError) -> OcrError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OcrError::RequestTooLarge(error.body_text())
    } else {
        OcrError::InvalidRequest(format!("{}: {}", context, error))
    }
}

/// Multipart form split into uploaded files and plain text fields
#[derive(Default)]
struct Form {
    files: Vec<DocumentUpload>,
    fields: HashMap<String, String>,
}

impl Form {
    async fn read(mut multipart: Multipart, max_file_size: usize) -> Result<Self, OcrError> {
        let mut form = Form::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("Failed to parse multipart", e))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read file data", e))?;

                if data.len() > max_file_size {
                    return Err(OcrError::ImageTooLarge {
                        size: data.len(),
                        max: max_file_size,
                    });
                }

                form.files.push(DocumentUpload {
                    file_name,
                    mime,
                    data: data.to_vec(),
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&format!("Invalid field '{}'", name), e))?;
                form.fields.insert(name, value.trim().to_string());
            }
        }

        Ok(form)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse an optional field, falling back to `default` when absent
    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, OcrError> {
        match self.text(name) {
            Some(value) => value
                .parse()
                .map_err(|_| OcrError::InvalidRequest(format!("Invalid value for {}: {}", name, value))),
            None => Ok(default),
        }
    }

    fn flag_or(&self, name: &str, default: bool) -> Result<bool, OcrError> {
        match self.text(name).map(str::to_lowercase).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes" | "on") => Ok(true),
            Some("false" | "0" | "no" | "off") => Ok(false),
            Some(other) => Err(OcrError::InvalidRequest(format!(
                "Invalid value for {}: {}",
                name, other
            ))),
        }
    }

    fn single_file(&mut self) -> Result<DocumentUpload, OcrError> {
        if self.files.len() > 1 {
            return Err(OcrError::InvalidRequest(
                "expected exactly one file".to_string(),
            ));
        }
        self.files.pop().ok_or(OcrError::MissingFile)
    }
}

/// Requested engines; all of them when the field is absent
fn requested_engines(form: &Form) -> Result<Vec<EngineKind>, OcrError> {
    let Some(list) = form.text("engines") else {
        return Ok(EngineKind::ALL.to_vec());
    };

    let mut engines = Vec::new();
    for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind = EngineKind::parse(name)
            .ok_or_else(|| OcrError::InvalidRequest(format!("Unknown engine: {}", name)))?;
        if !engines.contains(&kind) {
            engines.push(kind);
        }
    }

    if engines.is_empty() {
        return Err(OcrError::InvalidRequest("no engines selected".to_string()));
    }
    Ok(engines)
}

fn engine_settings(form: &Form) -> Result<EngineSettings, OcrError> {
    let tesseract_defaults = TesseractConfig::default();
    let tesseract = TesseractConfig::new(
        form.parse_or("psm", tesseract_defaults.psm)?,
        form.parse_or("oem", tesseract_defaults.oem)?,
        form.text("lang").unwrap_or(&tesseract_defaults.lang),
        form.text("tesseract_flags").unwrap_or_default(),
        form.parse_or("min_conf", tesseract_defaults.min_conf)?,
    )?;

    let easyocr_defaults = EasyOcrConfig::default();
    let languages = match form.text("easyocr_languages") {
        Some(list) => list.split(',').map(str::to_string).collect(),
        None => easyocr_defaults.languages.clone(),
    };
    let easyocr = EasyOcrConfig::new(
        languages,
        form.flag_or("gpu", easyocr_defaults.gpu)?,
        form.parse_or("text_threshold", easyocr_defaults.text_threshold)?,
        form.parse_or("low_text", easyocr_defaults.low_text)?,
        form.parse_or("link_threshold", easyocr_defaults.link_threshold)?,
        form.parse_or("canvas_size", easyocr_defaults.canvas_size)?,
        form.parse_or("mag_ratio", easyocr_defaults.mag_ratio)?,
    )?;

    Ok(EngineSettings { tesseract, easyocr })
}

async fn run_blocking<T, F>(task: F) -> Result<T, OcrError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OcrError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| OcrError::Internal(format!("Worker task failed: {}", e)))?
}

/// Handle engine comparison requests
async fn handle_compare(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CompareResponse>, OcrError> {
    let start = Instant::now();

    let mut form = Form::read(multipart, state.config.max_file_size).await?;
    let upload = form.single_file()?;
    let engines = requested_engines(&form)?;
    let settings = engine_settings(&form)?;

    let request = CompareRequest {
        file_name: upload.file_name,
        mime: upload.mime,
        data: upload.data,
        engines,
        settings,
    };

    let report = run_blocking(move || {
        let vision = state.vision.as_ref().as_ref().map(|c| c as &dyn ChatCompletion);
        compare_upload(
            &request,
            &state.config,
            &state.catalog,
            vision.map_err(String::clone),
        )
    })
    .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Comparison of {} completed in {}ms ({} page(s))",
        report.file_name,
        processing_time_ms,
        report.pages.len()
    );

    Ok(Json(CompareResponse {
        report,
        processing_time_ms,
    }))
}

/// Handle document analysis requests
async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, OcrError> {
    let start = Instant::now();

    let form = Form::read(multipart, state.config.max_file_size).await?;

    let document_type = form
        .text("document_type")
        .ok_or_else(|| OcrError::InvalidRequest("document_type is required".to_string()))
        .and_then(|name| {
            DocumentType::parse(name)
                .ok_or_else(|| OcrError::InvalidRequest(format!("Unknown document type: {}", name)))
        })?;

    if form.files.len() > MAX_DOCUMENTS {
        return Err(OcrError::InvalidRequest(format!(
            "at most {} documents per request",
            MAX_DOCUMENTS
        )));
    }

    let question = form.text("question").map(str::to_string);
    let query_document: usize = form.parse_or("query_document", 1)?;
    if query_document == 0 {
        return Err(OcrError::InvalidRequest(
            "query_document is 1-based".to_string(),
        ));
    }

    let request = AnalysisRequest {
        document_type,
        documents: form.files,
        question,
        query_document: query_document - 1,
    };

    let report = run_blocking(move || match state.vision.as_ref() {
        Ok(client) => analyze_documents(&request, client),
        Err(reason) => analyze_documents(&request, &Unconfigured(reason.clone())),
    })
    .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Analysis of {} document(s) completed in {}ms, {} parameter row(s)",
        report.documents.len(),
        processing_time_ms,
        report.parameters.len()
    );

    Ok(Json(AnalyzeResponse {
        report,
        processing_time_ms,
    }))
}

/// Handle ad-hoc questions about one document
async fn handle_query(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<QueryResponse>, OcrError> {
    let start = Instant::now();

    let mut form = Form::read(multipart, state.config.max_file_size).await?;
    let upload = form.single_file()?;
    let question = form
        .text("question")
        .ok_or_else(|| OcrError::InvalidRequest("question is required".to_string()))?
        .to_string();

    let file_name = upload.file_name.clone();
    let asked = question.clone();
    let result = run_blocking(move || {
        let kind = UploadKind::detect(&upload.data, &upload.file_name, upload.mime.as_deref());
        let page = load_first_page(&upload.data, kind)?;
        let artifact = TempArtifact::from_image(&page)?;
        let answer = match state.vision.as_ref() {
            Ok(client) => query_document(client, artifact.path(), &asked),
            Err(reason) => Err(OcrError::EngineUnavailable(reason.clone())),
        };
        Ok(answer)
    })
    .await?;

    if let Err(e) = &result {
        tracing::error!("Error answering query about {}: {}", file_name, e);
    }

    Ok(Json(QueryResponse {
        file_name,
        question,
        answer: result.as_ref().ok().cloned(),
        error: result.err().map(|e| e.to_string()),
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        max_file_size_bytes: state.config.max_file_size,
        engines: state.catalog.info().to_vec(),
        document_types: DocumentType::ALL.iter().map(|t| t.label()).collect(),
    })
}
