use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use std::net::TcpStream;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9400);

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EngineInfo {
    name: String,
    description: String,
    available: bool,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InfoResponse {
    version: String,
    max_file_size_bytes: usize,
    engines: Vec<EngineInfo>,
    document_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct ErrorResponse {
    error: String,
    code: String,
}

struct TestServer {
    child: Child,
    port: u16,
}

impl TestServer {
    /// Start the server with every engine pointed at something that is not there
    fn start() -> Self {
        Self::start_with(&[])
    }

    fn start_with(extra_args: &[&str]) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);

        let child = Command::new(env!("CARGO_BIN_EXE_ocr-comparator"))
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .args(["--tesseract-cmd", "/nonexistent/tesseract"])
            .args(["--easyocr-cmd", "/nonexistent/easyocr-json"])
            .args(["--engine-timeout-secs", "5"])
            .args(extra_args)
            .env_remove("TOGETHER_API_KEY")
            .spawn()
            .expect("Failed to start server");

        // Wait for server to be ready
        let deadline = Instant::now() + Duration::from_secs(15);
        while TcpStream::connect(("127.0.0.1", port)).is_err() {
            assert!(Instant::now() < deadline, "server did not start");
            std::thread::sleep(Duration::from_millis(100));
        }

        Self { child, port }
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

/// A small white PNG
fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(120, 40, image::Rgb([255, 255, 255]));
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

fn png_part(file_name: &str) -> Part {
    Part::bytes(png_bytes())
        .file_name(file_name.to_string())
        .mime_str("image/png")
        .unwrap()
}

async fn post_form(server: &TestServer, path: &str, form: Form) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}{}", server.base_url(), path))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let response: HealthResponse = client
        .get(&format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.status, "ok");
    assert!(!response.version.is_empty());
}

#[tokio::test]
async fn test_info_endpoint() {
    let server = TestServer::start();
    let client = reqwest::Client::new();

    let response: InfoResponse = client
        .get(&format!("{}/info", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    let names: Vec<_> = response.engines.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["tesseract", "easyocr", "vision"]);
    assert!(response.engines.iter().all(|e| !e.available && e.reason.is_some()));
    assert_eq!(response.document_types.len(), 5);
    assert!(response.document_types.contains(&"Salary Slip".to_string()));
    assert_eq!(response.max_file_size_bytes, 52428800);
}

#[tokio::test]
async fn test_compare_degrades_when_engines_missing() {
    let server = TestServer::start();

    let form = Form::new().part("file", png_part("receipt.png"));
    let response = post_form(&server, "/compare", form).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["file_name"], "receipt.png");
    let pages = body["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["page"], 1);
    assert_eq!(pages[0]["status"], "compared");
    assert_eq!(pages[0]["width"], 120);

    let results = pages[0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for result in results {
        assert_eq!(result["status"], "unavailable");
        assert_eq!(result["records"].as_array().unwrap().len(), 0);
        assert!(result.get("table_download").is_none());
        assert!(result.get("text_download").is_none());
    }

    // Box engines still show the page, with nothing drawn
    assert_eq!(results[0]["engine"], "tesseract");
    assert!(results[0]["annotated_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert_eq!(results[0]["boxes_drawn"], 0);
    assert!(results[2].get("annotated_image").is_none());
}

#[tokio::test]
async fn test_compare_selected_engines() {
    let server = TestServer::start();

    let form = Form::new()
        .part("file", png_part("scan.png"))
        .text("engines", "vision")
        .text("psm", "6");
    let body: Value = post_form(&server, "/compare", form)
        .await
        .json()
        .await
        .expect("Failed to parse response");

    let results = body["pages"][0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["engine"], "vision");
    assert_eq!(results[0]["status"], "unavailable");
}

#[tokio::test]
async fn test_compare_rejects_invalid_parameters() {
    let server = TestServer::start();

    let form = Form::new()
        .part("file", png_part("scan.png"))
        .text("psm", "42");
    let response = post_form(&server, "/compare", form).await;
    assert_eq!(response.status(), 400);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "INVALID_REQUEST");
    assert!(error.error.contains("psm"));

    let form = Form::new()
        .part("file", png_part("scan.png"))
        .text("engines", "paddle");
    assert_eq!(post_form(&server, "/compare", form).await.status(), 400);
}

#[tokio::test]
async fn test_compare_missing_file() {
    let server = TestServer::start();

    let form = Form::new().text("engines", "tesseract");
    let response = post_form(&server, "/compare", form).await;
    assert_eq!(response.status(), 400);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "MISSING_FILE");
}

#[tokio::test]
async fn test_compare_unsupported_file() {
    let server = TestServer::start();

    let part = Part::bytes(b"hello world".to_vec())
        .file_name("notes.txt")
        .mime_str("text/plain")
        .unwrap();
    let response = post_form(&server, "/compare", Form::new().part("file", part)).await;
    assert_eq!(response.status(), 400);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, "UNSUPPORTED_FORMAT");
}

#[tokio::test]
async fn test_file_too_large() {
    let server = TestServer::start_with(&["--max-file-size", "64"]);

    let response = post_form(&server, "/compare", Form::new().part("file", png_part("big.png"))).await;
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn test_analyze_without_vision_service() {
    let server = TestServer::start();

    let form = Form::new()
        .text("document_type", "Salary Slip")
        .part("file", png_part("jan.png"))
        .part("file", png_part("feb.png"));
    let response = post_form(&server, "/analyze", form).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["document_type"], "Salary Slip");
    let documents = body["documents"].as_array().unwrap();
    assert_eq!(documents.len(), 2);
    for document in documents {
        assert_eq!(document["state"], "rasterized");
        assert!(document["error"].as_str().unwrap().contains("unavailable"));
    }
    assert_eq!(documents[1]["label"], "feb.png");
    assert_eq!(body["parameters"].as_array().unwrap().len(), 0);
    assert!(body.get("download").is_none());
}

#[tokio::test]
async fn test_analyze_rejects_unknown_document_type() {
    let server = TestServer::start();

    let form = Form::new()
        .text("document_type", "Invoice")
        .part("file", png_part("a.png"));
    let response = post_form(&server, "/analyze", form).await;
    assert_eq!(response.status(), 400);

    let form = Form::new().part("file", png_part("a.png"));
    assert_eq!(post_form(&server, "/analyze", form).await.status(), 400);
}

#[tokio::test]
async fn test_query_reports_unavailable_inline() {
    let server = TestServer::start();

    let form = Form::new()
        .part("file", png_part("statement.png"))
        .text("question", "What is the closing balance?");
    let response = post_form(&server, "/query", form).await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["question"], "What is the closing balance?");
    assert!(body.get("answer").is_none());
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_query_requires_question() {
    let server = TestServer::start();

    let form = Form::new().part("file", png_part("statement.png"));
    let response = post_form(&server, "/query", form).await;
    assert_eq!(response.status(), 400);
}
