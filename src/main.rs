use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod analysis;
mod artifact;
mod compare;
mod config;
mod engine;
mod engines;
mod error;
mod export;
mod normalize;
mod overlay;
mod process;
mod rasterize;
mod server;
mod vision;

#[derive(Parser, Debug)]
#[command(name = "ocr-comparator")]
#[command(about = "Compare OCR engines and extract financial document parameters")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Tesseract executable
    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    pub tesseract_cmd: String,

    /// EasyOCR helper executable (prints detections as JSON on stdout)
    #[arg(long, env = "EASYOCR_CMD", default_value = "easyocr-json")]
    pub easyocr_cmd: String,

    /// Chat completion endpoint used for vision OCR and document analysis
    #[arg(
        long,
        env = "VISION_API_URL",
        default_value = "https://api.together.xyz/v1/chat/completions"
    )]
    pub vision_api_url: String,

    /// API key for the vision endpoint; the vision engine is disabled without one
    #[arg(long, env = "TOGETHER_API_KEY", hide_env_values = true)]
    pub vision_api_key: Option<String>,

    /// Vision model name
    #[arg(
        long,
        env = "VISION_MODEL",
        default_value = "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo"
    )]
    pub vision_model: String,

    /// Upper bound for a single engine invocation, in seconds
    #[arg(long, env = "OCR_ENGINE_TIMEOUT_SECS", default_value = "60")]
    pub engine_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from(args);

    tracing::info!("Starting ocr-comparator v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
