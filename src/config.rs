use crate::error::OcrError;
use crate::Args;
use std::time::Duration;

/// Process-wide server configuration, shared read-only between requests
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub tesseract_cmd: String,
    pub easyocr_cmd: String,
    pub vision: VisionSettings,
    pub engine_timeout: Duration,
}

/// Connection settings for the chat-completion endpoint
#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            tesseract_cmd: args.tesseract_cmd,
            easyocr_cmd: args.easyocr_cmd,
            vision: VisionSettings {
                api_url: args.vision_api_url,
                api_key: args.vision_api_key.filter(|k| !k.trim().is_empty()),
                model: args.vision_model,
            },
            engine_timeout: Duration::from_secs(args.engine_timeout_secs.max(1)),
        }
    }
}

/// Tesseract parameters for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TesseractConfig {
    /// Page segmentation mode (0-13)
    pub psm: u8,
    /// OCR engine mode (0-3)
    pub oem: u8,
    pub lang: String,
    /// Extra command-line flags appended after the language
    pub extra_flags: String,
    /// Tokens at or below this normalized confidence are dropped
    pub min_conf: f32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            psm: 3,
            oem: 3,
            lang: "eng".to_string(),
            extra_flags: String::new(),
            min_conf: 0.0,
        }
    }
}

impl TesseractConfig {
    pub fn new(
        psm: u8,
        oem: u8,
        lang: impl Into<String>,
        extra_flags: impl Into<String>,
        min_conf: f32,
    ) -> Result<Self, OcrError> {
        if psm > 13 {
            return Err(OcrError::InvalidRequest(format!(
                "psm must be between 0 and 13, got {}",
                psm
            )));
        }
        if oem > 3 {
            return Err(OcrError::InvalidRequest(format!(
                "oem must be between 0 and 3, got {}",
                oem
            )));
        }
        check_unit("min_conf", min_conf)?;

        let lang = lang.into();
        if lang.trim().is_empty() {
            return Err(OcrError::InvalidRequest("lang must not be empty".to_string()));
        }

        let extra_flags = extra_flags.into();
        if shlex::split(&extra_flags).is_none() {
            return Err(OcrError::InvalidRequest(format!(
                "tesseract flags have unbalanced quotes: {}",
                extra_flags
            )));
        }

        Ok(Self {
            psm,
            oem,
            lang,
            extra_flags,
            min_conf,
        })
    }

    /// Extra flags split into arguments with shell quoting rules
    pub fn extra_args(&self) -> Vec<String> {
        shlex::split(&self.extra_flags).unwrap_or_default()
    }

    /// The `--oem <int> --psm <int> <extra flags>` configuration string
    pub fn config_string(&self) -> String {
        format!("--oem {} --psm {} {}", self.oem, self.psm, self.extra_flags)
            .trim_end()
            .to_string()
    }
}

/// EasyOCR detector/recognizer parameters for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EasyOcrConfig {
    pub languages: Vec<String>,
    pub gpu: bool,
    pub text_threshold: f32,
    pub low_text: f32,
    pub link_threshold: f32,
    pub canvas_size: u32,
    pub mag_ratio: f32,
}

impl Default for EasyOcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            gpu: true,
            text_threshold: 0.4,
            low_text: 0.4,
            link_threshold: 0.4,
            canvas_size: 2560,
            mag_ratio: 1.5,
        }
    }
}

impl EasyOcrConfig {
    pub fn new(
        languages: Vec<String>,
        gpu: bool,
        text_threshold: f32,
        low_text: f32,
        link_threshold: f32,
        canvas_size: u32,
        mag_ratio: f32,
    ) -> Result<Self, OcrError> {
        check_unit("text_threshold", text_threshold)?;
        check_unit("low_text", low_text)?;
        check_unit("link_threshold", link_threshold)?;

        if !(1000..=5000).contains(&canvas_size) {
            return Err(OcrError::InvalidRequest(format!(
                "canvas_size must be between 1000 and 5000, got {}",
                canvas_size
            )));
        }
        if !(1.0..=3.0).contains(&mag_ratio) {
            return Err(OcrError::InvalidRequest(format!(
                "mag_ratio must be between 1.0 and 3.0, got {}",
                mag_ratio
            )));
        }

        let languages: Vec<String> = languages
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if languages.is_empty() {
            return Err(OcrError::InvalidRequest(
                "at least one EasyOCR language is required".to_string(),
            ));
        }

        Ok(Self {
            languages,
            gpu,
            text_threshold,
            low_text,
            link_threshold,
            canvas_size,
            mag_ratio,
        })
    }
}

fn check_unit(name: &str, value: f32) -> Result<(), OcrError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OcrError::InvalidRequest(format!(
            "{} must be between 0.0 and 1.0, got {}",
            name, value
        )))
    }
}
