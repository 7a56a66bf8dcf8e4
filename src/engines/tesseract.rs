//! Tesseract engine implementation
//!
//! Runs the local `tesseract` binary in TSV mode and normalizes each word row.

use crate::config::TesseractConfig;
use crate::engine::{EngineKind, OcrEngine, OcrOutcome};
use crate::error::OcrError;
use crate::normalize::{self, OcrRecord, SkipReason, TesseractToken};
use crate::process::run_with_timeout;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Number of columns in Tesseract's TSV output
const TSV_COLUMNS: usize = 12;

/// Tesseract CLI adapter
pub struct TesseractEngine {
    program: String,
    config: TesseractConfig,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(program: impl Into<String>, config: TesseractConfig, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            config,
            timeout,
        }
    }

    fn command(&self, image_path: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(image_path)
            .arg("stdout")
            .args(["--oem", &self.config.oem.to_string()])
            .args(["--psm", &self.config.psm.to_string()])
            .args(["-l", &self.config.lang])
            .args(self.config.extra_args())
            .arg("tsv");
        command
    }

    fn run(&self, image_path: &Path) -> Result<Vec<OcrRecord>, OcrError> {
        tracing::debug!(
            "Running {} on {} ({}, lang {})",
            self.program,
            image_path.display(),
            self.config.config_string(),
            self.config.lang
        );

        let output = run_with_timeout(&self.program, self.command(image_path), self.timeout)?;
        if !output.stderr.trim().is_empty() {
            tracing::debug!("{} stderr: {}", self.program, output.stderr.trim());
        }
        Ok(parse_tsv(&output.stdout, self.config.min_conf))
    }
}

impl OcrEngine for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Tesseract
    }

    fn perform_ocr(&self, image_path: &Path) -> OcrOutcome {
        match self.run(image_path) {
            Ok(records) => OcrOutcome::from_records(records),
            Err(OcrError::EngineUnavailable(reason)) => {
                tracing::warn!("Tesseract unavailable: {}", reason);
                OcrOutcome::Unavailable(reason)
            }
            Err(e) => {
                tracing::warn!("Error performing Tesseract OCR: {}", e);
                OcrOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Normalize Tesseract TSV output, keeping rows in output order
pub fn parse_tsv(tsv: &str, min_conf: f32) -> Vec<OcrRecord> {
    let rows = tsv
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with("level\t"))
        .map(|line| parse_row(line).and_then(|token| normalize::from_tesseract(token, min_conf)));

    normalize::collect_records(EngineKind::Tesseract, rows)
}

fn parse_row(line: &str) -> Result<TesseractToken, SkipReason> {
    let fields: Vec<&str> = line.splitn(TSV_COLUMNS, '\t').collect();
    if fields.len() < TSV_COLUMNS - 1 {
        return Err(SkipReason::Malformed(format!(
            "expected {} columns, got {}",
            TSV_COLUMNS,
            fields.len()
        )));
    }

    let int = |index: usize, name: &str| {
        fields[index]
            .trim()
            .parse::<i32>()
            .map_err(|_| SkipReason::Malformed(format!("{} '{}' is not an integer", name, fields[index])))
    };

    let conf = fields[10]
        .trim()
        .parse::<f32>()
        .map_err(|_| SkipReason::Malformed(format!("conf '{}' is not a number", fields[10])))?;

    Ok(TesseractToken {
        text: fields.get(11).copied().unwrap_or_default().to_string(),
        conf,
        left: int(6, "left")?,
        top: int(7, "top")?,
        width: int(8, "width")?,
        height: int(9, "height")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::BoundingBox;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = vec![HEADER];
        out.extend_from_slice(rows);
        out.join("\n")
    }

    #[test]
    fn test_invoice_scenario() {
        let output = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t",
            "5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t92\tInvoice",
            "5\t1\t1\t1\t1\t2\t0\t0\t0\t0\t10\t",
        ]);
        let records = parse_tsv(&output, 0.0);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Invoice");
        assert!((records[0].confidence.unwrap() - 0.92).abs() < 1e-6);
        assert_eq!(records[0].bounding_box, Some(BoundingBox::new(10, 10, 50, 20)));
        assert_eq!(records[0].source_engine, EngineKind::Tesseract);
    }

    #[test]
    fn test_float_confidence_and_min_conf() {
        let output = tsv(&[
            "5\t1\t1\t1\t1\t1\t1\t2\t3\t4\t96.57\tclear",
            "5\t1\t1\t1\t1\t2\t5\t6\t7\t8\t30.10\tblurry",
        ]);
        let records = parse_tsv(&output, 0.5);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "clear");
    }

    #[test]
    fn test_malformed_row_does_not_affect_siblings() {
        let output = tsv(&[
            "5\t1\t1\t1\t1\t1\tten\t10\t50\t20\t92\tbroken",
            "5\t1\t1\t1\t1\t2\t70\t10\t40\t20\t88\tTotal",
            "garbage",
        ]);
        let records = parse_tsv(&output, 0.0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Total");
    }

    #[test]
    fn test_command_arguments() {
        let config = TesseractConfig::new(6, 1, "deu", "-c tessedit_do_invert=0", 0.0).unwrap();
        let engine = TesseractEngine::new("tesseract", config, Duration::from_secs(5));
        let command = engine.command(Path::new("/tmp/page.png"));
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "/tmp/page.png",
                "stdout",
                "--oem",
                "1",
                "--psm",
                "6",
                "-l",
                "deu",
                "-c",
                "tessedit_do_invert=0",
                "tsv"
            ]
        );
    }

    #[test]
    fn test_quoted_flag_is_one_argument() {
        let config =
            TesseractConfig::new(3, 3, "eng", "-c tessedit_char_whitelist='0 1'", 0.0).unwrap();
        let engine = TesseractEngine::new("tesseract", config, Duration::from_secs(5));
        let command = engine.command(Path::new("/tmp/page.png"));
        let args: Vec<_> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[8..], ["-c", "tessedit_char_whitelist=0 1", "tsv"]);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let engine = TesseractEngine::new(
            "/nonexistent/tesseract",
            TesseractConfig::default(),
            Duration::from_secs(1),
        );
        let outcome = engine.perform_ocr(Path::new("/tmp/page.png"));
        assert!(matches!(outcome, OcrOutcome::Unavailable(_)));
        assert!(outcome.records().is_empty());
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_engine(dir: &Path, body: &str) -> String {
            let path = dir.join("fake-tesseract");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[test]
        fn test_end_to_end_with_fake_binary() {
            let dir = tempfile::tempdir().unwrap();
            let body = format!(
                "printf '%s\\n' '{}' '5\t1\t1\t1\t1\t1\t10\t10\t50\t20\t92\tInvoice' '5\t1\t1\t1\t1\t2\t0\t0\t0\t0\t10\t'",
                HEADER
            );
            let program = fake_engine(dir.path(), &body);
            let engine =
                TesseractEngine::new(program, TesseractConfig::default(), Duration::from_secs(10));

            let outcome = engine.perform_ocr(Path::new("/tmp/page.png"));
            let records = outcome.records();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].text, "Invoice");
        }

        #[test]
        fn test_failure_yields_empty_result() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_engine(dir.path(), "echo 'read_params_file: Can not open' >&2\nexit 1");
            let engine =
                TesseractEngine::new(program, TesseractConfig::default(), Duration::from_secs(10));

            let outcome = engine.perform_ocr(Path::new("/tmp/page.png"));
            assert!(matches!(outcome, OcrOutcome::Failed(_)));
            assert!(outcome.records().is_empty());
        }

        #[test]
        fn test_timeout_is_soft_failure() {
            let dir = tempfile::tempdir().unwrap();
            let program = fake_engine(dir.path(), "sleep 10");
            let engine = TesseractEngine::new(
                program,
                TesseractConfig::default(),
                Duration::from_millis(200),
            );

            let outcome = engine.perform_ocr(Path::new("/tmp/page.png"));
            assert!(matches!(outcome, OcrOutcome::Failed(_)));
        }
    }
}
