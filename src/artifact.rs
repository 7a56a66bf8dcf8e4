//! Request-scoped temporary image files

use crate::error::OcrError;
use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// A page image written to disk for the engines that read files.
///
/// The file is removed when the artifact is dropped, on every exit path of the
/// request that owns it. A failed removal is logged and otherwise ignored.
pub struct TempArtifact {
    path: PathBuf,
    file: Option<TempPath>,
}

impl TempArtifact {
    /// Write `image` as a PNG temp file
    pub fn from_image(image: &DynamicImage) -> Result<Self, OcrError> {
        let mut file = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Internal(format!("Failed to create temp file: {}", e)))?;

        let mut png = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| OcrError::Internal(format!("Failed to encode page image: {}", e)))?;
        file.write_all(&png)
            .and_then(|_| file.flush())
            .map_err(|e| OcrError::Internal(format!("Failed to write temp file: {}", e)))?;

        let file = file.into_temp_path();
        Ok(Self {
            path: file.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn remove(&mut self) -> Result<(), OcrError> {
        match self.file.take() {
            Some(file) => file.close().map_err(|e| {
                OcrError::ResourceCleanup(format!("{}: {}", self.path.display(), e))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::warn!("{}", e);
        }
    }
}
