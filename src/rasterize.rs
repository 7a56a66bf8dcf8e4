//! Turning uploads into page images
//!
//! Images are decoded directly. PDFs are opened with lopdf and the image
//! XObjects of each page are decoded, which covers scanned documents; vector
//! page content is not rendered.

use crate::error::OcrError;
use image::DynamicImage;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Kind of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Image,
    Pdf,
}

impl UploadKind {
    /// Sniff by magic bytes, falling back to the declared name and MIME type
    pub fn detect(data: &[u8], file_name: &str, mime: Option<&str>) -> Self {
        if data.starts_with(b"%PDF-")
            || mime == Some("application/pdf")
            || file_name.to_lowercase().ends_with(".pdf")
        {
            Self::Pdf
        } else {
            Self::Image
        }
    }
}

/// One page of an upload
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number in the source document
    pub number: u32,
    /// `None` when the page has nothing that can be decoded
    pub image: Option<DynamicImage>,
}

/// Decode every page of an upload into an RGB image.
///
/// PDF pages without a decodable image are kept, with no image, so page
/// numbers stay those of the source document.
pub fn load_pages(data: &[u8], kind: UploadKind) -> Result<Vec<PageImage>, OcrError> {
    match kind {
        UploadKind::Image => Ok(vec![PageImage {
            number: 1,
            image: Some(decode_image(data)?),
        }]),
        UploadKind::Pdf => {
            let doc = open_pdf(data)?;
            let pages: Vec<PageImage> = doc
                .get_pages()
                .into_iter()
                .map(|(number, page_id)| PageImage {
                    number,
                    image: page_image(&doc, number, page_id),
                })
                .collect();

            if pages.iter().all(|p| p.image.is_none()) {
                return Err(OcrError::UnsupportedFormat(
                    "PDF contains no page images to OCR".to_string(),
                ));
            }
            Ok(pages)
        }
    }
}

/// Decode only the first page of an upload
pub fn load_first_page(data: &[u8], kind: UploadKind) -> Result<DynamicImage, OcrError> {
    match kind {
        UploadKind::Image => decode_image(data),
        UploadKind::Pdf => {
            let doc = open_pdf(data)?;
            let (number, page_id) = doc
                .get_pages()
                .into_iter()
                .next()
                .ok_or_else(|| OcrError::UnsupportedFormat("PDF has no pages".to_string()))?;
            page_image(&doc, number, page_id).ok_or_else(|| {
                OcrError::UnsupportedFormat(format!("Page {} has no decodable image", number))
            })
        }
    }
}

fn decode_image(data: &[u8]) -> Result<DynamicImage, OcrError> {
    let img = image::load_from_memory(data)
        .map_err(|e| OcrError::UnsupportedFormat(format!("Failed to decode image: {}", e)))?;
    Ok(DynamicImage::ImageRgb8(img.into_rgb8()))
}

fn open_pdf(data: &[u8]) -> Result<Document, OcrError> {
    Document::load_mem(data)
        .map_err(|e| OcrError::UnsupportedFormat(format!("Failed to load PDF: {}", e)))
}

/// The largest decodable image on a page stands for the page
fn page_image(doc: &Document, page_number: u32, page_id: ObjectId) -> Option<DynamicImage> {
    let mut best: Option<DynamicImage> = None;

    for stream_id in page_image_ids(doc, page_id) {
        let Ok(stream) = doc.get_object(stream_id).and_then(Object::as_stream) else {
            continue;
        };
        match decode_image_stream(doc, stream) {
            Ok(img) => {
                let area = |i: &DynamicImage| u64::from(i.width()) * u64::from(i.height());
                if best.as_ref().map_or(true, |b| area(&img) > area(b)) {
                    best = Some(img);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to decode image on page {}: {}", page_number, e);
            }
        }
    }

    if best.is_none() {
        tracing::warn!("Page {} has no decodable image", page_number);
    }
    best.map(|img| DynamicImage::ImageRgb8(img.into_rgb8()))
}

/// Object ids of the image XObjects referenced by a page's resources
fn page_image_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut ids = Vec::new();

    for dict in page_resources(doc, page_id) {
        let Ok(xobjects) = dict.get(b"XObject") else {
            continue;
        };
        let xobjects = match xobjects {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            other => other.as_dict().ok(),
        };
        let Some(xobjects) = xobjects else {
            continue;
        };

        for (_, value) in xobjects.iter() {
            let Ok(id) = value.as_reference() else {
                continue;
            };
            let is_image = doc
                .get_object(id)
                .and_then(Object::as_stream)
                .ok()
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|s| s.as_name().ok())
                .is_some_and(|name| name == b"Image");
            if is_image {
                ids.push(id);
            }
        }
    }

    ids
}

/// Resource dictionaries of a page, including ones inherited from its parents
fn page_resources(doc: &Document, page_id: ObjectId) -> Vec<&Dictionary> {
    let mut resources = Vec::new();
    let mut node = doc.get_dictionary(page_id).ok();

    // Bounded walk up the page tree
    for _ in 0..32 {
        let Some(dict) = node else {
            break;
        };
        match dict.get(b"Resources") {
            Ok(Object::Reference(id)) => resources.extend(doc.get_dictionary(*id).ok()),
            Ok(Object::Dictionary(inline)) => resources.push(inline),
            _ => {}
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }

    resources
}

/// Decode an image XObject
fn decode_image_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage, OcrError> {
    if filter_names(stream).iter().any(|f| f == "DCTDecode") {
        return image::load_from_memory(&stream.content)
            .map_err(|e| OcrError::UnsupportedFormat(format!("Failed to decode JPEG: {}", e)));
    }

    let width = dimension(stream, b"Width")?;
    let height = dimension(stream, b"Height")?;
    let bits_per_component = dict_int(stream, b"BitsPerComponent").unwrap_or(8);
    if bits_per_component != 8 {
        return Err(OcrError::UnsupportedFormat(format!(
            "Unsupported bit depth: {}",
            bits_per_component
        )));
    }

    let data = if stream.dict.get(b"Filter").is_ok() {
        stream
            .decompressed_content()
            .map_err(|e| OcrError::UnsupportedFormat(format!("Failed to decompress image: {}", e)))?
    } else {
        stream.content.clone()
    };

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| OcrError::UnsupportedFormat(format!("Image too large: {}x{}", width, height)))?;
    let bytes = |channels: usize| {
        pixels
            .checked_mul(channels)
            .ok_or_else(|| OcrError::UnsupportedFormat(format!("Image too large: {}x{}", width, height)))
    };
    match color_space(doc, stream).as_str() {
        "DeviceGray" | "CalGray" => {
            let img = image::GrayImage::from_raw(width, height, truncate(data, bytes(1)?))
                .ok_or_else(|| OcrError::UnsupportedFormat("Invalid grayscale data".to_string()))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        "DeviceRGB" | "CalRGB" | "ICCBased" => {
            let img = image::RgbImage::from_raw(width, height, truncate(data, bytes(3)?))
                .ok_or_else(|| OcrError::UnsupportedFormat("Invalid RGB data".to_string()))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        "DeviceCMYK" => {
            bytes(4)?;
            let rgb: Vec<u8> = data
                .chunks_exact(4)
                .take(pixels)
                .flat_map(|cmyk| {
                    let k = 1.0 - f32::from(cmyk[3]) / 255.0;
                    [0, 1, 2].map(|i| ((1.0 - f32::from(cmyk[i]) / 255.0) * k * 255.0) as u8)
                })
                .collect();
            let img = image::RgbImage::from_raw(width, height, rgb)
                .ok_or_else(|| OcrError::UnsupportedFormat("Invalid CMYK data".to_string()))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        other => Err(OcrError::UnsupportedFormat(format!(
            "Unsupported color space: {}",
            other
        ))),
    }
}

fn truncate(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    data.truncate(len);
    data
}

/// A positive `/Width` or `/Height` entry
fn dimension(stream: &Stream, key: &[u8]) -> Result<u32, OcrError> {
    let name = String::from_utf8_lossy(key);
    let value = dict_int(stream, key)
        .ok_or_else(|| OcrError::UnsupportedFormat(format!("Missing image {}", name)))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| OcrError::UnsupportedFormat(format!("Invalid image {}: {}", name, value)))
}

fn dict_int(stream: &Stream, key: &[u8]) -> Option<i64> {
    stream.dict.get(key).ok().and_then(|v| v.as_i64().ok())
}

fn filter_names(stream: &Stream) -> Vec<String> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![String::from_utf8_lossy(name).into_owned()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|f| f.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .collect(),
        _ => Vec::new(),
    }
}

/// Color space name, resolving references and `[/ICCBased ref]` arrays
fn color_space(doc: &Document, stream: &Stream) -> String {
    let Ok(mut cs) = stream.dict.get(b"ColorSpace") else {
        return "DeviceRGB".to_string();
    };

    if let Ok(id) = cs.as_reference() {
        match doc.get_object(id) {
            Ok(resolved) => cs = resolved,
            Err(_) => return "DeviceRGB".to_string(),
        }
    }

    if let Ok(name) = cs.as_name() {
        return String::from_utf8_lossy(name).into_owned();
    }

    if let Ok(array) = cs.as_array() {
        if let Some(name) = array.first().and_then(|f| f.as_name().ok()) {
            return String::from_utf8_lossy(name).into_owned();
        }
    }

    "DeviceRGB".to_string()
}
