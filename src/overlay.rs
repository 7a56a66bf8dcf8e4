//! Bounding-box overlays for comparison images

use crate::normalize::{BoundingBox, OcrRecord};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LINE_WIDTH: u32 = 2;

/// An annotated copy of the source image
pub struct Overlay {
    pub image: RgbImage,
    /// Number of rectangles drawn
    pub drawn: usize,
}

/// Draw one rectangle per record with usable geometry.
///
/// Records without a box, with an empty box, or lying entirely outside the
/// image are skipped; the rest are still drawn.
pub fn draw_boxes(image: &DynamicImage, records: &[OcrRecord]) -> Overlay {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();
    let mut drawn = 0;

    for (index, record) in records.iter().enumerate() {
        let Some(bbox) = record.bounding_box else {
            continue;
        };

        match clip(&bbox, width, height) {
            Some((x, y, w, h)) => {
                draw_outline(&mut canvas, x, y, w, h);
                drawn += 1;
            }
            None => tracing::debug!(
                "Skipping box {} for {:?}: {:?} outside {}x{} image",
                index,
                record.text,
                bbox,
                width,
                height
            ),
        }
    }

    Overlay {
        image: canvas,
        drawn,
    }
}

/// Clamp a box to the image, returning `None` when nothing remains.
///
/// A zero-width or zero-height box still gets a 1 px line or dot.
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = i64::from(bbox.x).max(0);
    let y0 = i64::from(bbox.y).max(0);
    let x1 = (i64::from(bbox.x) + i64::from(bbox.width.max(1))).min(i64::from(width));
    let y1 = (i64::from(bbox.y) + i64::from(bbox.height.max(1))).min(i64::from(height));

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

fn draw_outline(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    for t in 0..LINE_WIDTH {
        let inner_w = w.saturating_sub(2 * t);
        let inner_h = h.saturating_sub(2 * t);
        if inner_w == 0 || inner_h == 0 {
            break;
        }
        let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(inner_w, inner_h);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;
    use crate::normalize::from_vision;

    fn record(bbox: Option<BoundingBox>) -> OcrRecord {
        OcrRecord {
            text: "t".to_string(),
            confidence: Some(0.5),
            bounding_box: bbox,
            source_engine: EngineKind::Tesseract,
        }
    }

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    #[test]
    fn test_draws_only_valid_boxes() {
        let records = vec![
            record(Some(BoundingBox::new(10, 10, 20, 10))),
            record(None),
            record(Some(BoundingBox::new(5, 5, 0, 10))),
            record(Some(BoundingBox::new(500, 500, 10, 10))),
            record(Some(BoundingBox::new(40, 30, 15, 15))),
            from_vision("no geometry"),
        ];

        let overlay = draw_boxes(&blank(100, 60), &records);
        assert_eq!(overlay.drawn, 3);
        assert_eq!(*overlay.image.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*overlay.image.get_pixel(11, 11), BOX_COLOR);
        assert_eq!(*overlay.image.get_pixel(15, 15), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_degenerate_box_is_drawn_as_line() {
        let records = vec![
            record(Some(BoundingBox::new(5, 5, 0, 10))),
            record(Some(BoundingBox::new(20, 8, 0, 0))),
        ];
        let overlay = draw_boxes(&blank(30, 30), &records);
        assert_eq!(overlay.drawn, 2);
        assert_eq!(*overlay.image.get_pixel(5, 5), BOX_COLOR);
        assert_eq!(*overlay.image.get_pixel(5, 14), BOX_COLOR);
        assert_eq!(*overlay.image.get_pixel(6, 10), Rgb([255, 255, 255]));
        assert_eq!(*overlay.image.get_pixel(20, 8), BOX_COLOR);
        assert_eq!(*overlay.image.get_pixel(21, 8), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_partially_outside_box_is_clamped() {
        let records = vec![record(Some(BoundingBox::new(-5, -5, 20, 20)))];
        let overlay = draw_boxes(&blank(50, 50), &records);
        assert_eq!(overlay.drawn, 1);
        assert_eq!(*overlay.image.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*overlay.image.get_pixel(14, 5), BOX_COLOR);
    }

    #[test]
    fn test_grayscale_source_becomes_rgb() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::new(20, 20));
        let overlay = draw_boxes(&gray, &[record(Some(BoundingBox::new(2, 2, 6, 6)))]);
        assert_eq!(overlay.image.dimensions(), (20, 20));
        assert_eq!(*overlay.image.get_pixel(2, 2), BOX_COLOR);
    }

    #[test]
    fn test_source_image_is_untouched() {
        let source = blank(30, 30);
        let _ = draw_boxes(&source, &[record(Some(BoundingBox::new(0, 0, 10, 10)))]);
        assert_eq!(source.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }
}
