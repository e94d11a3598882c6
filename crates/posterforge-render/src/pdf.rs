//! PDF assembly from rasterized pages.

use crate::encode::flatten_over_white;
use crate::error::{RenderError, RenderResult};
use crate::raster::RasterImage;
use printpdf::image_crate::{DynamicImage, RgbImage};
use printpdf::{Image, ImageTransform, Mm, PdfDocument, PdfDocumentReference};

pub const A4_WIDTH_MM: f64 = 210.0;
pub const A4_HEIGHT_MM: f64 = 297.0;
pub const DEFAULT_DPI: f64 = 96.0;

const MM_PER_INCH: f64 = 25.4;

/// Pixels at `dpi` to millimeters.
pub fn px_to_mm(px: f64, dpi: f64) -> f64 {
    px / dpi * MM_PER_INCH
}

/// Where an image lands on a page, in millimeters from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    /// Cover the whole page.
    pub fn full(page_width: f64, page_height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: page_width,
            height: page_height,
        }
    }
}

/// Scale `content` to fit the page preserving aspect ratio, centered.
pub fn fit_to_page(
    content_width: f64,
    content_height: f64,
    page_width: f64,
    page_height: f64,
) -> Placement {
    if content_width <= 0.0 || content_height <= 0.0 {
        return Placement {
            x: page_width / 2.0,
            y: page_height / 2.0,
            width: 0.0,
            height: 0.0,
        };
    }
    let scale = (page_width / content_width).min(page_height / content_height);
    let width = content_width * scale;
    let height = content_height * scale;
    Placement {
        x: (page_width - width) / 2.0,
        y: (page_height - height) / 2.0,
        width,
        height,
    }
}

/// Builds a PDF one image page at a time.
pub struct PdfAssembler {
    title: String,
    dpi: f64,
    doc: Option<PdfDocumentReference>,
    pages: usize,
}

impl PdfAssembler {
    pub fn new(title: impl Into<String>, dpi: f64) -> Self {
        Self {
            title: title.into(),
            dpi,
            doc: None,
            pages: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Append a `page_width` x `page_height` mm page showing `image` at `placement`.
    pub fn add_page(
        &mut self,
        image: &RasterImage,
        page_width: f64,
        page_height: f64,
        placement: Placement,
    ) -> RenderResult<()> {
        let rgb = RgbImage::from_raw(image.width, image.height, flatten_over_white(image))
            .ok_or_else(|| RenderError::Pdf("Pixel buffer does not match dimensions".into()))?;
        let pdf_image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(rgb));

        let (w, h) = (Mm(page_width as f32), Mm(page_height as f32));
        let layer = match &self.doc {
            None => {
                let (doc, page, layer) = PdfDocument::new(&self.title, w, h, "Layer 1");
                let layer = doc.get_page(page).get_layer(layer);
                self.doc = Some(doc);
                layer
            }
            Some(doc) => {
                let (page, layer) = doc.add_page(w, h, "Layer 1");
                doc.get_page(page).get_layer(layer)
            }
        };

        let natural_width = px_to_mm(f64::from(image.width), self.dpi);
        let natural_height = px_to_mm(f64::from(image.height), self.dpi);
        // PDF origin is bottom-left.
        let bottom = page_height - placement.y - placement.height;
        pdf_image.add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm(placement.x as f32)),
                translate_y: Some(Mm(bottom as f32)),
                scale_x: Some((placement.width / natural_width) as f32),
                scale_y: Some((placement.height / natural_height) as f32),
                dpi: Some(self.dpi as f32),
                ..Default::default()
            },
        );
        self.pages += 1;
        log::debug!(
            "Added PDF page {} ({}x{} px into {:.1}x{:.1} mm)",
            self.pages,
            image.width,
            image.height,
            placement.width,
            placement.height
        );
        Ok(())
    }

    pub fn finish(self) -> RenderResult<Vec<u8>> {
        let doc = self.doc.ok_or(RenderError::Empty)?;
        doc.save_to_bytes()
            .map_err(|e| RenderError::Pdf(format!("Failed to save PDF: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32) -> RasterImage {
        RasterImage {
            width,
            height,
            pixels: [200, 40, 40, 255].repeat((width * height) as usize),
        }
    }

    #[test]
    fn test_px_to_mm() {
        assert!((px_to_mm(96.0, 96.0) - 25.4).abs() < 1e-9);
        assert!((px_to_mm(794.0, DEFAULT_DPI) - 210.07).abs() < 0.01);
    }

    #[test]
    fn test_fit_landscape_into_a4() {
        let p = fit_to_page(400.0, 200.0, A4_WIDTH_MM, A4_HEIGHT_MM);
        assert!((p.width - 210.0).abs() < 1e-9);
        assert!((p.height - 105.0).abs() < 1e-9);
        assert!(p.x.abs() < 1e-9);
        assert!((p.y - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_portrait_is_centered_horizontally() {
        let p = fit_to_page(100.0, 297.0, A4_WIDTH_MM, A4_HEIGHT_MM);
        assert!((p.height - 297.0).abs() < 1e-9);
        assert!((p.x - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_assemble_pages() {
        let mut pdf = PdfAssembler::new("poster", DEFAULT_DPI);
        let page = solid(40, 20);
        let placement = fit_to_page(40.0, 20.0, A4_WIDTH_MM, A4_HEIGHT_MM);
        for _ in 0..2 {
            pdf.add_page(&page, A4_WIDTH_MM, A4_HEIGHT_MM, placement).unwrap();
        }
        assert_eq!(pdf.page_count(), 2);

        let bytes = pdf.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let pdf = PdfAssembler::new("empty", DEFAULT_DPI);
        assert!(matches!(pdf.finish(), Err(RenderError::Empty)));
    }
}
