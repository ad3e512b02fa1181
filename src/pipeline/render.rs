//! PDF rasterisation: page count and page → png/jpeg via pdfium.
//!
//! The rendering policy is the same for every page of every conversion:
//! fixed DPI (capped by `max_rendered_pixels`), rendered over a white clear
//! colour, alpha flattened, and encoded at maximum quality.
//!
//! All functions here are blocking; async callers reach them through
//! `spawn_blocking` in [`crate::convert`].

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::format::Format;
use crate::pipeline::encode::{self, EncodePolicy, FLATTEN_BACKGROUND};
use crate::pipeline::engine::PdfEngine;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Fixed rendering parameters for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
}

impl RenderSettings {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
        }
    }
}

/// Number of pages in an opened document.
///
/// A document with zero pages is rejected here so that no conversion ever
/// starts rendering one.
pub fn page_count(document: &PdfDocument<'_>) -> Result<usize, ConvertError> {
    let count = document.pages().len() as usize;
    if count == 0 {
        return Err(ConvertError::NoPages);
    }
    Ok(count)
}

/// Open `bytes` and count its pages.
pub fn count_pages(engine: &PdfEngine, bytes: &[u8]) -> Result<usize, ConvertError> {
    let document = engine.open(bytes)?;
    page_count(&document)
}

/// Pixel size of a `width_pt × height_pt` page at `settings`.
///
/// When the longest edge would exceed the pixel cap, both edges are scaled
/// down by the same factor. Neither edge is ever below one pixel.
pub fn render_dimensions(width_pt: f32, height_pt: f32, settings: &RenderSettings) -> (i32, i32) {
    let mut scale = settings.dpi as f32 / POINTS_PER_INCH;
    let longest = width_pt.max(height_pt) * scale;
    let cap = settings.max_rendered_pixels as f32;
    if longest > cap {
        scale *= cap / longest;
    }
    let px = |pt: f32| ((pt * scale).round() as i32).max(1);
    (px(width_pt), px(height_pt))
}

/// Render page `index` (0-based) to an opaque image.
pub fn render_page_image(
    document: &PdfDocument<'_>,
    index: usize,
    settings: &RenderSettings,
) -> Result<DynamicImage, ConvertError> {
    let failed = |detail: String| ConvertError::RasterisationFailed {
        page: index,
        detail,
        partial_dir: None,
    };

    let page_index = u16::try_from(index).map_err(|_| failed("page index out of range".into()))?;
    let page = document
        .pages()
        .get(page_index)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let (width, height) = render_dimensions(page.width().value, page.height().value, settings);
    let render_config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_target_height(height)
        .set_clear_color(PdfColor::WHITE);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page {} → {}x{} px", index, image.width(), image.height());

    Ok(DynamicImage::ImageRgb8(encode::flatten_alpha(&image, FLATTEN_BACKGROUND)))
}

/// Render page `index` and encode it as `target` at maximum quality.
pub fn render_page(
    document: &PdfDocument<'_>,
    index: usize,
    target: Format,
    settings: &RenderSettings,
) -> Result<Vec<u8>, ConvertError> {
    let image = render_page_image(document, index, settings)?;
    encode::encode(&image, target, EncodePolicy::MaxQuality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(dpi: u32, cap: u32) -> RenderSettings {
        RenderSettings {
            dpi,
            max_rendered_pixels: cap,
        }
    }

    #[test]
    fn a4_at_100_dpi() {
        // A4 is 595 × 842 pt.
        let (w, h) = render_dimensions(595.0, 842.0, &settings(100, 6000));
        assert_eq!((w, h), (826, 1169));
    }

    #[test]
    fn letter_at_72_dpi_is_one_pixel_per_point() {
        assert_eq!(render_dimensions(612.0, 792.0, &settings(72, 6000)), (612, 792));
    }

    #[test]
    fn oversized_pages_are_capped_proportionally() {
        // A0 at 600 DPI would be ~19866 × 28087 px.
        let (w, h) = render_dimensions(2384.0, 3370.0, &settings(600, 4000));
        assert_eq!(h, 4000);
        assert!((2828..=2830).contains(&w), "w = {w}");
    }

    #[test]
    fn degenerate_pages_get_at_least_one_pixel() {
        assert_eq!(render_dimensions(0.1, 0.1, &settings(72, 6000)), (1, 1));
    }

    #[test]
    fn settings_follow_config() {
        let config = ConversionConfig::builder().dpi(150).build().unwrap();
        let s = RenderSettings::from_config(&config);
        assert_eq!(s.dpi, 150);
        assert_eq!(s.max_rendered_pixels, config.max_rendered_pixels);
    }
}
