//! PDF writer: embed one raster image as a single-page PDF.
//!
//! The page measures exactly the image's pixel dimensions in points and the
//! image covers it edge to edge. No paper-size policy is applied.

use crate::error::ConvertError;
use crate::format::Format;
use crate::pipeline::encode;
use crate::pipeline::engine::PdfEngine;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

fn pdf_error(detail: impl Into<String>) -> ConvertError {
    ConvertError::Encode {
        format: Format::Pdf.to_string(),
        detail: detail.into(),
    }
}

/// Build a one-page PDF around `image` and return its bytes.
pub fn embed_image(engine: &PdfEngine, image: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let width = PdfPoints::new(image.width() as f32);
    let height = PdfPoints::new(image.height() as f32);

    let mut document = engine
        .pdfium()
        .create_new_pdf()
        .map_err(|e| pdf_error(format!("{:?}", e)))?;

    let object = PdfPageImageObject::new_with_size(&document, image, width, height)
        .map_err(|e| pdf_error(format!("image object: {:?}", e)))?;

    let mut page = document
        .pages_mut()
        .create_page_at_end(PdfPagePaperSize::new_custom(width, height))
        .map_err(|e| pdf_error(format!("page: {:?}", e)))?;

    page.objects_mut()
        .add_image_object(object)
        .map_err(|e| pdf_error(format!("embed: {:?}", e)))?;

    let bytes = document
        .save_to_bytes()
        .map_err(|e| pdf_error(format!("save: {:?}", e)))?;

    debug!(
        "Embedded {}x{} px image → {} byte PDF",
        image.width(),
        image.height(),
        bytes.len()
    );
    Ok(bytes)
}

/// Decode `bytes` as `format` and embed the result.
///
/// An undecodable source is reported as a failure to produce the PDF.
pub fn embed_bytes(engine: &PdfEngine, bytes: &[u8], format: Format) -> Result<Vec<u8>, ConvertError> {
    let image = encode::decode(bytes, format).map_err(|e| pdf_error(format!("source image unreadable: {e}")))?;
    embed_image(engine, &image)
}
