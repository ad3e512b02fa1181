//! Raster codec adapter: png/jpeg decode and encode via the `image` crate.
//!
//! Decoding is strict: bytes are decoded with the codec of the detected
//! format, never guessed, so a mismatch fails with [`ConvertError::Decode`].
//! A same-format request still runs a full decode → encode, which is what
//! rejects corrupt uploads on the image → image path.
//!
//! JPEG has no alpha channel. Images with alpha are composited over white
//! before a JPEG encode.

use crate::error::ConvertError;
use crate::format::Format;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

/// Background used when flattening alpha.
pub const FLATTEN_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// JPEG quality used by [`EncodePolicy::MaxQuality`].
pub const MAX_JPEG_QUALITY: u8 = 100;

/// How hard the encoder works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodePolicy {
    /// The codec's own defaults. Used for image → image conversions.
    #[default]
    CodecDefault,
    /// JPEG quality 100, PNG best compression. Used for rasterised pages.
    MaxQuality,
}

/// Decode `bytes` strictly as `format`.
pub fn decode(bytes: &[u8], format: Format) -> Result<DynamicImage, ConvertError> {
    let codec = format.image_format().ok_or_else(|| ConvertError::Decode {
        format: format.to_string(),
        detail: "not a raster format".into(),
    })?;
    let img = image::load_from_memory_with_format(bytes, codec).map_err(|e| ConvertError::Decode {
        format: format.to_string(),
        detail: e.to_string(),
    })?;
    debug!("Decoded {} → {}x{} px", format, img.width(), img.height());
    Ok(img)
}

/// Encode `img` as `format` under `policy`.
pub fn encode(img: &DynamicImage, format: Format, policy: EncodePolicy) -> Result<Vec<u8>, ConvertError> {
    let encode_err = |e: image::ImageError| ConvertError::Encode {
        format: format.to_string(),
        detail: e.to_string(),
    };

    let mut buf = Vec::new();
    match format {
        Format::Png => {
            let encoder = match policy {
                EncodePolicy::CodecDefault => PngEncoder::new(&mut buf),
                EncodePolicy::MaxQuality => {
                    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
                }
            };
            img.write_with_encoder(encoder).map_err(encode_err)?;
        }
        Format::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(flatten_alpha(img, FLATTEN_BACKGROUND));
            let encoder = match policy {
                EncodePolicy::CodecDefault => JpegEncoder::new(&mut buf),
                EncodePolicy::MaxQuality => JpegEncoder::new_with_quality(&mut buf, MAX_JPEG_QUALITY),
            };
            rgb.write_with_encoder(encoder).map_err(encode_err)?;
        }
        Format::Pdf => {
            return Err(ConvertError::Encode {
                format: format.to_string(),
                detail: "not a raster format".into(),
            })
        }
    }

    debug!("Encoded {}x{} px → {} bytes {}", img.width(), img.height(), buf.len(), format);
    Ok(buf)
}

/// Decode as `source`, encode as `target` with codec defaults.
pub fn reencode(bytes: &[u8], source: Format, target: Format) -> Result<Vec<u8>, ConvertError> {
    let img = decode(bytes, source)?;
    encode(&img, target, EncodePolicy::CodecDefault)
}

/// Composite `img` over an opaque `background`, dropping the alpha channel.
pub fn flatten_alpha(img: &DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u16::from(a);
        let blend = |c: u8, bg: u8| -> u8 { ((u16::from(c) * a + u16::from(bg) * (255 - a) + 127) / 255) as u8 };
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}
