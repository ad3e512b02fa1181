//! Content sniffing and the closed set of formats the converter speaks.
//!
//! Detection looks only at the leading bytes. Filenames and client-declared
//! MIME types are never consulted: both are under the uploader's control and
//! routinely wrong.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// MIME string reported for content no signature matches.
pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// Leading-byte signatures, checked in order.
///
/// Formats other than png/jpeg/pdf are listed so rejections can name what
/// was actually uploaded.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"II*\x00", "image/tiff"),
    (b"MM\x00*", "image/tiff"),
    (b"PK\x03\x04", "application/zip"),
];

/// A format the converter can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Png,
    Jpeg,
    Pdf,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Png, Format::Jpeg, Format::Pdf];

    /// Map a sniffed MIME string to a format. Anything else is unknown.
    pub fn from_mime(mime: &str) -> Option<Format> {
        if mime == "image/jpg" {
            return Some(Format::Jpeg);
        }
        Format::ALL.into_iter().find(|f| f.mime_type() == mime)
    }

    /// File extension written for artifacts of this format.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Png => "png",
            Format::Jpeg => "jpeg",
            Format::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
            Format::Pdf => "application/pdf",
        }
    }

    /// `true` for the pixel formats (png, jpeg).
    pub fn is_raster(self) -> bool {
        !matches!(self, Format::Pdf)
    }

    /// The `image` crate codec for raster formats.
    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            Format::Png => Some(image::ImageFormat::Png),
            Format::Jpeg => Some(image::ImageFormat::Jpeg),
            Format::Pdf => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Parses a requested target format: `png`, `jpg`, `jpeg` or `pdf`,
/// case-insensitive, surrounding whitespace and a leading dot ignored.
impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalised.as_str() {
            "png" => Ok(Format::Png),
            "jpg" | "jpeg" => Ok(Format::Jpeg),
            "pdf" => Ok(Format::Pdf),
            _ => Err(ConvertError::UnsupportedTarget {
                requested: s.to_string(),
            }),
        }
    }
}

/// Sniff a MIME string from the leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime)
        .unwrap_or(UNKNOWN_MIME)
}

/// Classify bytes as png, jpeg or pdf. `None` means unknown.
pub fn detect(bytes: &[u8]) -> Option<Format> {
    Format::from_mime(sniff_mime(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn detects_by_content() {
        assert_eq!(detect(PNG_MAGIC), Some(Format::Png));
        assert_eq!(detect(b"\xff\xd8\xff\xe0\0\x10JFIF"), Some(Format::Jpeg));
        assert_eq!(detect(b"%PDF-1.7\n%\xe2\xe3"), Some(Format::Pdf));
    }

    #[test]
    fn unknown_content_is_none() {
        assert_eq!(detect(b""), None);
        assert_eq!(detect(b"GIF89a...."), None);
        assert_eq!(detect(b"hello, world"), None);
        // A PDF marker that is not at offset zero does not count.
        assert_eq!(detect(b" %PDF-1.4"), None);
    }

    #[test]
    fn sniff_names_rejected_formats() {
        assert_eq!(sniff_mime(b"GIF87a"), "image/gif");
        assert_eq!(sniff_mime(b"BM\x00\x00"), "image/bmp");
        assert_eq!(sniff_mime(b"\x00\x01"), UNKNOWN_MIME);
    }

    #[test]
    fn detection_is_stable() {
        let bytes = b"%PDF-1.4 whatever";
        let first = detect(bytes);
        for _ in 0..10 {
            assert_eq!(detect(bytes), first);
        }
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(Format::from_mime("image/jpg"), Some(Format::Jpeg));
        assert_eq!(Format::from_mime("image/jpeg"), Some(Format::Jpeg));
        assert_eq!(Format::from_mime("image/webp"), None);
        for format in Format::ALL {
            assert_eq!(Format::from_mime(format.mime_type()), Some(format));
            assert_eq!(sniff_mime_for(format), format.mime_type());
        }
    }

    fn sniff_mime_for(format: Format) -> &'static str {
        let magic: &[u8] = match format {
            Format::Png => b"\x89PNG\r\n\x1a\n....",
            Format::Jpeg => b"\xff\xd8\xff\xe0....",
            Format::Pdf => b"%PDF-1.7\n",
        };
        sniff_mime(magic)
    }

    #[test]
    fn parses_targets() {
        assert_eq!("png".parse::<Format>().unwrap(), Format::Png);
        assert_eq!("JPG".parse::<Format>().unwrap(), Format::Jpeg);
        assert_eq!(" .jpeg ".parse::<Format>().unwrap(), Format::Jpeg);
        assert_eq!("pdf".parse::<Format>().unwrap(), Format::Pdf);

        let err = "bmp".parse::<Format>().unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedTarget { ref requested } if requested == "bmp"));
    }

    #[test]
    fn raster_formats_have_codecs() {
        assert!(Format::Png.is_raster());
        assert!(Format::Jpeg.is_raster());
        assert!(!Format::Pdf.is_raster());
        assert_eq!(Format::Pdf.image_format(), None);
        assert_eq!(Format::Jpeg.to_string(), "jpeg");
    }
}
