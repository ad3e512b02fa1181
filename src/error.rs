//! Error types for the file-convert library.
//!
//! Every failure is fatal to the conversion that raised it: the dispatcher
//! never reports a partially converted result as success. The variants are
//! grouped by where in the pipeline they originate, and [`ConvertError::kind`]
//! folds them into the five categories callers actually branch on
//! ([`ErrorKind`]).
//!
//! Rasterisation can fail half-way through a multi-page document. The pages
//! already written stay on disk in a deterministic prefix and the error
//! carries the directory holding them ([`ConvertError::partial_output`]) so
//! the caller can discard it.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// All errors returned by the file-convert library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Format errors ─────────────────────────────────────────────────────
    /// The requested target format is not one of png, jpeg or pdf.
    #[error("Unsupported target format '{requested}'\nSupported formats: png, jpeg (jpg), pdf.")]
    UnsupportedTarget { requested: String },

    /// The uploaded bytes were sniffed as something other than png, jpeg or pdf.
    #[error("Unsupported source format: content detected as '{mime}'\nUpload a PNG, JPEG or PDF file.")]
    UnsupportedSource { mime: String },

    // ── Source errors ─────────────────────────────────────────────────────
    /// The upload was empty.
    #[error("Source is empty: nothing to convert")]
    EmptySource,

    /// The PDF could not be opened (corrupt, truncated or encrypted).
    #[error("PDF is malformed: {detail}")]
    MalformedPdf { detail: String },

    /// The PDF opened but has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The PDF has more pages than the configured limit.
    #[error("PDF has {pages} pages, more than the allowed maximum of {max}")]
    TooManyPages { pages: usize, max: usize },

    /// The upload exceeds the configured size limit.
    #[error("Source is {size} bytes, larger than the {limit}-byte limit")]
    SourceTooLarge { size: u64, limit: u64 },

    // ── Codec errors ──────────────────────────────────────────────────────
    /// The bytes could not be decoded as the detected format.
    #[error("Failed to decode {format} data: {detail}")]
    Decode { format: String, detail: String },

    /// The decoded image could not be written in the target format.
    #[error("Failed to encode {format}: {detail}")]
    Encode { format: String, detail: String },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// pdfium failed on a specific page (0-based index).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed {
        page: usize,
        detail: String,
        partial_dir: Option<PathBuf>,
    },

    /// The conversion ran past its deadline.
    #[error("Conversion timed out after {secs}s")]
    Timeout {
        secs: u64,
        partial_dir: Option<PathBuf>,
    },

    /// The caller stopped waiting; everything this conversion wrote was removed.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Archive errors ────────────────────────────────────────────────────
    /// Writing the zip archive failed.
    #[error("Failed to archive '{dir}': {detail}")]
    Archive { dir: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read, create or write a file or directory.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to point at an existing copy.\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Install pdfium system-wide (pre-built: github.com/bblanchon/pdfium-binaries).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The taxonomy callers branch on.
///
/// `UnsupportedFormat` and `MalformedSource` are the user's to fix;
/// the others are failures of the conversion itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    MalformedSource,
    Decode,
    Encode,
    Io,
    Internal,
}

impl ConvertError {
    /// Shorthand for [`ConvertError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    /// Fold the variant into its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnsupportedTarget { .. } | ConvertError::UnsupportedSource { .. } => {
                ErrorKind::UnsupportedFormat
            }
            ConvertError::EmptySource
            | ConvertError::MalformedPdf { .. }
            | ConvertError::NoPages
            | ConvertError::TooManyPages { .. }
            | ConvertError::SourceTooLarge { .. } => ErrorKind::MalformedSource,
            ConvertError::Decode { .. } => ErrorKind::Decode,
            ConvertError::Encode { .. }
            | ConvertError::RasterisationFailed { .. }
            | ConvertError::Archive { .. } => ErrorKind::Encode,
            ConvertError::Io { .. } => ErrorKind::Io,
            ConvertError::Timeout { .. }
            | ConvertError::Cancelled
            | ConvertError::InvalidConfig(_)
            | ConvertError::PdfiumBindingFailed(_)
            | ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the request itself was at fault (rejected, not retried).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedFormat | ErrorKind::MalformedSource | ErrorKind::Decode
        )
    }

    /// Directory holding pages written before the failure, if any.
    pub fn partial_output(&self) -> Option<&Path> {
        match self {
            ConvertError::RasterisationFailed { partial_dir, .. }
            | ConvertError::Timeout { partial_dir, .. } => partial_dir.as_deref(),
            _ => None,
        }
    }
}
