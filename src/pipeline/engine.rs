//! Scoped access to the pdfium engine.
//!
//! A [`PdfEngine`] is acquired at the start of every PDF-touching conversion
//! and dropped at its end. Dropping the inner [`Pdfium`] tears the library
//! state down, so release happens on every exit path, early `?` returns
//! included.
//!
//! Library lookup order: the configured path, `PDFIUM_LIB_PATH`, the working
//! directory, then the system library.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable naming an explicit pdfium library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// The pdfium engine for the lifetime of one conversion.
pub struct PdfEngine {
    pdfium: Pdfium,
}

impl PdfEngine {
    /// Bind pdfium following the lookup order in the module docs.
    pub fn acquire(config: &ConversionConfig) -> Result<Self, ConvertError> {
        let explicit = config
            .pdfium_lib_path
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(&path).map_err(|e| {
                    ConvertError::PdfiumBindingFailed(format!("{}: {}", path.display(), e))
                })?
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| ConvertError::PdfiumBindingFailed(e.to_string()))?,
        };

        debug!("pdfium engine acquired");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    pub fn pdfium(&self) -> &Pdfium {
        &self.pdfium
    }

    /// Open a PDF held in memory. Any failure is a malformed source.
    pub fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<PdfDocument<'a>, ConvertError> {
        self.pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| {
                let detail = format!("{:?}", e);
                if detail.contains("Password") || detail.contains("password") {
                    ConvertError::MalformedPdf {
                        detail: "document is password-protected".into(),
                    }
                } else {
                    ConvertError::MalformedPdf { detail }
                }
            })
    }
}

impl Drop for PdfEngine {
    fn drop(&mut self) {
        debug!("pdfium engine released");
    }
}
