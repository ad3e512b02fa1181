//! Configuration types for file conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so the
//! server can share a single config across request workers and the CLI can
//! map its flags onto it in one place.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Lowest accepted rendering DPI.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rendering DPI.
pub const MAX_DPI: u32 = 600;

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use file_convert::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .static_root("./static")
///     .dpi(150)
///     .max_pages(50)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Root holding the `uploads/`, `images/` and `pdf/` directories. Default: `./static`.
    pub static_root: PathBuf,

    /// Rendering DPI for PDF pages. Range: 72–600. Default: 100.
    ///
    /// Fixed for every page of every conversion; a page of `w × h` points
    /// renders to `w·dpi/72 × h·dpi/72` pixels.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 6000.
    ///
    /// Stops an oversized page (posters, plans) at the configured DPI from
    /// allocating hundreds of megabytes of bitmap.
    pub max_rendered_pixels: u32,

    /// Reject PDFs with more pages than this. Default: 500.
    pub max_pages: usize,

    /// Wall-clock budget for one conversion in seconds. Default: 120.
    ///
    /// Checked between pages by the rasteriser and enforced around the
    /// blocking worker by the async entry points.
    pub timeout_secs: u64,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: u64,

    /// Keep a raw copy of every source PDF under `uploads/`. Default: true.
    pub persist_uploads: bool,

    /// Open PDF→PDF sources with pdfium before copying them. Default: false.
    ///
    /// Off, the passthrough is a byte copy with no parse at all.
    pub validate_pdf_passthrough: bool,

    /// Explicit pdfium library path. Falls back to `PDFIUM_LIB_PATH`, the
    /// working directory, then the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Per-artifact progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            static_root: PathBuf::from("./static"),
            dpi: 100,
            max_rendered_pixels: 6000,
            max_pages: 500,
            timeout_secs: 120,
            max_upload_bytes: 50 * 1024 * 1024,
            persist_uploads: true,
            validate_pdf_passthrough: false,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("static_root", &self.static_root)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pages", &self.max_pages)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("persist_uploads", &self.persist_uploads)
            .field("validate_pdf_passthrough", &self.validate_pdf_passthrough)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The conversion deadline as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn static_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.static_root = root.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn persist_uploads(mut self, v: bool) -> Self {
        self.config.persist_uploads = v;
        self
    }

    pub fn validate_pdf_passthrough(mut self, v: bool) -> Self {
        self.config.validate_pdf_passthrough = v;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.dpi < MIN_DPI || c.dpi > MAX_DPI {
            return Err(ConvertError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if c.max_pages == 0 {
            return Err(ConvertError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.static_root.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "static_root must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
