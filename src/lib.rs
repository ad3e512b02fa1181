//! # file-convert
//!
//! Convert between PNG, JPEG and PDF.
//!
//! The source format is always sniffed from the bytes, never taken from a
//! filename or a declared MIME type. Every produced file lands under a static
//! root (`images/`, `pdf/`, `uploads/`) with a random, collision-resistant
//! name, and a multi-page PDF rasterised to images also gets a zip of all its
//! pages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes + "png" | "jpeg" | "pdf"
//!  │
//!  ├─ 1. Detect   sniff png / jpeg / pdf from magic bytes
//!  ├─ 2. Route    exhaustive match on (source, target)
//!  ├─ 3. Convert  re-encode │ embed in PDF │ rasterise N pages │ copy
//!  ├─ 4. Package  zip the page bundle (N > 1 only)
//!  └─ 5. Result   File { path } or Archive { containing_dir, archive_name }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use file_convert::{convert, ConversionConfig, ConversionResult};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().static_root("./static").build()?;
//!     let bytes = std::fs::read("scan.pdf")?;
//!     let output = convert(bytes, "jpeg", &config).await?;
//!     match output.result {
//!         ConversionResult::File { path } => println!("{}", path.display()),
//!         ConversionResult::Archive { containing_dir, archive_name } => {
//!             println!("{}", containing_dir.join(archive_name).display())
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | The axum upload/download service in [`server`] |
//! | `cli`    | on      | The `file-convert` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Library-only users can skip both:
//! ```toml
//! file-convert = { version = "0.1", default-features = false }
//! ```
//!
//! PDF work needs a pdfium shared library at runtime; see
//! [`pipeline::engine`] for where it is looked up.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{
    convert, convert_blocking, convert_cancellable, convert_file, inspect, inspect_blocking, CancelToken,
    ConversionPath, Stage,
};
pub use error::{ConvertError, ErrorKind};
pub use format::{detect, Format};
pub use naming::{ArtifactNamer, ArtifactRole, NameToken};
pub use output::{Artifact, ConversionOutput, ConversionResult, InspectReport};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use workspace::{CleanupReport, Workspace};
