//! Progress-callback trait for per-artifact conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to hear about
//! each artifact as it lands on disk. The CLI drives its progress bar from
//! these events; the server leaves the callback unset.
//!
//! # Example
//!
//! ```rust
//! use file_convert::{ConversionConfig, ConversionProgressCallback};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_artifact_written(&self, ordinal: usize, total: usize, path: &Path) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} → {}", ordinal + 1, total, path.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { written: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the dispatcher as a conversion produces artifacts.
///
/// Events for one conversion arrive in order from the worker thread running
/// it. The server runs many conversions at once, so a shared implementation
/// must still be `Send + Sync`. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once routing is done and the artifact count is known.
    fn on_conversion_start(&self, total_artifacts: usize) {
        let _ = total_artifacts;
    }

    /// Called after each artifact is durably written.
    ///
    /// # Arguments
    /// * `ordinal`: 0-based page index, or 0 for single-artifact paths
    /// * `total`: artifacts this conversion will produce
    /// * `path`: where the artifact was written
    fn on_artifact_written(&self, ordinal: usize, total: usize, path: &Path) {
        let _ = (ordinal, total, path);
    }

    /// Called when the multi-page archive is being written.
    fn on_packaging(&self, archive: &Path) {
        let _ = archive;
    }

    /// Called once after the conversion finished successfully.
    fn on_conversion_complete(&self, total_artifacts: usize) {
        let _ = total_artifacts;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
