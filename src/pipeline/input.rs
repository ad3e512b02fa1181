//! Input resolution: turn an uploaded payload into a [`SourceAsset`].
//!
//! The asset's format comes from content sniffing alone
//! ([`crate::format::detect`]). An empty payload is rejected as malformed
//! before detection runs, so a zero-byte "PDF" is reported as a bad source
//! rather than an unsupported format.

use crate::error::ConvertError;
use crate::format::{self, Format};
use std::path::Path;
use tracing::debug;

/// Immutable source bytes plus their detected format.
///
/// Created once per request and owned by the dispatcher for the duration of
/// one conversion.
#[derive(Debug, Clone)]
pub struct SourceAsset {
    bytes: Vec<u8>,
    format: Format,
}

impl SourceAsset {
    /// Sniff `bytes` and wrap them.
    ///
    /// # Errors
    /// * [`ConvertError::EmptySource`] for an empty payload
    /// * [`ConvertError::UnsupportedSource`] when detection yields unknown
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConvertError> {
        if bytes.is_empty() {
            return Err(ConvertError::EmptySource);
        }
        let mime = format::sniff_mime(&bytes);
        let format = Format::from_mime(mime).ok_or_else(|| ConvertError::UnsupportedSource {
            mime: mime.to_string(),
        })?;
        debug!("Detected source as {} ({} bytes)", mime, bytes.len());
        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reject payloads larger than `limit` bytes.
pub fn check_size(size: u64, limit: u64) -> Result<(), ConvertError> {
    if size > limit {
        return Err(ConvertError::SourceTooLarge { size, limit });
    }
    Ok(())
}

/// Read a local file, refusing anything larger than `limit` bytes.
pub fn read_source(path: &Path, limit: u64) -> Result<Vec<u8>, ConvertError> {
    let meta = std::fs::metadata(path).map_err(|e| ConvertError::io(path, e))?;
    if !meta.is_file() {
        return Err(ConvertError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    check_size(meta.len(), limit)?;
    let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}
