//! Output types returned by the conversion API.

use crate::format::Format;
use crate::workspace::Workspace;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One file written by a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: Format,
    /// 0-based page index, or 0 for single-artifact conversions.
    pub ordinal: usize,
}

/// Where the caller finds the result.
///
/// Exactly one shape per conversion: `Archive` iff a PDF with more than one
/// page was rasterised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionResult {
    File {
        path: PathBuf,
    },
    Archive {
        containing_dir: PathBuf,
        archive_name: String,
    },
}

impl ConversionResult {
    pub fn is_archive(&self) -> bool {
        matches!(self, ConversionResult::Archive { .. })
    }

    /// The single file a client should download: the artifact itself, or the
    /// zip inside the bundle directory.
    pub fn download_path(&self) -> PathBuf {
        match self {
            ConversionResult::File { path } => path.clone(),
            ConversionResult::Archive {
                containing_dir,
                archive_name,
            } => containing_dir.join(archive_name),
        }
    }

    /// What to remove to undo this conversion.
    pub fn footprint(&self) -> &Path {
        match self {
            ConversionResult::File { path } => path,
            ConversionResult::Archive { containing_dir, .. } => containing_dir,
        }
    }

    /// [`Self::download_path`] relative to the workspace root, `/`-joined.
    pub fn relative_download_path(&self, workspace: &Workspace) -> Option<String> {
        workspace.relative_to_root(&self.download_path())
    }
}

/// Everything a completed conversion reports.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub result: ConversionResult,
    /// Every artifact written, in ordinal order.
    pub artifacts: Vec<Artifact>,
    pub source_format: Format,
    pub target_format: Format,
    /// Pages in the source, for PDF sources that were opened.
    pub page_count: Option<usize>,
    /// Raw copy of the source kept under `uploads/`, if any.
    pub upload_copy: Option<PathBuf>,
    pub duration_ms: u64,
}

/// What [`crate::inspect`] found out about a payload without converting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    /// `None` when the content is not png, jpeg or pdf.
    pub format: Option<Format>,
    pub mime: String,
    pub byte_len: usize,
    pub page_count: Option<usize>,
}
