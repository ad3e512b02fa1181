//! The on-disk layout every conversion writes into.
//!
//! ```text
//! <static root>/
//!   uploads/   raw copies of uploaded PDFs
//!   images/    produced png/jpeg files and multi-page bundles
//!   pdf/       produced PDFs
//! ```
//!
//! Artifacts stay here until [`Workspace::cleanup`] (or a targeted
//! [`Workspace::discard`]) removes them.

use crate::error::ConvertError;
use crate::naming::ArtifactRole;
use serde::Serialize;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const UPLOADS_DIR: &str = "uploads";
const IMAGES_DIR: &str = "images";
const PDF_DIR: &str = "pdf";

/// Root of the artifact directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

/// What [`Workspace::cleanup`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join(PDF_DIR)
    }

    pub fn dir_for(&self, role: ArtifactRole) -> PathBuf {
        match role {
            ArtifactRole::Upload => self.uploads_dir(),
            ArtifactRole::Image => self.images_dir(),
            ArtifactRole::Pdf => self.pdf_dir(),
        }
    }

    fn managed_dirs(&self) -> [PathBuf; 3] {
        [self.images_dir(), self.pdf_dir(), self.uploads_dir()]
    }

    /// Create the three artifact directories when missing.
    pub fn ensure_dirs(&self) -> Result<(), ConvertError> {
        for dir in self.managed_dirs() {
            if dir.is_dir() {
                continue;
            }
            info!("Creating directory {} as it doesn't exist", dir.display());
            std::fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Remove every file and bundle directory inside the three artifact
    /// directories. The directories themselves are kept.
    pub fn cleanup(&self) -> Result<CleanupReport, ConvertError> {
        let mut report = CleanupReport::default();

        for dir in self.managed_dirs() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ConvertError::io(&dir, e)),
            };
            info!("Removing files in directory: {}", dir.display());

            for entry in entries {
                let entry = entry.map_err(|e| ConvertError::io(&dir, e))?;
                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| ConvertError::io(&path, e))?;
                debug!("Removing {}", path.display());
                if file_type.is_dir() {
                    std::fs::remove_dir_all(&path).map_err(|e| ConvertError::io(&path, e))?;
                    report.dirs_removed += 1;
                } else {
                    std::fs::remove_file(&path).map_err(|e| ConvertError::io(&path, e))?;
                    report.files_removed += 1;
                }
            }
        }

        info!(
            "Cleanup removed {} files and {} directories",
            report.files_removed, report.dirs_removed
        );
        Ok(report)
    }

    /// Remove one artifact file or bundle directory.
    ///
    /// Paths outside the static root are refused. A path that is already
    /// gone is not an error.
    pub fn discard(&self, path: &Path) -> Result<(), ConvertError> {
        if !path.starts_with(&self.root) {
            return Err(ConvertError::Internal(format!(
                "refusing to discard '{}' outside '{}'",
                path.display(),
                self.root.display()
            )));
        }
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                info!("Discarded {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConvertError::io(path, e)),
        }
    }

    /// Remove the pages a failed conversion left behind, if it reports any.
    /// Returns the removed directory.
    pub fn discard_partial_output(&self, err: &ConvertError) -> Option<PathBuf> {
        let partial = err.partial_output()?;
        match self.discard(partial) {
            Ok(()) => Some(partial.to_path_buf()),
            Err(e) => {
                warn!("Could not discard partial output: {}", e);
                None
            }
        }
    }

    /// `images/image-….png`-style path of an artifact relative to the root,
    /// always `/`-separated. `None` when the path is not under the root.
    pub fn relative_to_root(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Inverse of [`Workspace::relative_to_root`]. Rejects absolute paths and
    /// any `..` component.
    pub fn resolve_relative(&self, rel: &str) -> Option<PathBuf> {
        let rel_path = Path::new(rel);
        if rel.is_empty() || !rel_path.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(rel_path))
    }
}

/// Write `bytes` to `path` through a temp file in the same directory, fsync
/// it and rename it into place. Refuses to replace an existing file.
pub(crate) fn write_durably(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let dir = path
        .parent()
        .ok_or_else(|| ConvertError::Internal(format!("'{}' has no parent", path.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ConvertError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| ConvertError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ConvertError::io(path, e))?;
    tmp.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            warn!("Artifact name collision on {}", path.display());
        }
        ConvertError::io(path, e.error)
    })?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
