//! Artifact naming.
//!
//! Names carry a 128-bit random token (UUIDv4, simple hex form) so that
//! concurrent requests can pick output paths without a shared counter or a
//! lock. All pages of one conversion share a token and differ only by their
//! ordinal. A collision is still possible in principle; artifact writes use
//! no-clobber renames, so a collision surfaces as an I/O error rather than a
//! silently overwritten file.

use crate::format::Format;
use crate::workspace::Workspace;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// What an artifact is for; selects its base directory and name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    /// Raw copy of an uploaded source.
    Upload,
    /// A produced raster image.
    Image,
    /// A produced PDF.
    Pdf,
}

impl ArtifactRole {
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactRole::Upload => "upload",
            ArtifactRole::Image => "image",
            ArtifactRole::Pdf => "pdf",
        }
    }

    /// The role an output of `format` plays.
    pub fn for_output(format: Format) -> Self {
        if format.is_raster() {
            ArtifactRole::Image
        } else {
            ArtifactRole::Pdf
        }
    }
}

/// A random token shared by the artifacts of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameToken(String);

impl NameToken {
    pub fn generate() -> Self {
        NameToken(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces artifact paths under a [`Workspace`].
#[derive(Debug, Clone)]
pub struct ArtifactNamer<'w> {
    workspace: &'w Workspace,
}

impl<'w> ArtifactNamer<'w> {
    pub fn new(workspace: &'w Workspace) -> Self {
        Self { workspace }
    }

    /// `<role dir>/<prefix>-<fresh token>.<extension>`.
    pub fn name(&self, role: ArtifactRole, extension: &str) -> PathBuf {
        self.name_with_token(role, &NameToken::generate(), extension)
    }

    /// `<role dir>/<prefix>-<token>.<extension>`.
    pub fn name_with_token(&self, role: ArtifactRole, token: &NameToken, extension: &str) -> PathBuf {
        self.workspace
            .dir_for(role)
            .join(format!("{}-{}.{}", role.prefix(), token, extension))
    }

    /// Directory holding every page of a multi-page conversion:
    /// `<role dir>/<prefix>-<token>`.
    pub fn bundle_dir(&self, role: ArtifactRole, token: &NameToken) -> PathBuf {
        self.workspace
            .dir_for(role)
            .join(format!("{}-{}", role.prefix(), token))
    }

    /// File name of page `ordinal`: `<prefix>-<token>-<ordinal>.<extension>`.
    pub fn page_file_name(role: ArtifactRole, token: &NameToken, ordinal: usize, extension: &str) -> String {
        format!("{}-{}-{}.{}", role.prefix(), token, ordinal, extension)
    }

    /// File name of a bundle's archive: `<prefix>-<token>.zip`.
    pub fn archive_file_name(role: ArtifactRole, token: &NameToken) -> String {
        format!("{}-{}.zip", role.prefix(), token)
    }
}
