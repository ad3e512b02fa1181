//! Zip packaging for multi-artifact results.
//!
//! Entry names are relative to the *parent* of the archived directory, so
//! the archive's top-level entry is the directory itself and extracting it
//! recreates `<dir>/…` rather than spilling the pages into the current
//! directory. The archive normally lives inside the directory it packs; the
//! exclude pattern keeps it (and any earlier archive) out of its own
//! entries.

use crate::error::ConvertError;
use globset::{Glob, GlobMatcher};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Component, Path};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Default exclude pattern: never pack an archive into an archive.
pub const DEFAULT_EXCLUDE: &str = "*.zip";

/// Counts of what went into an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}

fn archive_error(dir: &Path, detail: impl ToString) -> ConvertError {
    ConvertError::Archive {
        dir: dir.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn exclude_matcher(source: &Path, pattern: &str) -> Result<GlobMatcher, ConvertError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| archive_error(source, format!("bad exclude pattern '{pattern}': {e}")))
}

/// `/`-joined entry name of `path` relative to `base`.
fn entry_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Write a zip of `source` into `writer`.
///
/// Files whose name matches `exclude` are skipped. Directories get a
/// trailing-`/` entry with no content. Each file is opened, copied and closed
/// before the next one is touched.
pub fn archive_directory<W: Write + Seek>(
    source: &Path,
    exclude: &str,
    writer: W,
) -> Result<(W, ArchiveSummary), ConvertError> {
    let matcher = exclude_matcher(source, exclude)?;
    let base = source.parent().unwrap_or_else(|| Path::new(""));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut zip = ZipWriter::new(writer);
    let mut summary = ArchiveSummary::default();

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_error(source, e))?;
        let path = entry.path();
        let name = entry_name(base, path)
            .ok_or_else(|| archive_error(source, format!("cannot name entry '{}'", path.display())))?;

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), options)
                .map_err(|e| archive_error(source, e))?;
            summary.directories += 1;
            continue;
        }

        if matcher.is_match(entry.file_name()) {
            debug!("Skipping excluded entry: {}", name);
            summary.skipped += 1;
            continue;
        }

        debug!("Zipping file: {}", name);
        zip.start_file(name, options)
            .map_err(|e| archive_error(source, e))?;
        let mut file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
        std::io::copy(&mut file, &mut zip).map_err(|e| ConvertError::io(path, e))?;
        summary.files += 1;
    }

    let writer = zip.finish().map_err(|e| archive_error(source, e))?;
    Ok((writer, summary))
}

/// Zip `source` into a new file at `dest` and fsync it.
pub fn write_archive(source: &Path, exclude: &str, dest: &Path) -> Result<ArchiveSummary, ConvertError> {
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|e| ConvertError::io(dest, e))?;

    let (file, summary) = archive_directory(source, exclude, file)?;
    file.sync_all().map_err(|e| ConvertError::io(dest, e))?;

    debug!(
        "Archived {} files ({} dirs, {} skipped) into {}",
        summary.files,
        summary.directories,
        summary.skipped,
        dest.display()
    );
    Ok(summary)
}
