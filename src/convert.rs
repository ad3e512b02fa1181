//! The conversion dispatcher.
//!
//! One call converts one payload. The work moves through a fixed sequence of
//! stages, each transition logged:
//!
//! ```text
//! Detecting ──▶ Routing ──▶ Converting ──┬──────────────▶ Done
//!     │            │            │        └─▶ Packaging ─▶ Done
//!     └────────────┴────────────┴────────────────────────▶ Failed
//! ```
//!
//! `Packaging` only happens when a PDF with more than one page is rasterised.
//! Any error ends the call in `Failed`; a partially converted result is never
//! returned as success.
//!
//! All work runs on the calling thread in [`convert_blocking`]. The async
//! entry points move it onto tokio's blocking pool and bound it with the
//! configured deadline. When that bound fires the worker is cancelled through
//! a [`CancelToken`]: it writes nothing further and removes what it already
//! wrote.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::format::{self, Format};
use crate::naming::{ArtifactNamer, ArtifactRole, NameToken};
use crate::output::{Artifact, ConversionOutput, ConversionResult, InspectReport};
use crate::pipeline::archive;
use crate::pipeline::embed;
use crate::pipeline::encode;
use crate::pipeline::engine::PdfEngine;
use crate::pipeline::input::{self, SourceAsset};
use crate::pipeline::render::{self, RenderSettings};
use crate::progress::ConversionProgressCallback;
use crate::workspace::{write_durably, Workspace};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Extra time the async wrappers allow past the deadline, so the worker's own
/// between-pages check reports first (with its partial output).
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

// ── Routing ──────────────────────────────────────────────────────────────

/// Which pipeline a (source, target) pair runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPath {
    /// png/jpeg → png/jpeg through the codec adapter.
    Reencode,
    /// png/jpeg → pdf: decode, then the PDF writer.
    Embed,
    /// pdf → png/jpeg: one rasterised image per page.
    Rasterize,
    /// pdf → pdf: the bytes are written back unchanged.
    Passthrough,
}

impl ConversionPath {
    pub fn for_formats(source: Format, target: Format) -> Self {
        match (source, target) {
            (Format::Png | Format::Jpeg, Format::Png | Format::Jpeg) => ConversionPath::Reencode,
            (Format::Png | Format::Jpeg, Format::Pdf) => ConversionPath::Embed,
            (Format::Pdf, Format::Png | Format::Jpeg) => ConversionPath::Rasterize,
            (Format::Pdf, Format::Pdf) => ConversionPath::Passthrough,
        }
    }
}

/// Dispatcher states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detecting,
    Routing,
    Converting,
    Packaging,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detecting => "detecting",
            Stage::Routing => "routing",
            Stage::Converting => "converting",
            Stage::Packaging => "packaging",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct StageTracker {
    stage: Stage,
}

impl StageTracker {
    fn new() -> Self {
        info!("Stage: {}", Stage::Detecting);
        Self {
            stage: Stage::Detecting,
        }
    }

    fn advance(&mut self, next: Stage) {
        info!("Stage: {} → {}", self.stage, next);
        self.stage = next;
    }
}

// ── Cancellation ─────────────────────────────────────────────────────────

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const SETTLED: u8 = 2;

/// Stop signal shared between one conversion and whoever is waiting on it.
///
/// [`cancel`](Self::cancel) and the worker settling its outcome race on a
/// single atomic, so exactly one side wins: either the worker's result (or
/// error, with its partial output) reaches the caller, or the worker rolls
/// back everything it wrote. Use one token per conversion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the conversion to stop.
    ///
    /// Returns `false` when it already settled, in which case its outcome is
    /// final and must be collected.
    pub fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(state) => state == CANCELLED,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Claim the outcome for delivery. `false` if cancelled first.
    fn settle(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, SETTLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ── Deadline ─────────────────────────────────────────────────────────────

struct Deadline {
    started: Instant,
    budget: Duration,
    cancel: CancelToken,
}

impl Deadline {
    fn new(budget: Duration, cancel: &CancelToken) -> Self {
        Self {
            started: Instant::now(),
            budget,
            cancel: cancel.clone(),
        }
    }

    fn check(&self, partial_dir: Option<&Path>) -> Result<(), ConvertError> {
        if self.cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        if self.started.elapsed() > self.budget {
            return Err(ConvertError::Timeout {
                secs: self.budget.as_secs(),
                partial_dir: partial_dir.map(Path::to_path_buf),
            });
        }
        Ok(())
    }
}

// ── Job ──────────────────────────────────────────────────────────────────

/// One conversion's view of the disk: every write goes through here, is
/// preceded by a deadline check, and is recorded for rollback.
struct Job<'a> {
    config: &'a ConversionConfig,
    workspace: &'a Workspace,
    deadline: Deadline,
    written: Vec<PathBuf>,
}

impl<'a> Job<'a> {
    fn new(config: &'a ConversionConfig, workspace: &'a Workspace, cancel: &CancelToken) -> Self {
        Self {
            config,
            workspace,
            deadline: Deadline::new(config.timeout(), cancel),
            written: Vec::new(),
        }
    }

    fn write(&mut self, path: &Path, bytes: &[u8], partial_dir: Option<&Path>) -> Result<(), ConvertError> {
        self.deadline.check(partial_dir)?;
        write_durably(path, bytes)?;
        self.written.push(path.to_path_buf());
        Ok(())
    }

    fn create_dir(&mut self, dir: &Path) -> Result<(), ConvertError> {
        self.deadline.check(None)?;
        std::fs::create_dir(dir).map_err(|e| ConvertError::io(dir, e))?;
        self.written.push(dir.to_path_buf());
        Ok(())
    }

    fn archive(&mut self, bundle: &Path, archive_path: &Path) -> Result<(), ConvertError> {
        self.deadline.check(None)?;
        // Recorded up front: a failed write can leave a truncated archive.
        self.written.push(archive_path.to_path_buf());
        archive::write_archive(bundle, archive::DEFAULT_EXCLUDE, archive_path).map(|_| ())
    }

    /// Remove what this job wrote. With `delivered`, the directory the error
    /// reports as partial output is left for the caller to discard.
    fn abandon(&self, err: &ConvertError, delivered: bool) {
        let keep = if delivered { err.partial_output() } else { None };
        for path in self.written.iter().rev() {
            if keep.is_some_and(|dir| path.starts_with(dir)) {
                continue;
            }
            if let Err(e) = self.workspace.discard(path) {
                warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }

    fn notify(&self, event: impl FnOnce(&dyn ConversionProgressCallback)) {
        if let Some(ref cb) = self.config.progress_callback {
            event(cb.as_ref());
        }
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Convert `bytes` to `target` ("png", "jpeg"/"jpg" or "pdf"), writing the
/// artifacts under `config.static_root`.
///
/// The target is validated and the source sniffed before anything touches the
/// disk, so an unsupported request writes nothing.
///
/// # Errors
/// See [`ConvertError::kind`] for how the variants group. On
/// [`ConvertError::RasterisationFailed`] and [`ConvertError::Timeout`] the
/// pages written so far are still on disk; see
/// [`ConvertError::partial_output`]. Every other failure leaves nothing behind.
pub fn convert_blocking(
    bytes: Vec<u8>,
    target: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    convert_cancellable(bytes, target, config, &CancelToken::new())
}

/// [`convert_blocking`] that stops at its next write once `cancel` fires,
/// removing everything it wrote and failing with [`ConvertError::Cancelled`].
pub fn convert_cancellable(
    bytes: Vec<u8>,
    target: &str,
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> Result<ConversionOutput, ConvertError> {
    let started = Instant::now();
    let mut tracker = StageTracker::new();

    match dispatch(bytes, target, config, cancel, &mut tracker) {
        Ok(mut output) => {
            tracker.advance(Stage::Done);
            output.duration_ms = started.elapsed().as_millis() as u64;
            info!(
                "Conversion complete: {} → {}, {} artifact(s) in {}ms",
                output.source_format,
                output.target_format,
                output.artifacts.len(),
                output.duration_ms
            );
            Ok(output)
        }
        Err(e) => {
            let failed_in = tracker.stage;
            tracker.advance(Stage::Failed);
            warn!("Conversion failed while {}: {}", failed_in, e);
            Err(e)
        }
    }
}

/// Async [`convert_blocking`]: runs on the blocking pool under the
/// configured deadline.
pub async fn convert(
    bytes: Vec<u8>,
    target: impl Into<String>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let target = target.into();
    let worker_config = config.clone();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || {
        convert_cancellable(bytes, &target, &worker_config, &worker_cancel)
    });
    supervise(handle, config.timeout() + DEADLINE_GRACE, config.timeout_secs, &cancel).await
}

/// Read `path` (bounded by `max_upload_bytes`) and convert it.
pub async fn convert_file(
    path: impl AsRef<Path>,
    target: impl Into<String>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConvertError> {
    let path = path.as_ref().to_path_buf();
    let limit = config.max_upload_bytes;
    info!("Reading {}", path.display());
    let bytes = run_blocking(config, move || input::read_source(&path, limit)).await?;
    convert(bytes, target, config).await
}

/// Describe a payload without converting it.
///
/// PDFs are opened to count their pages; anything pdfium rejects fails with
/// [`ConvertError::MalformedPdf`].
pub fn inspect_blocking(bytes: &[u8], config: &ConversionConfig) -> Result<InspectReport, ConvertError> {
    if bytes.is_empty() {
        return Err(ConvertError::EmptySource);
    }
    let mime = format::sniff_mime(bytes);
    let detected = Format::from_mime(mime);

    let page_count = match detected {
        Some(Format::Pdf) => {
            let engine = PdfEngine::acquire(config)?;
            Some(render::count_pages(&engine, bytes)?)
        }
        _ => None,
    };

    Ok(InspectReport {
        format: detected,
        mime: mime.to_string(),
        byte_len: bytes.len(),
        page_count,
    })
}

/// Async [`inspect_blocking`].
pub async fn inspect(bytes: Vec<u8>, config: &ConversionConfig) -> Result<InspectReport, ConvertError> {
    let worker_config = config.clone();
    run_blocking(config, move || inspect_blocking(&bytes, &worker_config)).await
}

/// Bounded blocking work that writes nothing.
async fn run_blocking<T, F>(config: &ConversionConfig, work: F) -> Result<T, ConvertError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    supervise(handle, config.timeout() + DEADLINE_GRACE, config.timeout_secs, &CancelToken::new()).await
}

/// Wait up to `limit` for `handle`. On expiry `cancel` fires; if the worker
/// settled first its outcome is collected instead.
async fn supervise<T>(
    mut handle: JoinHandle<Result<T, ConvertError>>,
    limit: Duration,
    secs: u64,
    cancel: &CancelToken,
) -> Result<T, ConvertError> {
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(joined) => flatten(joined),
        Err(_) if cancel.cancel() => {
            warn!("Worker still running after {}s; cancelled", secs);
            Err(ConvertError::Timeout {
                secs,
                partial_dir: None,
            })
        }
        Err(_) => flatten(handle.await),
    }
}

fn flatten<T>(joined: Result<Result<T, ConvertError>, JoinError>) -> Result<T, ConvertError> {
    joined.map_err(|e| ConvertError::Internal(format!("worker panicked: {}", e)))?
}

// ── Dispatch ─────────────────────────────────────────────────────────────

/// What a conversion path produced, before timing is filled in.
struct Converted {
    result: ConversionResult,
    artifacts: Vec<Artifact>,
    page_count: Option<usize>,
    upload_copy: Option<PathBuf>,
}

impl Converted {
    fn single(path: PathBuf, format: Format) -> Self {
        Self {
            result: ConversionResult::File { path: path.clone() },
            artifacts: vec![Artifact {
                path,
                format,
                ordinal: 0,
            }],
            page_count: None,
            upload_copy: None,
        }
    }
}

fn dispatch(
    bytes: Vec<u8>,
    target: &str,
    config: &ConversionConfig,
    cancel: &CancelToken,
    tracker: &mut StageTracker,
) -> Result<ConversionOutput, ConvertError> {
    let target: Format = target.parse()?;
    input::check_size(bytes.len() as u64, config.max_upload_bytes)?;
    let source = SourceAsset::from_bytes(bytes)?;
    info!(
        "Starting conversion: {} ({} bytes) → {}",
        source.format(),
        source.len(),
        target
    );

    tracker.advance(Stage::Routing);
    let path = ConversionPath::for_formats(source.format(), target);
    debug!("Route: {:?}", path);

    let workspace = Workspace::new(&config.static_root);
    workspace.ensure_dirs()?;
    let mut job = Job::new(config, &workspace, cancel);

    tracker.advance(Stage::Converting);
    let outcome = match path {
        ConversionPath::Reencode => reencode_image(&mut job, &source, target),
        ConversionPath::Embed => embed_image(&mut job, &source),
        ConversionPath::Passthrough => passthrough_pdf(&mut job, &source),
        ConversionPath::Rasterize => rasterize_pdf(&mut job, &source, target, tracker),
    };

    let delivered = cancel.settle();
    let converted = match outcome {
        Ok(converted) if delivered => converted,
        Ok(converted) => {
            let err = ConvertError::Cancelled;
            job.abandon(&err, false);
            debug!("Rolled back {}", converted.result.footprint().display());
            return Err(err);
        }
        Err(e) => {
            job.abandon(&e, delivered);
            return Err(e);
        }
    };

    job.notify(|cb| cb.on_conversion_complete(converted.artifacts.len()));

    Ok(ConversionOutput {
        result: converted.result,
        artifacts: converted.artifacts,
        source_format: source.format(),
        target_format: target,
        page_count: converted.page_count,
        upload_copy: converted.upload_copy,
        duration_ms: 0,
    })
}

fn write_single(
    job: &mut Job<'_>,
    path: PathBuf,
    bytes: &[u8],
    format: Format,
) -> Result<Converted, ConvertError> {
    job.notify(|cb| cb.on_conversion_start(1));
    job.write(&path, bytes, None)?;
    info!("Wrote {}", path.display());
    job.notify(|cb| cb.on_artifact_written(0, 1, &path));
    Ok(Converted::single(path, format))
}

fn reencode_image(
    job: &mut Job<'_>,
    source: &SourceAsset,
    target: Format,
) -> Result<Converted, ConvertError> {
    let bytes = encode::reencode(source.bytes(), source.format(), target)?;
    let path = ArtifactNamer::new(job.workspace).name(ArtifactRole::for_output(target), target.extension());
    write_single(job, path, &bytes, target)
}

fn embed_image(job: &mut Job<'_>, source: &SourceAsset) -> Result<Converted, ConvertError> {
    let pdf = {
        let engine = PdfEngine::acquire(job.config)?;
        embed::embed_bytes(&engine, source.bytes(), source.format())?
    };
    let path = ArtifactNamer::new(job.workspace).name(ArtifactRole::Pdf, Format::Pdf.extension());
    let mut converted = write_single(job, path, &pdf, Format::Pdf)?;
    converted.page_count = Some(1);
    Ok(converted)
}

fn passthrough_pdf(job: &mut Job<'_>, source: &SourceAsset) -> Result<Converted, ConvertError> {
    let page_count = if job.config.validate_pdf_passthrough {
        let engine = PdfEngine::acquire(job.config)?;
        let document = engine.open(source.bytes())?;
        Some(render::page_count(&document)?)
    } else {
        None
    };

    let token = NameToken::generate();
    let upload_copy = persist_upload(job, source, &token)?;

    let path = ArtifactNamer::new(job.workspace).name_with_token(
        ArtifactRole::Pdf,
        &token,
        Format::Pdf.extension(),
    );
    let mut converted = write_single(job, path, source.bytes(), Format::Pdf)?;
    converted.page_count = page_count;
    converted.upload_copy = upload_copy;
    Ok(converted)
}

fn persist_upload(
    job: &mut Job<'_>,
    source: &SourceAsset,
    token: &NameToken,
) -> Result<Option<PathBuf>, ConvertError> {
    if !job.config.persist_uploads {
        return Ok(None);
    }
    let path = ArtifactNamer::new(job.workspace).name_with_token(
        ArtifactRole::Upload,
        token,
        source.format().extension(),
    );
    job.write(&path, source.bytes(), None)?;
    debug!("Kept raw upload at {}", path.display());
    Ok(Some(path))
}

fn rasterize_pdf(
    job: &mut Job<'_>,
    source: &SourceAsset,
    target: Format,
    tracker: &mut StageTracker,
) -> Result<Converted, ConvertError> {
    let engine = PdfEngine::acquire(job.config)?;
    let document = engine.open(source.bytes())?;
    let pages = render::page_count(&document)?;
    if pages > job.config.max_pages {
        return Err(ConvertError::TooManyPages {
            pages,
            max: job.config.max_pages,
        });
    }
    info!("PDF has {} pages", pages);

    let token = NameToken::generate();
    let upload_copy = persist_upload(job, source, &token)?;
    let settings = RenderSettings::from_config(job.config);
    let role = ArtifactRole::for_output(target);
    let extension = target.extension();

    job.notify(|cb| cb.on_conversion_start(pages));

    if pages == 1 {
        job.deadline.check(None)?;
        let bytes = render::render_page(&document, 0, target, &settings)?;
        let path = job
            .workspace
            .dir_for(role)
            .join(ArtifactNamer::page_file_name(role, &token, 0, extension));
        job.write(&path, &bytes, None)?;
        info!("Wrote {}", path.display());
        job.notify(|cb| cb.on_artifact_written(0, 1, &path));

        let mut converted = Converted::single(path, target);
        converted.page_count = Some(1);
        converted.upload_copy = upload_copy;
        return Ok(converted);
    }

    let bundle = ArtifactNamer::new(job.workspace).bundle_dir(role, &token);
    job.create_dir(&bundle)?;

    let artifacts = render_bundle(job, &bundle, &token, target, pages, |index| {
        render::render_page(&document, index, target, &settings)
    })?;
    drop(document);
    drop(engine);

    tracker.advance(Stage::Packaging);
    let archive_name = ArtifactNamer::archive_file_name(role, &token);
    let archive_path = bundle.join(&archive_name);
    job.notify(|cb| cb.on_packaging(&archive_path));
    job.archive(&bundle, &archive_path)?;
    info!("Packaged {} pages into {}", pages, archive_path.display());

    Ok(Converted {
        result: ConversionResult::Archive {
            containing_dir: bundle,
            archive_name,
        },
        artifacts,
        page_count: Some(pages),
        upload_copy,
    })
}

/// Render every page into `bundle`, one at a time, each durably written
/// before the next starts.
///
/// A render failure or a missed deadline at page `k` leaves pages `0..k` in
/// `bundle` and reports it as partial output.
fn render_bundle(
    job: &mut Job<'_>,
    bundle: &Path,
    token: &NameToken,
    target: Format,
    pages: usize,
    mut render_page: impl FnMut(usize) -> Result<Vec<u8>, ConvertError>,
) -> Result<Vec<Artifact>, ConvertError> {
    let role = ArtifactRole::for_output(target);
    let mut artifacts = Vec::with_capacity(pages);

    for index in 0..pages {
        job.deadline.check(Some(bundle))?;

        let bytes = render_page(index).map_err(|e| match e {
            ConvertError::RasterisationFailed { page, detail, .. } => ConvertError::RasterisationFailed {
                page,
                detail,
                partial_dir: Some(bundle.to_path_buf()),
            },
            other => ConvertError::RasterisationFailed {
                page: index,
                detail: other.to_string(),
                partial_dir: Some(bundle.to_path_buf()),
            },
        })?;

        let path = bundle.join(ArtifactNamer::page_file_name(role, token, index, target.extension()));
        job.write(&path, &bytes, Some(bundle))?;
        debug!("Wrote page {}/{} to {}", index + 1, pages, path.display());
        job.notify(|cb| cb.on_artifact_written(index, pages, &path));

        artifacts.push(Artifact {
            path,
            format: target,
            ordinal: index,
        });
    }

    Ok(artifacts)
}
