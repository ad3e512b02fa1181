//! CLI binary for file-convert.
//!
//! A thin shim over the library crate: maps flags onto `ConversionConfig`,
//! runs one subcommand and prints the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use file_convert::{
    convert_file, inspect, server, ConversionConfig, ConversionProgressCallback, ConversionResult,
    ProgressCallback, Workspace,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner until the artifact count is known, then a bar advanced per written
/// file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading source…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_artifacts: usize) {
        self.activate_bar(total_artifacts);
    }

    fn on_artifact_written(&self, ordinal: usize, total: usize, path: &Path) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            ordinal + 1,
            total,
            dim(&path.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_packaging(&self, archive: &Path) {
        self.bar.set_prefix("Packaging");
        self.bar.set_message(archive.display().to_string());
    }

    fn on_conversion_complete(&self, total_artifacts: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} file(s) written",
            green("✔"),
            bold(&total_artifacts.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Rasterise every page of a PDF (multi-page output is also zipped)
  file-convert convert scan.pdf --to jpeg

  # Re-encode an image
  file-convert convert photo.png --to jpg

  # Wrap an image in a one-page PDF, print the result as JSON
  file-convert convert diagram.png --to pdf --json

  # What is this file?
  file-convert inspect mystery.bin

  # Run the upload/download web service
  file-convert serve --port 4433

  # Empty images/, pdf/ and uploads/
  file-convert cleanup

ENVIRONMENT VARIABLES:
  FILE_CONVERT_STATIC_ROOT  Static root holding images/, pdf/, uploads/
  FILE_CONVERT_DPI          Rendering DPI for PDF pages (72-600)
  FILE_CONVERT_TIMEOUT      Per-conversion deadline in seconds
  FILE_CONVERT_MAX_PAGES    Largest accepted page count
  PORT                      Port for `serve`
  PDFIUM_LIB_PATH           Path to an existing libpdfium
  RUST_LOG                  Overrides the log filter
"#;

/// Convert between PNG, JPEG and PDF.
#[derive(Parser, Debug)]
#[command(
    name = "file-convert",
    version,
    about = "Convert between PNG, JPEG and PDF",
    long_about = "Convert images and PDFs between png, jpeg and pdf. The source format is \
detected from the file contents. PDFs converted to images produce one file per page, and \
multi-page results are also packed into a zip archive.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding images/, pdf/ and uploads/.
    #[arg(long, global = true, env = "FILE_CONVERT_STATIC_ROOT", default_value = "./static")]
    static_root: PathBuf,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, global = true, env = "FILE_CONVERT_DPI", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Per-conversion deadline in seconds.
    #[arg(long, global = true, env = "FILE_CONVERT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Reject PDFs with more pages than this.
    #[arg(long, global = true, env = "FILE_CONVERT_MAX_PAGES", default_value_t = 500)]
    max_pages: usize,

    /// Largest accepted source in MiB.
    #[arg(long, global = true, env = "FILE_CONVERT_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: u64,

    /// Do not keep raw copies of source PDFs under uploads/.
    #[arg(long, global = true, env = "FILE_CONVERT_NO_UPLOAD_COPY")]
    no_upload_copy: bool,

    /// Open PDF→PDF sources with pdfium before copying them.
    #[arg(long, global = true, env = "FILE_CONVERT_VALIDATE_PDF")]
    validate_pdf: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "FILE_CONVERT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILE_CONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILE_CONVERT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one file.
    Convert {
        /// Source file (png, jpeg or pdf; detected from content).
        input: PathBuf,

        /// Target format: png, jpeg (jpg) or pdf.
        #[arg(long, short = 't')]
        to: String,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Report a file's detected format, size and page count.
    Inspect {
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP upload/download service.
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(long, env = "PORT", default_value_t = 4433)]
        port: u16,
    },

    /// Remove every artifact under the static root.
    Cleanup {
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn wants_json(&self) -> bool {
        matches!(
            self,
            Command::Convert { json: true, .. } | Command::Inspect { json: true, .. } | Command::Cleanup { json: true }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs for `convert`; the
    // server always logs at INFO so requests are visible.
    let is_convert = matches!(cli.command, Command::Convert { .. });
    let show_progress = is_convert && !cli.quiet && !cli.no_progress && !cli.command.wants_json();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    match cli.command {
        Command::Convert { ref input, ref to, json } => run_convert(&config, input, to, json, cli.quiet).await,
        Command::Inspect { ref input, json } => run_inspect(&config, input, json).await,
        Command::Serve { host, port } => {
            let addr = SocketAddr::new(host, port);
            server::serve(config, addr)
                .await
                .with_context(|| format!("Server on {addr} failed"))
        }
        Command::Cleanup { json } => {
            let workspace = Workspace::new(&config.static_root);
            let report = workspace.cleanup().context("Cleanup failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialise report")?);
            } else if !cli.quiet {
                eprintln!(
                    "{} removed {} files and {} directories under {}",
                    green("✔"),
                    report.files_removed,
                    report.dirs_removed,
                    config.static_root.display()
                );
            }
            Ok(())
        }
    }
}

async fn run_convert(config: &ConversionConfig, input: &Path, to: &str, json: bool, quiet: bool) -> Result<()> {
    let output = match convert_file(input, to, config).await {
        Ok(output) => output,
        Err(e) => {
            let workspace = Workspace::new(&config.static_root);
            if let Some(partial) = workspace.discard_partial_output(&e) {
                if !quiet {
                    eprintln!("{} removed partial output {}", cyan("⚠"), partial.display());
                }
            }
            return Err(e).with_context(|| format!("Conversion of {} failed", input.display()));
        }
    };

    if json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    // The download path goes to stdout so it can be piped.
    println!("{}", output.result.download_path().display());
    if !quiet {
        let shape = match &output.result {
            ConversionResult::File { .. } => "file".to_string(),
            ConversionResult::Archive { containing_dir, .. } => {
                format!("archive of {} pages in {}", output.artifacts.len(), containing_dir.display())
            }
        };
        eprintln!(
            "{}  {} → {}  {}  {}ms",
            green("✔"),
            output.source_format,
            output.target_format,
            shape,
            output.duration_ms
        );
    }
    Ok(())
}

async fn run_inspect(config: &ConversionConfig, input: &Path, json: bool) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let report = inspect(bytes, config).await.context("Failed to inspect file")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialise report")?);
        return Ok(());
    }

    println!("File:      {}", input.display());
    match report.format {
        Some(format) => println!("Format:    {}", format),
        None => println!("Format:    unsupported"),
    }
    println!("MIME:      {}", report.mime);
    println!("Size:      {} bytes", report.byte_len);
    if let Some(pages) = report.page_count {
        println!("Pages:     {}", pages);
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .static_root(&cli.static_root)
        .dpi(cli.dpi)
        .timeout_secs(cli.timeout)
        .max_pages(cli.max_pages)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .persist_uploads(!cli.no_upload_copy)
        .validate_pdf_passthrough(cli.validate_pdf);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
