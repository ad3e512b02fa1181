//! End-to-end conversion tests.
//!
//! Image-only tests always run. Anything that needs pdfium binds it the same
//! way the library does (`PDFIUM_LIB_PATH`, the working directory, then the
//! system library) and prints `SKIP` when no library is available.
//!
//! Run with:
//!   PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test conversion -- --nocapture

use file_convert::pipeline::engine::PdfEngine;
use file_convert::{
    convert, convert_blocking, convert_file, inspect_blocking, ConversionConfig, ConversionResult, ConvertError,
    ErrorKind, Format,
};
use image::{DynamicImage, Rgba, RgbaImage};
use pdfium_render::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Bind pdfium or skip the test.
macro_rules! pdfium_or_skip {
    () => {{
        match PdfEngine::acquire(&ConversionConfig::default()) {
            Ok(engine) => engine,
            Err(e) => {
                println!("SKIP: pdfium not available: {}", e.to_string().lines().next().unwrap_or(""));
                return;
            }
        }
    }};
}

fn config_in(root: &Path) -> ConversionConfig {
    ConversionConfig::builder().static_root(root).build().unwrap()
}

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 9) as u8, (y * 13) as u8, 120, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn blank_pdf(engine: &PdfEngine, pages: usize) -> Vec<u8> {
    let mut document = engine.pdfium().create_new_pdf().unwrap();
    for _ in 0..pages {
        document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
    }
    document.save_to_bytes().unwrap()
}

fn files_under(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

// ── Image sources ────────────────────────────────────────────────────────────

#[test]
fn test_png_to_png_is_pixel_identical() {
    let tmp = tempfile::tempdir().unwrap();
    let src = png_bytes(23, 17);
    let out = convert_blocking(src.clone(), "png", &config_in(tmp.path())).unwrap();

    assert_eq!(out.artifacts.len(), 1);
    let written = std::fs::read(out.result.download_path()).unwrap();
    let a = image::load_from_memory(&src).unwrap().to_rgba8();
    let b = image::load_from_memory(&written).unwrap().to_rgba8();
    assert_eq!(a, b);
}

#[test]
fn test_png_to_jpeg_within_tolerance() {
    let tmp = tempfile::tempdir().unwrap();
    let src = png_bytes(32, 32);
    let out = convert_blocking(src.clone(), "jpeg", &config_in(tmp.path())).unwrap();

    let ConversionResult::File { path } = &out.result else {
        panic!("expected a single file, got {:?}", out.result);
    };
    assert!(file_name(path).ends_with(".jpeg"));

    let a = image::load_from_memory(&src).unwrap().to_rgb8();
    let b = image::load_from_memory(&std::fs::read(path).unwrap()).unwrap().to_rgb8();
    assert_eq!(a.dimensions(), b.dimensions());
    let mean_diff: f64 = a
        .pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| p.0.iter().zip(q.0.iter()).map(|(x, y)| x.abs_diff(*y) as f64))
        .sum::<f64>()
        / (32.0 * 32.0 * 3.0);
    assert!(mean_diff < 8.0, "mean channel difference {mean_diff}");
}

#[tokio::test]
async fn test_detection_ignores_file_name() {
    let tmp = tempfile::tempdir().unwrap();
    let disguised = tmp.path().join("report.pdf");
    std::fs::write(&disguised, png_bytes(8, 8)).unwrap();

    let out = convert_file(&disguised, "png", &config_in(&tmp.path().join("static")))
        .await
        .unwrap();
    assert_eq!(out.source_format, Format::Png);
}

#[test]
fn test_bmp_target_rejected_without_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let err = convert_blocking(png_bytes(4, 4), "bmp", &config_in(tmp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(files_under(tmp.path()), 0);
}

#[test]
fn test_undetectable_source_rejected_without_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let err = convert_blocking(b"just some text".to_vec(), "pdf", &config_in(tmp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(files_under(tmp.path()), 0);
}

#[test]
fn test_zero_byte_source_is_malformed() {
    let tmp = tempfile::tempdir().unwrap();
    let err = convert_blocking(Vec::new(), "png", &config_in(tmp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSource);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_conversions_never_share_names() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());

    let mut handles = Vec::new();
    for i in 0..16 {
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            convert(png_bytes(4 + i, 4), "png", &config).await.unwrap()
        }));
    }

    let mut paths = HashSet::new();
    for h in handles {
        let out = h.await.unwrap();
        assert!(paths.insert(out.result.download_path()));
    }
    assert_eq!(paths.len(), 16);
    assert_eq!(files_under(&tmp.path().join("images")), 16);
}

// ── PDF sources and targets (need pdfium) ────────────────────────────────────

#[test]
fn test_three_page_pdf_to_jpeg_is_archived() {
    let engine = pdfium_or_skip!();
    let pdf = blank_pdf(&engine, 3);
    drop(engine);

    let tmp = tempfile::tempdir().unwrap();
    let out = convert_blocking(pdf, "jpeg", &config_in(tmp.path())).unwrap();

    let ConversionResult::Archive {
        containing_dir,
        archive_name,
    } = &out.result
    else {
        panic!("expected an archive, got {:?}", out.result);
    };
    assert_eq!(out.page_count, Some(3));
    assert_eq!(out.artifacts.len(), 3);

    // All pages share one token and carry ordinals 0, 1, 2.
    let bundle = file_name(containing_dir);
    let token = bundle.strip_prefix("image-").unwrap();
    for (i, artifact) in out.artifacts.iter().enumerate() {
        assert_eq!(artifact.ordinal, i);
        assert_eq!(artifact.format, Format::Jpeg);
        assert_eq!(file_name(&artifact.path), format!("image-{token}-{i}.jpeg"));

        let page = image::load_from_memory(&std::fs::read(&artifact.path).unwrap()).unwrap();
        // A4 at 100 DPI.
        assert!((826..=827).contains(&page.width()), "width {}", page.width());
        assert_eq!(page.height(), 1169);
    }
    assert_eq!(archive_name, &format!("image-{token}.zip"));

    // The archive holds the three pages under the bundle directory and never
    // itself.
    let zip_file = std::fs::File::open(containing_dir.join(archive_name)).unwrap();
    let mut archive = zip::ZipArchive::new(zip_file).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    let files: Vec<&String> = names.iter().filter(|n| !n.ends_with('/')).collect();
    assert_eq!(files.len(), 3, "{names:?}");
    assert!(names.contains(&format!("{bundle}/")));
    assert!(files.iter().all(|n| n.starts_with(&format!("{bundle}/")) && n.ends_with(".jpeg")));
    assert!(!names.iter().any(|n| n.ends_with(".zip")));

    // The raw upload was kept.
    let upload = out.upload_copy.as_ref().unwrap();
    assert_eq!(file_name(upload), format!("upload-{token}.pdf"));
}

#[test]
fn test_single_page_pdf_is_a_file() {
    let engine = pdfium_or_skip!();
    let pdf = blank_pdf(&engine, 1);
    drop(engine);

    let tmp = tempfile::tempdir().unwrap();
    let out = convert_blocking(pdf, "png", &config_in(tmp.path())).unwrap();
    let ConversionResult::File { path } = &out.result else {
        panic!("expected a file, got {:?}", out.result);
    };
    let name = file_name(path);
    assert!(name.starts_with("image-") && name.ends_with("-0.png"), "{name}");
    assert!(path.parent().unwrap().ends_with("images"));

    // Rendered over white with alpha removed.
    let page = image::load_from_memory(&std::fs::read(path).unwrap()).unwrap();
    assert!(!page.color().has_alpha());
    assert_eq!(page.to_rgb8().get_pixel(10, 10).0, [255, 255, 255]);
}

#[test]
fn test_truncated_pdf_is_malformed_before_rendering() {
    drop(pdfium_or_skip!());
    let tmp = tempfile::tempdir().unwrap();
    let err = convert_blocking(b"%PDF-1.4\n1 0 obj\n<<".to_vec(), "png", &config_in(tmp.path())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSource, "{err}");
    assert_eq!(files_under(&tmp.path().join("images")), 0);
    assert_eq!(files_under(&tmp.path().join("uploads")), 0);
}

#[test]
fn test_page_limit_is_enforced() {
    let engine = pdfium_or_skip!();
    let pdf = blank_pdf(&engine, 3);
    drop(engine);

    let tmp = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .static_root(tmp.path())
        .max_pages(2)
        .build()
        .unwrap();
    let err = convert_blocking(pdf, "png", &config).unwrap_err();
    assert!(matches!(err, ConvertError::TooManyPages { pages: 3, max: 2 }));
    assert_eq!(files_under(tmp.path()), 0);
}

#[test]
fn test_image_to_pdf_is_one_page_of_image_size() {
    drop(pdfium_or_skip!());
    let tmp = tempfile::tempdir().unwrap();
    let out = convert_blocking(png_bytes(40, 30), "pdf", &config_in(tmp.path())).unwrap();

    let path = out.result.download_path();
    assert!(file_name(&path).starts_with("pdf-"));
    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));

    let engine = PdfEngine::acquire(&ConversionConfig::default()).unwrap();
    let document = engine.open(&bytes).unwrap();
    assert_eq!(document.pages().len(), 1);
    let page = document.pages().get(0).unwrap();
    assert!((page.width().value - 40.0).abs() < 0.5);
    assert!((page.height().value - 30.0).abs() < 0.5);
}

#[test]
fn test_pdf_to_pdf_is_byte_identical_when_validated() {
    let engine = pdfium_or_skip!();
    let pdf = blank_pdf(&engine, 2);
    drop(engine);

    let tmp = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .static_root(tmp.path())
        .validate_pdf_passthrough(true)
        .build()
        .unwrap();
    let out = convert_blocking(pdf.clone(), "pdf", &config).unwrap();
    assert_eq!(out.page_count, Some(2));
    assert!(!out.result.is_archive());
    assert_eq!(std::fs::read(out.result.download_path()).unwrap(), pdf);
}

#[test]
fn test_inspect_counts_pages() {
    let engine = pdfium_or_skip!();
    let pdf = blank_pdf(&engine, 4);
    drop(engine);

    let report = inspect_blocking(&pdf, &ConversionConfig::default()).unwrap();
    assert_eq!(report.format, Some(Format::Pdf));
    assert_eq!(report.mime, "application/pdf");
    assert_eq!(report.page_count, Some(4));
}
