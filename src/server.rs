//! HTTP front end: upload a file, get redirected to a download page.
//!
//! Routes:
//! - `GET  /health`: liveness probe, answers `Healthy`
//! - `POST /upload`: multipart form (`myFile`, `fileFormat`); converts and
//!   redirects to `/download?filepath=<path under the static root>`
//! - `GET  /download`: HTML page linking the converted artifact
//! - `GET|POST /cleanup`: empties `images/`, `pdf/` and `uploads/`
//! - anything else: static files from the static root

use crate::config::ConversionConfig;
use crate::convert::convert;
use crate::error::ConvertError;
use crate::workspace::Workspace;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Multipart field carrying the uploaded file.
pub const FILE_FIELD: &str = "myFile";
/// Multipart field carrying the requested target format.
pub const FORMAT_FIELD: &str = "fileFormat";

/// Headroom over `max_upload_bytes` for multipart framing and the format field.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    config: Arc<ConversionConfig>,
    workspace: Arc<Workspace>,
}

impl AppState {
    pub fn new(config: ConversionConfig) -> Self {
        let workspace = Workspace::new(&config.static_root);
        Self {
            config: Arc::new(config),
            workspace: Arc::new(workspace),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }
}

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: String,
}

/// A failed request, rendered as a JSON error body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: String,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request".into(),
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found".into(),
            message: message.into(),
        }
    }

    fn multipart(e: MultipartError) -> Self {
        Self {
            status: e.status(),
            kind: "bad_request".into(),
            message: e.body_text(),
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        let status = match &e {
            ConvertError::SourceTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            e if e.is_user_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let kind = serde_json::to_value(e.kind())
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "internal".into());
        Self {
            status,
            kind,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            kind: self.kind,
        });
        (self.status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    let static_files = ServeDir::new(state.workspace.root());

    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/download", get(download))
        .route("/cleanup", get(cleanup).post(cleanup))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(config: ConversionConfig, addr: SocketAddr) -> std::io::Result<()> {
    let state = AppState::new(config);
    state
        .workspace
        .ensure_dirs()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "Healthy"
}

/// POST /upload
///
/// Reads `myFile` and `fileFormat`, converts, and redirects to the download
/// page. Pages written before a mid-document failure are removed.
async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<Redirect, ApiError> {
    state.workspace.ensure_dirs()?;

    let mut file = None;
    let mut target = None;
    while let Some(field) = multipart.next_field().await.map_err(ApiError::multipart)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            FILE_FIELD => {
                debug!("Receiving upload {:?}", field.file_name());
                file = Some(field.bytes().await.map_err(ApiError::multipart)?);
            }
            FORMAT_FIELD => {
                target = Some(field.text().await.map_err(ApiError::multipart)?);
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    let bytes = file.ok_or_else(|| ApiError::bad_request(format!("missing form field '{FILE_FIELD}'")))?;
    let target = target.ok_or_else(|| ApiError::bad_request(format!("missing form field '{FORMAT_FIELD}'")))?;
    info!("Upload of {} bytes, converting to '{}'", bytes.len(), target.trim());

    let output = match convert(bytes.to_vec(), target, &state.config).await {
        Ok(output) => output,
        Err(e) => {
            state.workspace.discard_partial_output(&e);
            return Err(e.into());
        }
    };

    let rel = output
        .result
        .relative_download_path(&state.workspace)
        .ok_or_else(|| ConvertError::Internal("artifact written outside the static root".into()))?;
    info!("Redirecting to download page for {}", rel);
    Ok(Redirect::to(&format!("/download?filepath={rel}")))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    filepath: String,
}

/// GET /download?filepath=images/image-….png
async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Html<String>, ApiError> {
    let path = state
        .workspace
        .resolve_relative(&query.filepath)
        .ok_or_else(|| ApiError::bad_request("filepath must be a relative path inside the static root"))?;
    if !path.is_file() {
        return Err(ApiError::not_found(format!("no such file: {}", query.filepath)));
    }
    debug!("Rendering download page for {}", path.display());
    Ok(Html(download_page(&query.filepath, &path)))
}

fn download_page(rel: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel.to_string());
    let href = html_escape::encode_double_quoted_attribute(rel);
    let label = html_escape::encode_text(&name);
    format!(
        "<!DOCTYPE html>\n\
<html>\n\
<head><meta charset=\"utf-8\"><title>Download</title></head>\n\
<body>\n\
<h1>Your file is ready</h1>\n\
<p><a href=\"/{href}\" download=\"{label}\">{label}</a></p>\n\
<p><a href=\"/\">Convert another file</a></p>\n\
</body>\n\
</html>\n"
    )
}

#[derive(Serialize)]
struct CleanupResponse {
    files_removed: usize,
    dirs_removed: usize,
}

/// GET|POST /cleanup
async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>, ApiError> {
    info!("Got request for cleanup");
    let workspace = Arc::clone(&state.workspace);
    let report = tokio::task::spawn_blocking(move || workspace.cleanup())
        .await
        .map_err(|e| ConvertError::Internal(format!("cleanup worker: {e}")))??;
    Ok(Json(CleanupResponse {
        files_removed: report.files_removed,
        dirs_removed: report.dirs_removed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn app(root: &Path) -> Router {
        let config = ConversionConfig::builder().static_root(root).build().unwrap();
        let state = AppState::new(config);
        state.workspace().ensure_dirs().unwrap();
        router(state)
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 200, 30, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_body(file: &[u8], format: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{FILE_FIELD}\"; filename=\"upload.bin\"\r\n\
Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(
            format!(
                "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{FORMAT_FIELD}\"\r\n\r\n{format}\r\n--{BOUNDARY}--\r\n"
            )
            .as_bytes(),
        );
        body
    }

    fn upload_request(file: &[u8], format: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file, format)))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_answers() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "Healthy");
    }

    #[tokio::test]
    async fn png_upload_redirects_to_download_page() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path())
            .oneshot(upload_request(&png_bytes(), "jpeg"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
        let rel = location.strip_prefix("/download?filepath=").unwrap();
        assert!(rel.starts_with("images/image-") && rel.ends_with(".jpeg"), "{rel}");
        assert!(tmp.path().join(rel).is_file());

        let page = app(tmp.path())
            .oneshot(Request::builder().uri(location.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        assert!(body_string(page).await.contains(&format!("href=\"/{rel}\"")));
    }

    #[tokio::test]
    async fn unsupported_target_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path())
            .oneshot(upload_request(&png_bytes(), "bmp"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_string(resp).await;
        assert!(body.contains("unsupported_format"), "{body}");
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{FORMAT_FIELD}\"\r\n\r\npng\r\n--{BOUNDARY}--\r\n"
        );
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let resp = app(tmp.path()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_rejects_escaping_paths() {
        let tmp = tempfile::tempdir().unwrap();
        for uri in ["/download?filepath=../secret", "/download?filepath=/etc/passwd"] {
            let resp = app(tmp.path())
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn download_of_missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path())
            .oneshot(
                Request::builder()
                    .uri("/download?filepath=images/nope.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cleanup_empties_artifact_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let router = app(tmp.path());
        std::fs::write(tmp.path().join("images").join("image-a.png"), b"x").unwrap();
        std::fs::write(tmp.path().join("pdf").join("pdf-b.pdf"), b"x").unwrap();

        let resp = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/cleanup")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body["files_removed"], 2);
        assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let tmp = tempfile::tempdir().unwrap();
        let router = app(tmp.path());
        std::fs::write(tmp.path().join("images").join("image-s.png"), png_bytes()).unwrap();
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/images/image-s.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn failed_upload_discards_reported_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::new(ConversionConfig::builder().static_root(tmp.path()).build().unwrap());
        state.workspace().ensure_dirs().unwrap();
        let bundle = state.workspace().images_dir().join("image-0f0f");
        std::fs::create_dir(&bundle).unwrap();
        std::fs::write(bundle.join("image-0f0f-0.png"), png_bytes()).unwrap();
        std::fs::write(bundle.join("image-0f0f-1.png"), png_bytes()).unwrap();

        let err = ConvertError::RasterisationFailed {
            page: 2,
            detail: "render".into(),
            partial_dir: Some(bundle.clone()),
        };
        assert_eq!(state.workspace().discard_partial_output(&err), Some(bundle.clone()));
        assert!(!bundle.exists());

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn download_page_escapes_values() {
        let page = download_page("images/a\"b<c>.png", Path::new("/s/images/a\"b<c>.png"));
        assert!(!page.contains("a\"b<c>"));
        assert!(page.contains("&lt;c&gt;"));
    }
}
