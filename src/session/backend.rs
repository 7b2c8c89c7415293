//! Job backend client.
//!
//! Endpoints, per tool path:
//! - `POST /api/{tool}/process` (multipart) -> `{ message, download_url, session_id? }`
//! - `GET  /api/geotagging/progress/{session_id}` -> `{ progress }`
//! - `POST /api/{tool}/cleanup/{session_id}` -> ignored
//!
//! # Security
//!
//! - File contents and form values are never logged
//! - Only HTTP method, path, and status codes are logged

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use futures_util::{future, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::error::AppError;
use crate::files::{FileHandle, PendingFile};
use crate::session::request::JobRequest;
use crate::tool::Tool;

/// Upload progress callback, called with 0-100.
pub type UploadProgress = Arc<dyn Fn(u8) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// A 2xx answer to a process request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAccepted {
    pub message: String,
    pub download_url: String,
    pub session_id: Option<String>,
}

/// Operations on the job backend.
pub trait JobBackend: Send + Sync {
    /// Uploads the request and waits for the backend's answer.
    fn submit<'a>(
        &'a self,
        request: &'a JobRequest,
        on_progress: UploadProgress,
    ) -> Pin<Box<dyn Future<Output = Result<JobAccepted, AppError>> + Send + 'a>>;

    /// Server-side progress of a session; `None` when the answer carries no
    /// numeric progress.
    fn poll_progress<'a>(
        &'a self,
        tool: Tool,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<f64>, AppError>> + Send + 'a>>;

    fn cleanup<'a>(
        &'a self,
        tool: Tool,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgressResponse {
    #[serde(default)]
    progress: Option<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload Tracking
// ─────────────────────────────────────────────────────────────────────────────

/// Counts bytes handed to the transport across every file part.
struct UploadTracker {
    sent: AtomicU64,
    total: u64,
    last_percent: AtomicU8,
    on_progress: UploadProgress,
}

impl UploadTracker {
    fn new(total: u64, on_progress: UploadProgress) -> Self {
        Self {
            sent: AtomicU64::new(0),
            total,
            last_percent: AtomicU8::new(0),
            on_progress,
        }
    }

    fn advance(&self, bytes: usize) {
        let sent = self.sent.fetch_add(bytes as u64, Ordering::SeqCst) + bytes as u64;
        let percent = upload_percent(sent, self.total);
        if self.last_percent.swap(percent, Ordering::SeqCst) != percent {
            (self.on_progress)(percent);
        }
    }
}

/// `round(sent / total * 100)`, capped at 100.
pub fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (sent as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpJobBackend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpJobBackend {
    client: Arc<Client>,
    base_url: Url,
}

impl HttpJobBackend {
    pub fn new(client: Arc<Client>, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Streams the request as multipart and parses the answer.
    ///
    /// # Errors
    ///
    /// - `AppError::Offline` - the server could not be reached
    /// - `AppError::Timeout` - the client timeout elapsed
    /// - `AppError::NetworkFailure` - any other transport error
    /// - `AppError::BackendRejected` - non-2xx status
    /// - `AppError::InvalidResponse` - 2xx without a download URL
    pub async fn submit(
        &self,
        request: &JobRequest,
        on_progress: UploadProgress,
    ) -> Result<JobAccepted, AppError> {
        let tool = request.tool();
        let url = self.build_url(&format!("/api/{}/process", tool))?;
        let tracker = Arc::new(UploadTracker::new(request.total_bytes(), on_progress));

        let mut form = Form::new();
        for file in &request.files {
            form = form.part("files[]", file_part(file, tracker.clone()).await?);
            if tool.sends_file_paths() {
                form = form.text("file_paths[]", file.path.clone());
            }
        }
        for (name, value) in request.text_fields()? {
            form = form.text(name, value);
        }
        if let Some(image) = request.watermark_image() {
            form = form.part("watermark_image", file_part(image, tracker.clone()).await?);
        }

        info!(
            "[BACKEND] POST /api/{}/process ({} files, {} bytes)",
            tool,
            request.files.len(),
            request.total_bytes()
        );

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        info!("[BACKEND] POST /api/{}/process -> {}", tool, status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let body: ProcessResponse = response
            .json()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let download_url = body
            .download_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AppError::InvalidResponse("Response has no download_url".into()))?;

        Ok(JobAccepted {
            message: body.message.unwrap_or_default(),
            download_url,
            session_id: body.session_id.filter(|s| !s.is_empty()),
        })
    }

    pub async fn poll_progress(&self, tool: Tool, session_id: &str) -> Result<Option<f64>, AppError> {
        let url = self.build_url(&format!("/api/{}/progress/{}", tool, session_id))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        debug!(
            "[BACKEND] GET /api/{}/progress/{} -> {}",
            tool,
            redact_id(session_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let body: ProgressResponse = response
            .json()
            .await
            .map_err(|e| AppError::InvalidResponse(format!("Failed to parse progress: {}", e)))?;

        Ok(body.progress.and_then(|p| p.as_f64()))
    }

    pub async fn cleanup(&self, tool: Tool, session_id: &str) -> Result<(), AppError> {
        let url = self.build_url(&format!("/api/{}/cleanup/{}", tool, session_id))?;

        info!("[BACKEND] POST /api/{}/cleanup/{}", tool, redact_id(session_id));

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(map_transport_error)?;

        info!(
            "[BACKEND] POST /api/{}/cleanup/{} -> {}",
            tool,
            redact_id(session_id),
            response.status().as_u16()
        );
        Ok(())
    }

    fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Failed to build backend URL: {}", e)))
    }
}

impl JobBackend for HttpJobBackend {
    fn submit<'a>(
        &'a self,
        request: &'a JobRequest,
        on_progress: UploadProgress,
    ) -> Pin<Box<dyn Future<Output = Result<JobAccepted, AppError>> + Send + 'a>> {
        Box::pin(HttpJobBackend::submit(self, request, on_progress))
    }

    fn poll_progress<'a>(
        &'a self,
        tool: Tool,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<f64>, AppError>> + Send + 'a>> {
        Box::pin(HttpJobBackend::poll_progress(self, tool, session_id))
    }

    fn cleanup<'a>(
        &'a self,
        tool: Tool,
        session_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(HttpJobBackend::cleanup(self, tool, session_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a streamed multipart part whose chunks advance `tracker`.
async fn file_part(file: &PendingFile, tracker: Arc<UploadTracker>) -> Result<Part, AppError> {
    let body = match &file.handle {
        FileHandle::Path(path) => {
            let handle = tokio::fs::File::open(path).await.map_err(|e| {
                AppError::Internal(format!("Failed to open {}: {}", file.path, e))
            })?;
            counted_body(ReaderStream::new(handle), tracker)
        }
        FileHandle::Memory(data) => counted_body(
            stream::once(future::ready(Ok::<Bytes, io::Error>(data.clone()))),
            tracker,
        ),
    };

    Ok(Part::stream_with_length(body, file.size_bytes).file_name(file.file_name().to_string()))
}

fn counted_body<S>(chunks: S, tracker: Arc<UploadTracker>) -> Body
where
    S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
{
    Body::wrap_stream(chunks.map(move |chunk| {
        if let Ok(bytes) = &chunk {
            tracker.advance(bytes.len());
        }
        chunk
    }))
}

fn map_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout
    } else if e.is_connect() {
        AppError::Offline(e.to_string())
    } else {
        AppError::NetworkFailure(e.to_string())
    }
}

/// Maps a non-2xx answer; an unparseable body becomes the details.
async fn parse_error_response(response: reqwest::Response, status: reqwest::StatusCode) -> AppError {
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => AppError::rejected(status.as_u16(), parsed.error, parsed.details),
        Err(_) => {
            let details = Some(body.trim().to_string()).filter(|d| !d.is_empty());
            AppError::rejected(status.as_u16(), None, details)
        }
    }
}

/// Redacts a session ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((cut, _)) => format!("{}...", &id[..cut]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectionCategory;
    use crate::session::request::{
        GeotagMetadata, JobParameters, OutputFormat, ResizeParams, WatermarkParams,
    };
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn create_test_backend(mock_url: &str) -> HttpJobBackend {
        HttpJobBackend::new(Arc::new(Client::new()), Url::parse(mock_url).unwrap())
    }

    /// A loopback URL nothing listens on.
    fn unused_local_uri() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    fn memory_file(path: &str, size: usize) -> PendingFile {
        PendingFile {
            handle: FileHandle::Memory(vec![0xAB; size].into()),
            path: path.into(),
            size_bytes: size as u64,
        }
    }

    fn recording_progress() -> (UploadProgress, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: UploadProgress = Arc::new(move |p: u8| sink.lock().unwrap().push(p));
        (callback, seen)
    }

    fn body_text(request: &Request) -> String {
        String::from_utf8_lossy(&request.body).into_owned()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submit Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_geotag_submit_sends_files_paths_and_exif() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/geotagging/process"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Processed 2 images",
                "download_url": "/api/geotagging/download/abc123/zip",
                "session_id": "abc123"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let request = JobRequest::new(
            vec![memory_file("trip/a.jpg", 300), memory_file("b.jpg", 100)],
            JobParameters::Geotagging(GeotagMetadata {
                gps_latitude: Some(45.0),
                ..Default::default()
            }),
            OutputFormat::Jpeg,
        );
        let (callback, seen) = recording_progress();

        let accepted = backend.submit(&request, callback).await.unwrap();

        assert_eq!(accepted.session_id.as_deref(), Some("abc123"));
        assert_eq!(accepted.download_url, "/api/geotagging/download/abc123/zip");
        assert_eq!(seen.lock().unwrap().last(), Some(&100));

        let received = mock_server.received_requests().await.unwrap();
        let body = body_text(&received[0]);
        assert_eq!(body.matches("name=\"files[]\"").count(), 2);
        assert!(body.contains("name=\"file_paths[]\"\r\n\r\ntrip/a.jpg"));
        assert!(body.contains("filename=\"a.jpg\""));
        assert!(body.contains("name=\"exif_data\"\r\n\r\n{\"GPSLatitude\":45.0}"));
        assert!(body.contains("name=\"output_format\"\r\n\r\njpeg"));
    }

    #[tokio::test]
    async fn test_non_geotag_submit_omits_file_paths() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/resizing/process"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Resized",
                "download_url": "/api/resizing/download/s1/single"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let request = JobRequest::new(
            vec![memory_file("dir/a.jpg", 10)],
            JobParameters::Resizing(ResizeParams {
                width: Some(800),
                ..Default::default()
            }),
            OutputFormat::Png,
        );
        let (callback, _) = recording_progress();

        let accepted = backend.submit(&request, callback).await.unwrap();
        assert!(accepted.session_id.is_none());

        let received = mock_server.received_requests().await.unwrap();
        let body = body_text(&received[0]);
        assert!(!body.contains("file_paths[]"));
        assert!(body.contains("name=\"resize_mode\"\r\n\r\nfit"));
        assert!(body.contains("name=\"width\"\r\n\r\n800"));
    }

    #[tokio::test]
    async fn test_submit_streams_files_from_disk() {
        let dir = TempDir::new().unwrap();
        let photo = dir.path().join("photo.jpg");
        std::fs::write(&photo, b"JPEGDATA").unwrap();

        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/watermark/process"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "ok",
                "download_url": "/api/watermark/download/w1/single"
            })))
            .mount(&mock_server)
            .await;

        let request = JobRequest::new(
            vec![PendingFile {
                handle: FileHandle::Path(photo),
                path: "photo.jpg".into(),
                size_bytes: 8,
            }],
            JobParameters::Watermark(WatermarkParams::image(Some(memory_file("logo.png", 4)))),
            OutputFormat::Jpeg,
        );
        let (callback, seen) = recording_progress();

        backend.submit(&request, callback).await.unwrap();

        let received = mock_server.received_requests().await.unwrap();
        let body = body_text(&received[0]);
        assert!(body.contains("JPEGDATA"));
        assert!(body.contains("name=\"watermark_image\""));
        assert!(body.contains("name=\"watermark_type\"\r\n\r\nimage"));
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_rejection_maps_status_and_details() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/conversion/process"))
            .respond_with(ResponseTemplate::new(413).set_body_json(serde_json::json!({
                "error": "Request Entity Too Large",
                "details": "limit is 16MB"
            })))
            .mount(&mock_server)
            .await;

        let request = JobRequest::new(
            vec![memory_file("a.jpg", 10)],
            JobParameters::Conversion,
            OutputFormat::Png,
        );
        let (callback, _) = recording_progress();

        let err = backend.submit(&request, callback).await.unwrap_err();
        match &err {
            AppError::BackendRejected {
                status, category, ..
            } => {
                assert_eq!(*status, 413);
                assert_eq!(*category, RejectionCategory::PayloadTooLarge);
            }
            other => panic!("unexpected {:?}", other),
        }
        let presentation = err.to_presentation();
        assert!(presentation.message.contains("too large"));
        assert_eq!(presentation.details.as_deref(), Some("limit is 16MB"));
    }

    #[tokio::test]
    async fn test_unparseable_error_body_becomes_details() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/conversion/process"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request"))
            .mount(&mock_server)
            .await;

        let request = JobRequest::new(
            vec![memory_file("a.jpg", 10)],
            JobParameters::Conversion,
            OutputFormat::Png,
        );
        let (callback, _) = recording_progress();

        let presentation = backend
            .submit(&request, callback)
            .await
            .unwrap_err()
            .to_presentation();
        assert_eq!(presentation.message, crate::error::GENERIC_PROCESSING_ERROR);
        assert_eq!(presentation.details.as_deref(), Some("Bad Request"));
    }

    #[tokio::test]
    async fn test_success_without_download_url_is_invalid() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/conversion/process"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "message": "ok" })))
            .mount(&mock_server)
            .await;

        let request = JobRequest::new(
            vec![memory_file("a.jpg", 10)],
            JobParameters::Conversion,
            OutputFormat::Png,
        );
        let (callback, _) = recording_progress();

        let err = backend.submit(&request, callback).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_offline() {
        let uri = unused_local_uri();
        let backend = create_test_backend(&uri);

        let request = JobRequest::new(
            vec![memory_file("a.jpg", 10)],
            JobParameters::Conversion,
            OutputFormat::Png,
        );
        let (callback, _) = recording_progress();

        let err = backend.submit(&request, callback).await.unwrap_err();
        assert!(matches!(err, AppError::Offline(_)), "got {:?}", err);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Progress & Cleanup Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_poll_progress_reads_number() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/api/geotagging/progress/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "progress": 42 })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let progress = backend.poll_progress(Tool::Geotagging, "abc123").await.unwrap();
        assert_eq!(progress, Some(42.0));
    }

    #[tokio::test]
    async fn test_poll_progress_without_number_is_none() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/api/geotagging/progress/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "progress": "n/a" })))
            .mount(&mock_server)
            .await;

        let progress = backend.poll_progress(Tool::Geotagging, "abc123").await.unwrap();
        assert_eq!(progress, None);
    }

    #[tokio::test]
    async fn test_cleanup_posts_to_tool_path() {
        let mock_server = MockServer::start().await;
        let backend = create_test_backend(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/api/watermark/cleanup/sess-1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        backend.cleanup(Tool::Watermark, "sess-1").await.unwrap();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helper Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_upload_percent_rounds() {
        assert_eq!(upload_percent(0, 200), 0);
        assert_eq!(upload_percent(1, 200), 1);
        assert_eq!(upload_percent(100, 300), 33);
        assert_eq!(upload_percent(200, 300), 67);
        assert_eq!(upload_percent(300, 300), 100);
        assert_eq!(upload_percent(5, 0), 100);
    }

    #[test]
    fn test_redact_id() {
        assert_eq!(redact_id("0123456789abcdef"), "01234567...");
        assert_eq!(redact_id("short"), "short");
    }
}
