//! Request dispatch: static files on GET, JSON uploads on POST
//!
//! The dispatcher only ever sees requests that already passed security
//! validation, together with the path the validator resolved.

mod error;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

pub use error::{DispatchError, DispatchResult};

use crate::clock::Clock;
use crate::events::{Event, SharedSink};
use crate::http::constants::{content_types, headers};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::storage::{FileStore, UploadStore};

/// How a served file is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Rendered inline as `text/html`
    Html,
    /// Sent as an `application/octet-stream` attachment
    Download,
}

impl FileKind {
    /// Classify by extension; `None` means the extension is not served
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "html" => Some(FileKind::Html),
            "txt" | "jpg" | "jpeg" | "png" => Some(FileKind::Download),
            _ => None,
        }
    }
}

/// Body of a successful upload response
#[derive(Debug, Serialize)]
struct UploadCreated<'a> {
    status: &'a str,
    message: &'a str,
    filepath: String,
}

/// Produces a response for each validated request
pub struct Dispatcher {
    store: Arc<dyn FileStore>,
    uploads: UploadStore,
    upload_subdir: String,
    sink: SharedSink,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn FileStore>,
        clock: Arc<dyn Clock>,
        upload_dir: &Path,
        upload_subdir: &str,
        sink: SharedSink,
    ) -> Self {
        Self {
            uploads: UploadStore::new(upload_dir, Arc::clone(&store), clock),
            store,
            upload_subdir: upload_subdir.to_string(),
            sink,
        }
    }

    /// Answer one request. Failures become error responses, never panics.
    pub fn dispatch(&self, request: &HttpRequest, resolved: &Path, worker: &str) -> HttpResponse {
        let result = match request.method() {
            HttpMethod::GET => self.serve_file(resolved),
            HttpMethod::POST => self.accept_upload(request, worker),
        };

        result.unwrap_or_else(|err| {
            if let DispatchError::Storage(detail) = &err {
                self.sink.record(&Event::Failure {
                    worker: worker.to_string(),
                    detail: detail.clone(),
                });
            }
            err.to_response()
        })
    }

    /// GET: the extension is checked before the file's existence
    pub fn serve_file(&self, path: &Path) -> DispatchResult<HttpResponse> {
        let kind = FileKind::from_path(path)
            .ok_or_else(|| DispatchError::UnsupportedMedia(display_name(path)))?;

        if !self.store.is_file(path) {
            return Err(DispatchError::NotFound(display_name(path)));
        }

        let data = self
            .store
            .read(path)
            .map_err(|e| DispatchError::Storage(format!("reading {}: {}", path.display(), e)))?;

        Ok(match kind {
            FileKind::Html => HttpResponse::ok().html_bytes(data),
            FileKind::Download => HttpResponse::ok().attachment(&display_name(path), data),
        })
    }

    /// POST: persist a JSON body verbatim and report where it went
    pub fn accept_upload(&self, request: &HttpRequest, worker: &str) -> DispatchResult<HttpResponse> {
        let content_type = request.header(headers::CONTENT_TYPE).unwrap_or("");
        if !is_json_media_type(content_type) {
            return Err(DispatchError::UnsupportedMedia(if content_type.is_empty() {
                "missing Content-Type".to_string()
            } else {
                content_type.to_string()
            }));
        }

        serde_json::from_slice::<serde::de::IgnoredAny>(request.body())
            .map_err(|e| DispatchError::Payload(e.to_string()))?;

        let record = self
            .uploads
            .persist(request.body())
            .map_err(|e| DispatchError::Storage(format!("writing upload: {}", e)))?;
        let filepath = record.public_path(&self.upload_subdir);

        self.sink.record(&Event::UploadCreated {
            worker: worker.to_string(),
            path: filepath.clone(),
            bytes: record.size,
        });

        let body = serde_json::to_string(&UploadCreated {
            status: "success",
            message: "File created successfully",
            filepath,
        })
        .map_err(|e| DispatchError::Storage(e.to_string()))?;

        Ok(HttpResponse::created().json(&body))
    }
}

/// `application/json`, compared case-insensitively, parameters allowed
fn is_json_media_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case(content_types::JSON))
        .unwrap_or(false)
}

fn display_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::events::MemorySink;
    use crate::http::StatusCode;
    use crate::storage::DiskStore;
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    struct Fixture {
        root: tempfile::TempDir,
        sink: Arc<MemorySink>,
        dispatcher: Dispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_store(Arc::new(DiskStore))
        }

        fn with_store(store: Arc<dyn FileStore>) -> Self {
            let root = tempfile::tempdir().unwrap();
            fs::create_dir(root.path().join("uploads")).unwrap();
            let sink = Arc::new(MemorySink::new());
            let dispatcher = Dispatcher::new(
                store,
                Arc::new(SystemClock),
                &root.path().join("uploads"),
                "uploads",
                sink.clone(),
            );
            Self { root, sink, dispatcher }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }
    }

    fn post(content_type: &str, body: &str) -> HttpRequest {
        let raw = format!(
            "POST /upload HTTP/1.1\r\nHost: localhost:8080\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
            content_type,
            body.len(),
            body
        );
        HttpRequest::parse(raw.as_bytes()).unwrap()
    }

    fn get() -> HttpRequest {
        HttpRequest::parse(b"GET /x HTTP/1.1\r\nHost: localhost:8080\r\n\r\n").unwrap()
    }

    #[test]
    fn test_file_kind() {
        assert_eq!(FileKind::from_path(Path::new("a.html")), Some(FileKind::Html));
        assert_eq!(FileKind::from_path(Path::new("a.PNG")), Some(FileKind::Download));
        assert_eq!(FileKind::from_path(Path::new("a.jpeg")), Some(FileKind::Download));
        assert_eq!(FileKind::from_path(Path::new("a.exe")), None);
        assert_eq!(FileKind::from_path(Path::new("a.json")), None);
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_serve_html() {
        let fx = Fixture::new();
        fs::write(fx.path("index.html"), "<h1>Home</h1>").unwrap();

        let response = fx.dispatcher.dispatch(&get(), &fx.path("index.html"), "Thread-1");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("Content-Type"), Some(content_types::HTML));
        assert_eq!(response.body_bytes(), b"<h1>Home</h1>");
    }

    #[test]
    fn test_serve_download() {
        let fx = Fixture::new();
        fs::write(fx.path("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

        let response = fx.dispatcher.dispatch(&get(), &fx.path("logo.png"), "Thread-1");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.header_value("Content-Type"), Some(content_types::BINARY));
        assert_eq!(
            response.header_value("Content-Disposition"),
            Some("attachment; filename=\"logo.png\"")
        );
        assert_eq!(response.body_bytes(), [0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_disallowed_extension_even_if_present() {
        let fx = Fixture::new();
        fs::write(fx.path("tool.exe"), "MZ").unwrap();

        let response = fx.dispatcher.dispatch(&get(), &fx.path("tool.exe"), "Thread-1");
        assert_eq!(response.status(), StatusCode::UnsupportedMediaType);
    }

    #[test]
    fn test_missing_file() {
        let fx = Fixture::new();
        let response = fx.dispatcher.dispatch(&get(), &fx.path("nope.txt"), "Thread-1");
        assert_eq!(response.status(), StatusCode::NotFound);
        assert!(!response.closes_connection());
    }

    #[test]
    fn test_directory_with_allowed_extension_is_not_found() {
        let fx = Fixture::new();
        fs::create_dir(fx.path("dir.html")).unwrap();
        let response = fx.dispatcher.dispatch(&get(), &fx.path("dir.html"), "Thread-1");
        assert_eq!(response.status(), StatusCode::NotFound);
    }

    #[test]
    fn test_upload_created() {
        let fx = Fixture::new();
        let body = r#"{"name":"Ishan","score":100}"#;

        let response = fx.dispatcher.dispatch(&post("application/json", body), Path::new("/"), "Thread-2");
        assert_eq!(response.status(), StatusCode::Created);
        assert_eq!(response.header_value("Content-Type"), Some(content_types::JSON));

        let reply: serde_json::Value = serde_json::from_slice(response.body_bytes()).unwrap();
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["message"], "File created successfully");
        let filepath = reply["filepath"].as_str().unwrap();
        assert!(filepath.starts_with("/uploads/upload_"));

        let stored = fs::read(fx.root.path().join(filepath.trim_start_matches('/'))).unwrap();
        assert_eq!(stored, body.as_bytes());
        assert_eq!(fx.sink.count(|e| matches!(e, Event::UploadCreated { .. })), 1);
    }

    #[test]
    fn test_upload_accepts_charset_parameter() {
        let fx = Fixture::new();
        let response = fx
            .dispatcher
            .dispatch(&post("Application/JSON; charset=utf-8", "[1,2,3]"), Path::new("/"), "Thread-1");
        assert_eq!(response.status(), StatusCode::Created);
    }

    #[test]
    fn test_upload_wrong_content_type() {
        let fx = Fixture::new();
        for content_type in ["text/plain", "application/jsonp", "multipart/form-data"] {
            let response = fx
                .dispatcher
                .dispatch(&post(content_type, r#"{"ok":true}"#), Path::new("/"), "Thread-1");
            assert_eq!(response.status(), StatusCode::UnsupportedMediaType, "{}", content_type);
        }
        assert_eq!(fs::read_dir(fx.path("uploads")).unwrap().count(), 0);
    }

    #[test]
    fn test_upload_invalid_json() {
        let fx = Fixture::new();
        for body in ["{invalid", "", "{\"a\":1} trailing"] {
            let response =
                fx.dispatcher.dispatch(&post("application/json", body), Path::new("/"), "Thread-1");
            assert_eq!(response.status(), StatusCode::BadRequest, "{:?}", body);
            assert!(!response.closes_connection());
        }
    }

    struct ReadOnly;

    impl FileStore for ReadOnly {
        fn is_file(&self, _path: &Path) -> bool {
            true
        }

        fn read(&self, _path: &Path) -> io::Result<Vec<u8>> {
            Err(io::ErrorKind::PermissionDenied.into())
        }

        fn create_new(&self, _path: &Path, _data: &[u8]) -> io::Result<()> {
            Err(io::ErrorKind::PermissionDenied.into())
        }
    }

    #[test]
    fn test_storage_failures_are_500() {
        let fx = Fixture::with_store(Arc::new(ReadOnly));

        let read = fx.dispatcher.dispatch(&get(), &fx.path("a.txt"), "Thread-1");
        assert_eq!(read.status(), StatusCode::InternalServerError);

        let write = fx.dispatcher.dispatch(&post("application/json", "{}"), Path::new("/"), "Thread-1");
        assert_eq!(write.status(), StatusCode::InternalServerError);

        assert_eq!(fx.sink.count(|e| matches!(e, Event::Failure { .. })), 2);
    }
}
