//! # contract: data types and trait seams of an upload
//!
//! This module holds the plain data that flows through an upload ([`ImageFile`],
//! [`UploadRequest`], [`UploadResult`]) and the two capabilities the core needs from the outside:
//!
//! - [`UploadObserver`]: the caller's progress/success/error callbacks.
//! - [`Transport`]: one HTTP round trip with byte-level upload progress.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`, so tests can count network calls and assert on
//! callbacks without a live backend (`MockTransport`, `MockUploadObserver`).

#![allow(unused)]

use std::path::Path;
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::editor::EditorDocument;
use crate::error::{TransportError, UploadError};

/// A local image ready for upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    /// File name as the user sees it, e.g. `photo.PNG`.
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Reads `path` into memory, keeping only its file name.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Input(format!("{} has no file name", path.display())))?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            tracing::error!(error = ?e, path = %path.display(), "Failed to read image file");
            UploadError::Input(format!("could not read {}: {e}", path.display()))
        })?;
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Normalized result of one successful upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UploadResult {
    /// Original file name without its extension.
    pub filename: String,
    /// Fully-qualified, URI-encoded public URL.
    pub url: String,
}

/// Append-only list of results shared by concurrent uploads.
///
/// Entries appear in completion order, which need not match the order uploads were started in.
#[derive(Debug, Clone, Default)]
pub struct ResultLog {
    entries: Arc<Mutex<Vec<UploadResult>>>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: UploadResult) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    pub fn snapshot(&self) -> Vec<UploadResult> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Upload progress as an integer percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
}

/// Callbacks a caller receives for one upload.
///
/// Exactly one of `on_success` / `on_error` fires per upload attempt.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, progress: Progress, file: &ImageFile);

    /// `response` is the backend's response body (or a summary of it for bodiless APIs).
    fn on_success(&self, response: &serde_json::Value, file: &ImageFile);

    fn on_error(&self, error: &UploadError, message: &str);
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl UploadObserver for SilentObserver {
    fn on_progress(&self, _progress: Progress, _file: &ImageFile) {}
    fn on_success(&self, _response: &serde_json::Value, _file: &ImageFile) {}
    fn on_error(&self, _error: &UploadError, _message: &str) {}
}

/// Everything the dispatcher needs for one upload.
pub struct UploadRequest {
    pub file: ImageFile,
    /// Document that receives the markdown link; `None` skips the editor entirely.
    pub document: Option<Arc<dyn EditorDocument>>,
    pub observer: Arc<dyn UploadObserver>,
    pub results: ResultLog,
}

impl UploadRequest {
    pub fn new(file: ImageFile, observer: Arc<dyn UploadObserver>, results: ResultLog) -> Self {
        Self {
            file,
            document: None,
            observer,
            results,
        }
    }

    pub fn with_document(mut self, document: Arc<dyn EditorDocument>) -> Self {
        self.document = Some(document);
        self
    }
}

/// Translates byte progress into monotonic percentages for one upload.
pub struct ProgressReporter {
    observer: Arc<dyn UploadObserver>,
    file: ImageFile,
    last: AtomicI16,
}

impl ProgressReporter {
    pub fn new(observer: Arc<dyn UploadObserver>, file: ImageFile) -> Self {
        Self {
            observer,
            file,
            last: AtomicI16::new(-1),
        }
    }

    /// Reports `round(loaded / total * 100)` unless it would go backwards or repeat.
    pub fn report(&self, loaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = ((loaded as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as i16;
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.observer.on_progress(
                Progress {
                    percent: percent as u8,
                },
                &self.file,
            );
        }
    }

    pub fn into_fn(self: Arc<Self>) -> ProgressFn {
        Arc::new(move |loaded, total| self.report(loaded, total))
    }
}

/// Byte progress sink handed to the transport: `(loaded, total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// One part of a `multipart/form-data` body.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        data: Vec<u8>,
    },
}

impl FormPart {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        FormPart::Text {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn file(name: &str, file: &ImageFile) -> Self {
        FormPart::File {
            name: name.to_string(),
            file_name: file.name.clone(),
            content_type: crate::naming::content_type(&file.name),
            data: file.bytes.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Bytes { content_type: String, data: Vec<u8> },
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Value of the first header named `name` (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One HTTP round trip.
///
/// Implementations return any status code as a response; only failures to get a response at all
/// are errors. When `progress` is given, it receives `(loaded, total)` as the body is sent.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse, TransportError>;
}
