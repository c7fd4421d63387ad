//! # host: one adapter per image hosting backend
//!
//! Every backend implements [`ImageHost`]: given a file and its typed settings it performs one
//! upload through the [`UploadContext`] and returns a normalized [`Hosted`] result or a
//! classified [`UploadError`].
//!
//! The steps every upload shares (notifications, result bookkeeping, editor insertion,
//! observer callbacks) live in [`Pipeline`], so adapters only deal with their wire protocol.
//!
//! ## Adding a backend
//! 1. Add a [`BackendId`] variant.
//! 2. Implement [`ImageHost`] with a [`HostSettings`] type for its configuration.
//! 3. Register it on the [`crate::dispatch::Dispatcher`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::HostSettings;
use crate::contract::{
    HttpRequest, HttpResponse, ImageFile, ProgressFn, ProgressReporter, Transport, UploadRequest,
    UploadResult,
};
use crate::editor::EditorWriter;
use crate::error::UploadError;
use crate::naming::{encode_segment, DatedPath};
use crate::notify::NotificationBridge;

pub mod alioss;
pub mod custom;
pub mod gitee;
pub mod github;
pub mod qiniu;
pub mod smms;

pub use alioss::{AliOssHost, AliOssSettings};
pub use custom::{CustomHost, CustomHostSettings};
pub use gitee::{GiteeHost, GiteeSettings};
pub use github::{GitHubHost, GitHubSettings};
pub use qiniu::{QiniuHost, QiniuSettings};
pub use smms::{SmmsHost, SmmsSettings};

/// Identifier of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendId {
    Smms,
    Qiniu,
    Aliyun,
    Gitee,
    GitHub,
    /// The user's own multipart endpoint, selected by its configured name.
    Custom,
}

impl BackendId {
    /// Backends selectable by a fixed id.
    pub const BUILTIN: [BackendId; 5] = [
        BackendId::Smms,
        BackendId::Qiniu,
        BackendId::Aliyun,
        BackendId::Gitee,
        BackendId::GitHub,
    ];

    /// Used when no (known) backend is selected.
    pub const DEFAULT: BackendId = BackendId::Smms;

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Smms => "smms",
            BackendId::Qiniu => "qiniu",
            BackendId::Aliyun => "aliyun",
            BackendId::Gitee => "gitee",
            BackendId::GitHub => "github",
            BackendId::Custom => "custom",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BackendId::Smms => "SM.MS",
            BackendId::Qiniu => "Qiniu",
            BackendId::Aliyun => "Aliyun OSS",
            BackendId::Gitee => "Gitee",
            BackendId::GitHub => "GitHub",
            BackendId::Custom => "custom image host",
        }
    }

    /// Matches a stored selection against the built-in ids and their legacy display names.
    pub fn parse_builtin(selection: &str) -> Option<BackendId> {
        match selection.trim() {
            "smms" | "SM.MS" => Some(BackendId::Smms),
            "qiniu" | "七牛云" => Some(BackendId::Qiniu),
            "aliyun" | "阿里云" => Some(BackendId::Aliyun),
            "gitee" | "Gitee" => Some(BackendId::Gitee),
            "github" | "GitHub" => Some(BackendId::GitHub),
            _ => None,
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base URLs of the remote services. Defaults point at the public services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub smms_upload: String,
    /// Serves Qiniu upload tokens at `/qiniu/{bucket}/{accessKey}/{secretKey}`.
    pub token_proxy: String,
    /// Overrides the region-derived Qiniu upload host.
    pub qiniu_upload: Option<String>,
    /// Overrides `https://{bucket}.{region}.aliyuncs.com`.
    pub aliyun_endpoint: Option<String>,
    pub gitee_api: String,
    pub github_api: String,
    pub jsdelivr_cdn: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            smms_upload: "https://sm.ms/api/v2/upload".to_string(),
            token_proxy: "https://api.mdnice.com".to_string(),
            qiniu_upload: None,
            aliyun_endpoint: None,
            gitee_api: "https://gitee.com/api/v5".to_string(),
            github_api: "https://api.github.com".to_string(),
            jsdelivr_cdn: "https://cdn.jsdelivr.net/gh".to_string(),
        }
    }
}

/// A successful upload: the normalized result plus the backend's response for `on_success`.
#[derive(Debug, Clone)]
pub struct Hosted {
    pub result: UploadResult,
    pub response: Value,
}

/// What an adapter may use while uploading.
pub struct UploadContext<'a> {
    pub transport: &'a dyn Transport,
    pub notifier: &'a NotificationBridge,
    progress: ProgressFn,
}

impl UploadContext<'_> {
    /// Sends a side request (token fetch and the like) without progress reporting.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, UploadError> {
        Ok(self.transport.send(request, None).await?)
    }

    /// Sends the upload itself, reporting byte progress to the caller.
    pub async fn send_tracked(&self, request: HttpRequest) -> Result<HttpResponse, UploadError> {
        Ok(self
            .transport
            .send(request, Some(self.progress.clone()))
            .await?)
    }
}

#[async_trait]
pub trait ImageHost: Send + Sync + 'static {
    type Settings: HostSettings;

    fn id(&self) -> BackendId;

    /// Performs exactly one upload of `file`.
    async fn upload(
        &self,
        file: &ImageFile,
        settings: &Self::Settings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError>;
}

/// Commit message used by the git hosts.
pub const COMMIT_MESSAGE: &str = "picbed upload picture";

/// `{api}/repos/{user}/{repo}/contents/{dir}/{file}` of a git host's contents API.
pub fn contents_url(api: &str, user: &str, repo: &str, path: &DatedPath) -> String {
    format!(
        "{}/repos/{}/{}/contents/{}/{}",
        api.trim_end_matches('/'),
        encode_segment(user.trim()),
        encode_segment(repo.trim()),
        encode_segment(&path.dir),
        encode_segment(&path.file),
    )
}

/// Parses a JSON body, treating anything else as a malformed response.
pub fn parse_json(response: &HttpResponse) -> Result<Value, UploadError> {
    serde_json::from_slice(&response.body).map_err(|e| {
        UploadError::ResponseShape(format!("response is not valid JSON ({e})"))
    })
}

/// Text between `<tag>` and `</tag>`, for XML error bodies.
fn xml_tag<'t>(text: &'t str, tag: &str) -> Option<&'t str> {
    let open = format!("<{tag}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&format!("</{tag}>"))? + start;
    Some(&text[start..end])
}

/// Best human-readable message in an error body (`message`, `error`, XML `<Message>` or text).
pub fn error_message(response: &HttpResponse) -> String {
    let text = response.text();
    if let Ok(body) = serde_json::from_str::<Value>(&text) {
        for key in ["message", "error", "msg"] {
            if let Some(message) = body.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    if let Some(message) = xml_tag(&text, "Message") {
        return message.to_string();
    }
    let text = text.trim();
    if text.is_empty() {
        "unknown error".to_string()
    } else {
        text.chars().take(200).collect()
    }
}

/// Error for a non-2xx response.
pub fn rejection(response: &HttpResponse) -> UploadError {
    UploadError::Server {
        status: response.status,
        message: error_message(response),
    }
}

/// Runs the steps shared by every upload around an adapter call.
#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    notifier: Arc<NotificationBridge>,
    editor: EditorWriter,
    success_delay: Duration,
}

/// How long the "uploading" message stays up after success before it is replaced.
pub const SUCCESS_DELAY: Duration = Duration::from_millis(500);

impl Pipeline {
    pub fn new(
        transport: Arc<dyn Transport>,
        notifier: Arc<NotificationBridge>,
        editor: EditorWriter,
    ) -> Self {
        Self {
            transport,
            notifier,
            editor,
            success_delay: SUCCESS_DELAY,
        }
    }

    pub fn with_success_delay(mut self, delay: Duration) -> Self {
        self.success_delay = delay;
        self
    }

    pub fn notifier(&self) -> &NotificationBridge {
        &self.notifier
    }

    pub async fn run<H: ImageHost>(
        &self,
        host: &H,
        settings: &H::Settings,
        request: &UploadRequest,
    ) -> Result<UploadResult, UploadError> {
        let backend = host.id();
        let file = &request.file;
        info!(%backend, file = %file.name, size = file.size(), "Starting image upload");
        self.notifier.notify_start();

        let reporter = Arc::new(ProgressReporter::new(
            request.observer.clone(),
            file.clone(),
        ));
        let ctx = UploadContext {
            transport: self.transport.as_ref(),
            notifier: &self.notifier,
            progress: reporter.into_fn(),
        };

        match host.upload(file, settings, &ctx).await {
            Ok(hosted) => {
                info!(%backend, file = %file.name, url = %hosted.result.url, "Image uploaded");
                request.results.push(hosted.result.clone());
                if let Some(document) = &request.document {
                    if let Err(e) = self.editor.insert(document.as_ref(), &hosted.result) {
                        warn!(error = %e, url = %hosted.result.url, "Could not insert image link into document");
                    }
                }
                request.observer.on_success(&hosted.response, file);
                tokio::time::sleep(self.success_delay).await;
                self.notifier.notify_done();
                Ok(hosted.result)
            }
            Err(e) => {
                let message = e.user_message(backend.display_name());
                error!(%backend, file = %file.name, error = %e, "Image upload failed");
                self.notifier.dismiss();
                self.notifier.notify_error(&message);
                request.observer.on_error(&e, &message);
                Err(e)
            }
        }
    }
}
