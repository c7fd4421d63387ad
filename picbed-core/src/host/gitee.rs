//! Gitee repository used as an image store through its contents API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{
    contents_url, parse_json, rejection, BackendId, Hosted, ImageHost, UploadContext,
    COMMIT_MESSAGE,
};
use crate::config::{blank_fields, HostSettings, GITEE_IMAGE_HOSTING};
use crate::contract::{HttpRequest, ImageFile, RequestBody, UploadResult};
use crate::error::UploadError;
use crate::naming::{dated_path, file_stem};

/// Gitee does not serve raw files above this size to anonymous readers.
pub const SIZE_WARNING_BYTES: usize = 1024 * 1024;

pub const SIZE_WARNING: &str = "An image is larger than 1 MB, Gitee may not serve it";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GiteeSettings {
    pub username: String,
    pub repo: String,
    pub token: String,
}

impl HostSettings for GiteeSettings {
    const KEY: &'static str = GITEE_IMAGE_HOSTING;

    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("username", &self.username),
            ("repo", &self.repo),
            ("token", &self.token),
        ])
    }
}

pub struct GiteeHost {
    api: String,
}

impl GiteeHost {
    pub fn new(api: impl Into<String>) -> Self {
        Self { api: api.into() }
    }
}

#[async_trait]
impl ImageHost for GiteeHost {
    type Settings = GiteeSettings;

    fn id(&self) -> BackendId {
        BackendId::Gitee
    }

    async fn upload(
        &self,
        file: &ImageFile,
        settings: &GiteeSettings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError> {
        if file.size() > SIZE_WARNING_BYTES {
            warn!(file = %file.name, size = file.size(), "Image above the Gitee size limit, trying anyway");
            ctx.notifier.notify_warning(SIZE_WARNING);
        }

        let path = dated_path(&file.name, Local::now());
        let url = contents_url(&self.api, &settings.username, &settings.repo, &path);
        let request = HttpRequest::post(url).body(RequestBody::Form(vec![
            ("content".to_string(), STANDARD.encode(&file.bytes)),
            ("access_token".to_string(), settings.token.trim().to_string()),
            ("message".to_string(), COMMIT_MESSAGE.to_string()),
        ]));

        let response = ctx.send_tracked(request).await?;
        if !response.is_success() {
            let mut error = rejection(&response);
            if let UploadError::Server { message, .. } = &mut error {
                message.push_str(" (an image with the same name may already exist)");
            }
            return Err(error);
        }
        let body = parse_json(&response)?;
        if body.get("code").and_then(Value::as_str) == Some("exception") {
            return Err(UploadError::Server {
                status: response.status,
                message: body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("upload exception")
                    .to_string(),
            });
        }
        let download_url = body
            .pointer("/content/download_url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| UploadError::ResponseShape("no download_url in response".to_string()))?
            .to_string();
        info!(path = %path.joined(), "Committed image to Gitee");

        Ok(Hosted {
            result: UploadResult {
                filename: file_stem(&file.name),
                url: download_url,
            },
            response: body,
        })
    }
}
