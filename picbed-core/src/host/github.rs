//! GitHub repository used as an image store through its contents API, optionally served by jsDelivr.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{
    contents_url, parse_json, rejection, BackendId, Hosted, ImageHost, UploadContext,
    COMMIT_MESSAGE,
};
use crate::config::{blank_fields, flexible_bool, HostSettings, GITHUB_IMAGE_HOSTING};
use crate::contract::{HttpRequest, ImageFile, RequestBody, UploadResult};
use crate::error::UploadError;
use crate::naming::{dated_path, encode_uri, file_stem, DatedPath};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitHubSettings {
    pub username: String,
    pub repo: String,
    pub token: String,
    /// Serve images through jsDelivr instead of `raw.githubusercontent.com`.
    #[serde(deserialize_with = "flexible_bool")]
    pub jsdelivr: bool,
}

impl HostSettings for GitHubSettings {
    const KEY: &'static str = GITHUB_IMAGE_HOSTING;

    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("username", &self.username),
            ("repo", &self.repo),
            ("token", &self.token),
        ])
    }
}

pub struct GitHubHost {
    api: String,
    cdn: String,
}

impl GitHubHost {
    pub fn new(api: impl Into<String>, cdn: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            cdn: cdn.into(),
        }
    }

    /// jsDelivr URL of a committed file, derived without asking GitHub.
    pub fn cdn_url(&self, settings: &GitHubSettings, path: &DatedPath) -> String {
        encode_uri(&format!(
            "{}/{}/{}/{}",
            self.cdn.trim_end_matches('/'),
            settings.username.trim(),
            settings.repo.trim(),
            path.joined()
        ))
    }
}

#[async_trait]
impl ImageHost for GitHubHost {
    type Settings = GitHubSettings;

    fn id(&self) -> BackendId {
        BackendId::GitHub
    }

    async fn upload(
        &self,
        file: &ImageFile,
        settings: &GitHubSettings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError> {
        let path = dated_path(&file.name, Local::now());
        let url = contents_url(&self.api, &settings.username, &settings.repo, &path);
        let request = HttpRequest::put(url)
            .header("Authorization", format!("token {}", settings.token.trim()))
            .header("Accept", "application/vnd.github+json")
            .body(RequestBody::Json(json!({
                "content": STANDARD.encode(&file.bytes),
                "message": COMMIT_MESSAGE,
            })));

        let response = ctx.send_tracked(request).await?;
        if !response.is_success() {
            return Err(rejection(&response));
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

        let image_url = if settings.jsdelivr {
            self.cdn_url(settings, &path)
        } else {
            body.pointer("/content/download_url")
                .and_then(Value::as_str)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    UploadError::ResponseShape("no download_url in response".to_string())
                })?
                .to_string()
        };
        info!(path = %path.joined(), cdn = settings.jsdelivr, "Committed image to GitHub");

        Ok(Hosted {
            result: UploadResult {
                filename: file_stem(&file.name),
                url: image_url,
            },
            response: body,
        })
    }
}
