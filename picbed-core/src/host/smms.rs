//! SM.MS: the default backend, a plain multipart upload.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{parse_json, rejection, BackendId, Hosted, ImageHost, UploadContext};
use crate::config::{HostSettings, SMMS_IMAGE_HOSTING};
use crate::contract::{FormPart, HttpRequest, ImageFile, RequestBody, UploadResult};
use crate::error::UploadError;
use crate::naming::file_stem;

/// SM.MS rejects images above 5 MB.
pub const MAX_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmmsSettings {
    /// Overrides the default upload endpoint (e.g. a proxy).
    pub endpoint: Option<String>,
    /// Sent as the `Authorization` header when set.
    pub token: Option<String>,
}

impl HostSettings for SmmsSettings {
    const KEY: &'static str = SMMS_IMAGE_HOSTING;

    fn missing_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

pub struct SmmsHost {
    endpoint: String,
}

impl SmmsHost {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `success: false` or a `code` other than `"success"`/`200` means the API refused the image.
fn api_failure(body: &Value) -> bool {
    let success_flag = body.get("success").and_then(Value::as_bool);
    let code_ok = match body.get("code") {
        Some(Value::String(code)) => code == "success",
        Some(Value::Number(code)) => code.as_u64() == Some(200),
        _ => false,
    };
    success_flag == Some(false) || !code_ok
}

#[async_trait]
impl ImageHost for SmmsHost {
    type Settings = SmmsSettings;

    fn id(&self) -> BackendId {
        BackendId::Smms
    }

    async fn upload(
        &self,
        file: &ImageFile,
        settings: &SmmsSettings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError> {
        if file.name.trim().is_empty() {
            return Err(UploadError::Input("invalid file: it has no name".to_string()));
        }
        if file.size() > MAX_BYTES {
            warn!(file = %file.name, size = file.size(), "Image exceeds the SM.MS size limit");
            return Err(UploadError::Input(
                "SM.MS only accepts images up to 5 MB".to_string(),
            ));
        }
        let endpoint = non_blank(&settings.endpoint).unwrap_or(self.endpoint.as_str());
        if endpoint.trim().is_empty() {
            return Err(UploadError::configuration("SM.MS upload address is invalid"));
        }

        let mut request = HttpRequest::post(endpoint)
            .body(RequestBody::Multipart(vec![FormPart::file("file", file)]));
        if let Some(token) = non_blank(&settings.token) {
            request = request.header("Authorization", token);
        }

        let response = ctx.send_tracked(request).await?;
        if !response.is_success() {
            return Err(rejection(&response));
        }
        let body = parse_json(&response)?;
        debug!(response = %body, "SM.MS response");
        if api_failure(&body) {
            let message = ["message", "error"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str))
                .unwrap_or("upload failed")
                .to_string();
            return Err(UploadError::Server {
                status: response.status,
                message,
            });
        }

        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let url = data
            .get("url")
            .and_then(Value::as_str)
            .or_else(|| data.pointer("/images/url").and_then(Value::as_str))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| UploadError::ResponseShape("no image URL in response".to_string()))?;

        Ok(Hosted {
            result: UploadResult {
                filename: file_stem(&file.name),
                url: url.to_string(),
            },
            response: body,
        })
    }
}
