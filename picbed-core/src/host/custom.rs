//! The user's own image host: any endpoint accepting a multipart `file` field.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{rejection, BackendId, Hosted, ImageHost, UploadContext};
use crate::config::{blank_fields, HostSettings, CUSTOM_IMAGE_HOSTING};
use crate::contract::{FormPart, HttpRequest, ImageFile, RequestBody, UploadResult};
use crate::error::UploadError;
use crate::naming::{encode_uri, file_stem};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomHostSettings {
    /// Selection value that picks this host.
    pub hosting_name: String,
    pub hosting_url: String,
}

impl HostSettings for CustomHostSettings {
    const KEY: &'static str = CUSTOM_IMAGE_HOSTING;

    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[("hostingUrl", &self.hosting_url)])
    }

    fn validate(&self, _backend: &str) -> Result<(), UploadError> {
        if self.missing_fields().is_empty() {
            Ok(())
        } else {
            Err(UploadError::Configuration {
                message: "custom backend URL not set".to_string(),
                missing: self.missing_fields(),
            })
        }
    }
}

/// Image URL from a response body, in fixed precedence: `data`, `url`, `link`, then the body itself.
pub fn pick_url(body: &Value) -> Option<String> {
    ["data", "url", "link"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .or_else(|| body.as_str().filter(|s| !s.is_empty()))
        .map(str::to_string)
}

#[derive(Debug, Default)]
pub struct CustomHost;

#[async_trait]
impl ImageHost for CustomHost {
    type Settings = CustomHostSettings;

    fn id(&self) -> BackendId {
        BackendId::Custom
    }

    async fn upload(
        &self,
        file: &ImageFile,
        settings: &CustomHostSettings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError> {
        if file.name.trim().is_empty() {
            return Err(UploadError::Input("invalid file: it has no name".to_string()));
        }
        let request = HttpRequest::post(settings.hosting_url.trim())
            .body(RequestBody::Multipart(vec![FormPart::file("file", file)]));
        let response = ctx.send_tracked(request).await?;
        if !response.is_success() {
            return Err(rejection(&response));
        }

        // Hosts answering with a bare URL instead of JSON are accepted too.
        let text = response.text();
        let body = serde_json::from_str::<Value>(&text)
            .unwrap_or_else(|_| Value::String(text.trim().to_string()));
        let url = pick_url(&body).ok_or_else(|| {
            UploadError::ResponseShape("the image host returned no usable URL".to_string())
        })?;

        Ok(Hosted {
            result: UploadResult {
                filename: file_stem(&file.name),
                url: encode_uri(&url),
            },
            response: body,
        })
    }
}
