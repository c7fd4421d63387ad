//! Qiniu Kodo object storage.
//!
//! Qiniu uploads need a short-lived upload token. It is fetched from a token proxy before the
//! actual form upload (`token`, `key`, `file`) to the region's upload host. The public URL is
//! composed from the configured domain and the key Qiniu reports back.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{parse_json, rejection, BackendId, Hosted, ImageHost, UploadContext};
use crate::config::{blank_fields, HostSettings, QINIU_IMAGE_HOSTING};
use crate::contract::{FormPart, HttpRequest, HttpResponse, ImageFile, RequestBody, UploadResult};
use crate::error::UploadError;
use crate::naming::{encode_segment, file_stem, object_name, public_url};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QiniuSettings {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Public domain the bucket is served from; trailing `/` optional.
    pub domain: String,
    /// Region code (`z0`, `z1`, `z2`, `na0`, `as0`, `cn-east-2`); `z0` when empty.
    pub region: String,
    /// Prefix prepended to every key, e.g. `blog/`.
    pub namespace: String,
}

impl HostSettings for QiniuSettings {
    const KEY: &'static str = QINIU_IMAGE_HOSTING;

    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("accessKey", &self.access_key),
            ("secretKey", &self.secret_key),
            ("bucket", &self.bucket),
            ("domain", &self.domain),
        ])
    }
}

/// Upload host serving `region`.
pub fn upload_host(region: &str) -> &'static str {
    match region.trim() {
        "z1" => "https://upload-z1.qiniup.com",
        "z2" => "https://upload-z2.qiniup.com",
        "na0" => "https://upload-na0.qiniup.com",
        "as0" => "https://upload-as0.qiniup.com",
        "cn-east-2" => "https://upload-cn-east-2.qiniup.com",
        _ => "https://upload.qiniup.com",
    }
}

/// The proxy answers with the token either as plain text or as a JSON string.
fn read_token(response: &HttpResponse) -> Result<String, UploadError> {
    let text = response.text();
    let token = match serde_json::from_str::<Value>(&text) {
        Ok(Value::String(token)) => token,
        Ok(Value::Object(body)) => body
            .get("token")
            .or_else(|| body.get("data"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => text.trim().to_string(),
    };
    if token.is_empty() {
        Err(UploadError::ResponseShape(
            "the token service returned no upload token".to_string(),
        ))
    } else {
        Ok(token)
    }
}

pub struct QiniuHost {
    token_proxy: String,
    upload_host: Option<String>,
}

impl QiniuHost {
    pub fn new(token_proxy: impl Into<String>, upload_host: Option<String>) -> Self {
        Self {
            token_proxy: token_proxy.into(),
            upload_host,
        }
    }

    fn token_url(&self, settings: &QiniuSettings) -> String {
        format!(
            "{}/qiniu/{}/{}/{}",
            self.token_proxy.trim_end_matches('/'),
            encode_segment(settings.bucket.trim()),
            encode_segment(settings.access_key.trim()),
            encode_segment(settings.secret_key.trim()),
        )
    }
}

#[async_trait]
impl ImageHost for QiniuHost {
    type Settings = QiniuSettings;

    fn id(&self) -> BackendId {
        BackendId::Qiniu
    }

    async fn upload(
        &self,
        file: &ImageFile,
        settings: &QiniuSettings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError> {
        let token_response = ctx.send(HttpRequest::get(self.token_url(settings))).await?;
        if !token_response.is_success() {
            return Err(rejection(&token_response));
        }
        let token = read_token(&token_response)?;
        debug!(bucket = %settings.bucket, "Obtained Qiniu upload token");

        let key = object_name(&file.name, &settings.namespace);
        let host = self
            .upload_host
            .clone()
            .unwrap_or_else(|| upload_host(&settings.region).to_string());
        let request = HttpRequest::post(host).body(RequestBody::Multipart(vec![
            FormPart::text("token", token),
            FormPart::text("key", key.clone()),
            FormPart::file("file", file),
        ]));
        let response = ctx.send_tracked(request).await?;
        if !response.is_success() {
            return Err(rejection(&response));
        }
        let body = parse_json(&response)?;
        let stored_key = body
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| UploadError::ResponseShape("no object key in response".to_string()))?;
        info!(requested = %key, stored = %stored_key, "Qiniu stored object");

        let url = public_url(&settings.domain, stored_key);
        Ok(Hosted {
            result: UploadResult {
                filename: file_stem(&file.name),
                url,
            },
            response: json!({ "key": stored_key, "hash": body.get("hash").cloned().unwrap_or(Value::Null) }),
        })
    }
}
