//! Aliyun OSS object storage: a signed `PUT` with long-lived credentials.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use tracing::debug;

use super::{rejection, BackendId, Hosted, ImageHost, UploadContext};
use crate::config::{blank_fields, HostSettings, ALIYUN_IMAGE_HOSTING};
use crate::contract::{HttpRequest, ImageFile, RequestBody, UploadResult};
use crate::error::UploadError;
use crate::naming::{content_type, encode_uri, file_stem, object_name, public_url};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AliOssSettings {
    /// e.g. `oss-cn-hangzhou` (the `oss-` prefix is added when missing).
    pub region: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub bucket: String,
    /// Optional CDN/custom domain used for the public URL instead of the bucket endpoint.
    pub domain: String,
}

impl HostSettings for AliOssSettings {
    const KEY: &'static str = ALIYUN_IMAGE_HOSTING;

    fn missing_fields(&self) -> Vec<&'static str> {
        blank_fields(&[
            ("region", &self.region),
            ("accessKeyId", &self.access_key_id),
            ("accessKeySecret", &self.access_key_secret),
            ("bucket", &self.bucket),
        ])
    }
}

/// OSS v1 signature: base64(HMAC-SHA1(secret, string_to_sign)).
pub fn sign(secret: &str, string_to_sign: &str) -> Result<String, UploadError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| UploadError::configuration(format!("invalid Aliyun access key secret: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn string_to_sign(content_type: &str, date: &str, bucket: &str, object: &str) -> String {
    format!("PUT\n\n{content_type}\n{date}\n/{bucket}/{object}")
}

pub struct AliOssHost {
    endpoint: Option<String>,
}

impl AliOssHost {
    /// `endpoint` replaces `https://{bucket}.{region}.aliyuncs.com` when given.
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }

    fn object_url(&self, settings: &AliOssSettings, object: &str) -> String {
        match &self.endpoint {
            Some(base) => format!("{}/{object}", base.trim_end_matches('/')),
            None => {
                let region = settings.region.trim();
                let region = if region.starts_with("oss-") {
                    region.to_string()
                } else {
                    format!("oss-{region}")
                };
                format!(
                    "https://{}.{region}.aliyuncs.com/{object}",
                    settings.bucket.trim()
                )
            }
        }
    }
}

#[async_trait]
impl ImageHost for AliOssHost {
    type Settings = AliOssSettings;

    fn id(&self) -> BackendId {
        BackendId::Aliyun
    }

    async fn upload(
        &self,
        file: &ImageFile,
        settings: &AliOssSettings,
        ctx: &UploadContext<'_>,
    ) -> Result<Hosted, UploadError> {
        let object = object_name(&file.name, "");
        let mime = content_type(&file.name);
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let bucket = settings.bucket.trim();
        let signature = sign(
            settings.access_key_secret.trim(),
            &string_to_sign(&mime, &date, bucket, &object),
        )?;
        let object_url = self.object_url(settings, &object);
        debug!(%object_url, "Putting object to Aliyun OSS");

        let request = HttpRequest::put(object_url.clone())
            .header("Date", date)
            .header(
                "Authorization",
                format!("OSS {}:{signature}", settings.access_key_id.trim()),
            )
            .body(RequestBody::Bytes {
                content_type: mime,
                data: file.bytes.to_vec(),
            });
        let response = ctx.send_tracked(request).await?;
        if !response.is_success() {
            return Err(rejection(&response));
        }

        let url = if settings.domain.trim().is_empty() {
            encode_uri(&object_url)
        } else {
            public_url(&settings.domain, &object)
        };
        Ok(Hosted {
            result: UploadResult {
                filename: file_stem(&file.name),
                url: url.clone(),
            },
            response: json!({ "name": object, "url": url, "status": response.status }),
        })
    }
}
