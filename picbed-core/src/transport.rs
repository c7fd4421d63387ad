//! reqwest-backed [`Transport`]: the only place the core touches the network.
//!
//! Every host goes through the same client, so they all share one timeout policy
//! ([`REQUEST_TIMEOUT`]). Request bodies are streamed in chunks to report upload progress.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tracing::{debug, error};

use crate::contract::{
    FormPart, HttpRequest, HttpResponse, Method, ProgressFn, RequestBody, Transport,
};
use crate::error::TransportError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CHUNK_SIZE: usize = 64 * 1024;

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("picbed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                error!(error = ?e, "Failed to build HTTP client");
                TransportError::Request(e.to_string())
            })?;
        Ok(Self { client })
    }

    /// Uses a caller-built client; its timeout policy applies instead of [`REQUEST_TIMEOUT`].
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Body that reports `(loaded, total)` as each chunk is handed to the connection.
fn tracked_body(data: Vec<u8>, progress: Option<ProgressFn>) -> Body {
    let Some(progress) = progress else {
        return Body::from(data);
    };
    let total = data.len() as u64;
    let chunks: Vec<Vec<u8>> = data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let mut loaded = 0u64;
    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
        loaded += chunk.len() as u64;
        progress(loaded, total);
        Ok::<_, std::io::Error>(chunk)
    }));
    Body::wrap_stream(stream)
}

/// Only a failed connect counts as unreachable; once connected, a missing reply is `NoResponse`.
fn classify(e: reqwest::Error) -> TransportError {
    if e.is_builder() {
        TransportError::Request(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::NoResponse(e.to_string())
    }
}

fn multipart_form(parts: Vec<FormPart>, progress: Option<ProgressFn>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                let length = data.len() as u64;
                let part = Part::stream_with_length(tracked_body(data, progress.clone()), length)
                    .file_name(file_name)
                    .mime_str(&content_type)
                    .map_err(|e| TransportError::Request(e.to_string()))?;
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        progress: Option<ProgressFn>,
    ) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        debug!(method = %method, url = %request.url, "Sending request");
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let encoded = match request.body {
            RequestBody::Empty => None,
            RequestBody::Bytes { content_type, data } => Some((content_type, data)),
            RequestBody::Form(fields) => {
                let text = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .finish();
                Some((
                    "application/x-www-form-urlencoded".to_string(),
                    text.into_bytes(),
                ))
            }
            RequestBody::Json(value) => {
                let data = serde_json::to_vec(&value)
                    .map_err(|e| TransportError::Request(e.to_string()))?;
                Some(("application/json".to_string(), data))
            }
            RequestBody::Multipart(parts) => {
                builder = builder.multipart(multipart_form(parts, progress.clone())?);
                None
            }
        };
        if let Some((content_type, data)) = encoded {
            builder = builder
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_LENGTH, data.len())
                .body(tracked_body(data, progress));
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = ?e, url = %request.url, "Request failed");
            classify(e)
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            error!(error = ?e, url = %request.url, status, "Failed to read response body");
            classify(e)
        })?;
        debug!(url = %request.url, status, bytes = body.len(), "Received response");
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
