//! Error taxonomy shared by the dispatcher, the transport and every image host.
//!
//! Every failure is classified into one [`UploadError`] variant before it leaves an adapter, and
//! [`UploadError::user_message`] turns it into the text shown to the user.

use std::fmt;

use thiserror::Error;

/// Why no usable HTTP response came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    /// The host could not be reached at all (DNS, refused connection, TLS).
    Unreachable,
    /// The request went out but no (complete) response arrived in time.
    NoResponse,
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFailure::Unreachable => f.write_str("unreachable"),
            NetworkFailure::NoResponse => f.write_str("no response"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// Missing or invalid backend configuration, detected before any network call.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        missing: Vec<&'static str>,
    },
    #[error("network error ({kind}): {detail}")]
    Network { kind: NetworkFailure, detail: String },
    /// Non-2xx status or an API-reported failure code.
    #[error("server rejected upload ({status}): {message}")]
    Server { status: u16, message: String },
    /// A successful response without the fields we need.
    #[error("unexpected response: {0}")]
    ResponseShape(String),
    /// Invalid local file (no name, too large, unreadable).
    #[error("invalid input: {0}")]
    Input(String),
}

impl UploadError {
    pub fn configuration(message: impl Into<String>) -> Self {
        UploadError::Configuration {
            message: message.into(),
            missing: Vec::new(),
        }
    }

    /// Required-field violation for `backend`.
    pub fn incomplete(backend: &str, missing: Vec<&'static str>) -> Self {
        UploadError::Configuration {
            message: format!(
                "{backend} configuration is incomplete, missing: {}",
                missing.join(", ")
            ),
            missing,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, UploadError::Configuration { .. })
    }

    /// Message for the notification shown to the user after an upload to `backend` failed.
    pub fn user_message(&self, backend: &str) -> String {
        match self {
            UploadError::Configuration { message, .. } => message.clone(),
            UploadError::Network {
                kind: NetworkFailure::Unreachable,
                ..
            } => format!(
                "Network error: could not reach {backend}, check your connection or whether the service is available"
            ),
            UploadError::Network {
                kind: NetworkFailure::NoResponse,
                ..
            } => format!("{backend} did not respond, please try again later"),
            UploadError::Server { status, message } => {
                format!("{backend} server error ({status}): {message}")
            }
            UploadError::ResponseShape(detail) => {
                format!("Could not process the {backend} response: {detail}")
            }
            UploadError::Input(detail) => detail.clone(),
        }
    }
}

/// Failure of a single HTTP round trip, before any status code is looked at.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("no response received: {0}")]
    NoResponse(String),
    /// The request could not be built (bad URL, bad header, unencodable body). Comes from
    /// configured values, so it surfaces as a configuration error.
    #[error("invalid request: {0}")]
    Request(String),
}

impl From<TransportError> for UploadError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Connect(detail) => UploadError::Network {
                kind: NetworkFailure::Unreachable,
                detail,
            },
            TransportError::NoResponse(detail) => UploadError::Network {
                kind: NetworkFailure::NoResponse,
                detail,
            },
            TransportError::Request(detail) => {
                UploadError::configuration(format!("could not build the request: {detail}"))
            }
        }
    }
}

/// The key-value store behind the configuration could not be read.
#[derive(Debug, Error)]
#[error("config store unavailable: {0}")]
pub struct StoreError(pub String);
