//! Persisted configuration: the key-value store seam and typed per-host settings.
//!
//! Settings are stored as JSON text under one key per host and are read fresh from the
//! [`ConfigStore`] on every upload, so a setting that was never saved is caught at the point of use.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use mockall::automock;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use tracing::{debug, error};

use crate::error::{StoreError, UploadError};

/// Selected host id (or legacy display name, or the custom host's name).
pub const IMAGE_HOSTING_TYPE: &str = "image_hosting_type";
pub const SMMS_IMAGE_HOSTING: &str = "smms_image_hosting";
pub const QINIU_IMAGE_HOSTING: &str = "qiniu_image_hosting";
pub const ALIYUN_IMAGE_HOSTING: &str = "aliyun_image_hosting";
pub const GITEE_IMAGE_HOSTING: &str = "gitee_image_hosting";
pub const GITHUB_IMAGE_HOSTING: &str = "github_image_hosting";
pub const CUSTOM_IMAGE_HOSTING: &str = "custom_image_hosting";
/// `"true"` to write `![name](url)` instead of `![](url)`.
pub const IS_CONTAIN_IMG_NAME: &str = "is_contain_img_name";

/// Generic string key-value store the configuration lives in.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// In-process store, mostly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }

    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
}

/// Typed settings of one image host.
pub trait HostSettings: DeserializeOwned + Default + Send + Sync + 'static {
    /// Store key the settings are persisted under.
    const KEY: &'static str;

    /// Required fields that are absent or blank.
    fn missing_fields(&self) -> Vec<&'static str>;

    fn validate(&self, backend: &str) -> Result<(), UploadError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(UploadError::incomplete(backend, missing))
        }
    }
}

/// Names of the `(name, value)` pairs whose value is blank.
pub fn blank_fields(fields: &[(&'static str, &str)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect()
}

/// Reads, parses and validates the settings of `backend`.
///
/// An absent key yields default (empty) settings, which then fail validation if the host has
/// required fields. Store and parse failures are configuration errors.
pub fn load_settings<S: HostSettings>(
    store: &dyn ConfigStore,
    backend: &str,
) -> Result<S, UploadError> {
    let settings = read_settings::<S>(store, backend)?;
    settings.validate(backend)?;
    debug!(backend, key = S::KEY, "Settings loaded and validated");
    Ok(settings)
}

/// Reads and parses settings without validating them.
pub fn read_settings<S: HostSettings>(
    store: &dyn ConfigStore,
    backend: &str,
) -> Result<S, UploadError> {
    let raw = store.get(S::KEY).map_err(|e| {
        error!(error = %e, backend, key = S::KEY, "Failed to read settings from store");
        UploadError::configuration(format!("could not read {backend} configuration: {e}"))
    })?;
    match raw {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, backend, key = S::KEY, "Failed to parse settings JSON");
            UploadError::configuration(format!(
                "{backend} configuration is malformed, please configure it again"
            ))
        }),
        _ => Ok(S::default()),
    }
}

/// Accepts `true`, `"true"` and their false counterparts; anything else is false.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => s.trim().eq_ignore_ascii_case("true"),
        None => false,
    })
}
