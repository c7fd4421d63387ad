/// `load_config` module: the YAML file the CLI keeps picbed's key-value configuration in.
///
/// The file is a flat mapping from store keys to values. Host settings may be written as nested
/// YAML mappings; they are handed to the core as JSON text, the format the core persists them in.
///
/// ```yaml
/// image_hosting_type: qiniu
/// is_contain_img_name: true
/// qiniu_image_hosting:
///   accessKey: ak
///   secretKey: sk
///   bucket: images
///   domain: cdn.example.com
/// endpoints:
///   token_proxy: https://tokens.internal.example
/// ```
///
/// # Responsibilities
/// - Parse the YAML file once up front so a broken file fails the command early
/// - Serve [`ConfigStore::get`] by re-reading the file, so every upload sees the current content
/// - Let `PICBED_<KEY>` environment variables (e.g. from `.env`) override file entries, which keeps
///   tokens out of the file
/// - Map the optional `endpoints` section onto [`Endpoints`]
///
/// # Errors
/// Loading errors are `anyhow::Error`s surfaced at the CLI boundary; read errors during an
/// upload are [`StoreError`]s handled by the core.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use picbed_core::config::ConfigStore;
use picbed_core::error::StoreError;
use picbed_core::host::Endpoints;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, error, info};

/// Key of the section overriding service endpoints; not part of the store.
pub const ENDPOINTS_KEY: &str = "endpoints";

/// Prefix of environment variables overriding store keys.
pub const ENV_PREFIX: &str = "PICBED_";

#[derive(Debug, Default, Deserialize)]
pub struct EndpointsSection {
    pub smms_upload: Option<String>,
    pub token_proxy: Option<String>,
    pub qiniu_upload: Option<String>,
    pub aliyun_endpoint: Option<String>,
    pub gitee_api: Option<String>,
    pub github_api: Option<String>,
    pub jsdelivr_cdn: Option<String>,
}

impl EndpointsSection {
    pub fn into_endpoints(self) -> Endpoints {
        let defaults = Endpoints::default();
        Endpoints {
            smms_upload: self.smms_upload.unwrap_or(defaults.smms_upload),
            token_proxy: self.token_proxy.unwrap_or(defaults.token_proxy),
            qiniu_upload: self.qiniu_upload.or(defaults.qiniu_upload),
            aliyun_endpoint: self.aliyun_endpoint.or(defaults.aliyun_endpoint),
            gitee_api: self.gitee_api.unwrap_or(defaults.gitee_api),
            github_api: self.github_api.unwrap_or(defaults.github_api),
            jsdelivr_cdn: self.jsdelivr_cdn.unwrap_or(defaults.jsdelivr_cdn),
        }
    }
}

#[derive(Debug)]
pub struct CliConfig {
    pub store: YamlFileStore,
    pub endpoints: Endpoints,
}

/// [`ConfigStore`] backed by a YAML file that is re-read on every lookup.
#[derive(Debug, Clone)]
pub struct YamlFileStore {
    path: PathBuf,
}

impl YamlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_mapping(&self) -> std::result::Result<Mapping, StoreError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| StoreError(format!("could not read {}: {e}", self.path.display())))?;
        parse_mapping(&content)
            .map_err(|e| StoreError(format!("could not parse {}: {e}", self.path.display())))
    }
}

/// Environment variable overriding `key`, e.g. `PICBED_GITHUB_IMAGE_HOSTING`.
pub fn env_var_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
}

fn parse_mapping(content: &str) -> std::result::Result<Mapping, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Mapping::new());
    }
    serde_yaml::from_str(content)
}

/// Store representation of a YAML value: scalars as text, mappings and lists as JSON.
pub fn store_value(value: &Value) -> std::result::Result<Option<String>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Tagged(tagged) => store_value(&tagged.value),
        Value::Mapping(_) | Value::Sequence(_) => serde_json::to_string(value)
            .map(Some)
            .map_err(|e| StoreError(format!("value cannot be stored as JSON: {e}"))),
    }
}

impl ConfigStore for YamlFileStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        if let Ok(value) = std::env::var(env_var_name(key)) {
            debug!(key, "Config value taken from environment");
            return Ok(Some(value));
        }
        let mapping = self.read_mapping()?;
        match mapping.get(key) {
            Some(value) => store_value(value),
            None => Ok(None),
        }
    }
}

/// Loads the YAML config file, checking that it parses, and extracts the endpoint overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mapping = match parse_mapping(&content) {
        Ok(mapping) => {
            info!(config_path = ?path_ref, keys = mapping.len(), "Parsed config YAML successfully");
            mapping
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let endpoints = match mapping.get(ENDPOINTS_KEY) {
        Some(section) => serde_yaml::from_value::<EndpointsSection>(section.clone())
            .map_err(|e| anyhow::anyhow!("Invalid `{ENDPOINTS_KEY}` section: {e}"))?
            .into_endpoints(),
        None => Endpoints::default(),
    };

    Ok(CliConfig {
        store: YamlFileStore::new(path_ref),
        endpoints,
    })
}
