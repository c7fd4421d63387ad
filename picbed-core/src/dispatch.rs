//! Upload dispatcher: picks the configured image host and runs one upload through it.
//!
//! Every call to [`Dispatcher::dispatch`] reads the selection and the selected host's settings
//! fresh from the [`ConfigStore`], validates them and routes the request through a registration
//! table of adapters.
//!
//! # Major Types
//! - [`Dispatcher`]: the registration table plus the shared [`Pipeline`]
//! - [`Resolution`]: which backend a selection resolved to, and why
//!
//! # Resolution order
//! 1. Absent, empty or unreadable selection: default backend, with an informational notice
//! 2. Selection equal to the custom host's configured name: the custom host
//! 3. A built-in id or its legacy display name: that backend
//! 4. Anything else: default backend, with an informational notice
//!
//! # Error Handling
//! Configuration problems (incomplete or malformed settings, missing custom URL, unregistered
//! backend) fail the upload before any network call. They are reported exactly like upload
//! failures: one error notification, one `on_error` call, and the error is returned.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::{load_settings, read_settings, ConfigStore, IMAGE_HOSTING_TYPE};
use crate::contract::{Transport, UploadRequest, UploadResult};
use crate::editor::EditorWriter;
use crate::error::UploadError;
use crate::host::{
    AliOssHost, BackendId, CustomHost, CustomHostSettings, Endpoints, GitHubHost, GiteeHost,
    ImageHost, Pipeline, QiniuHost, SmmsHost,
};
use crate::notify::NotificationBridge;

pub const NO_SELECTION_NOTICE: &str = "No image host selected, using SM.MS";

/// Notice shown when the stored selection matches no backend.
pub fn unknown_selection_notice(selection: &str) -> String {
    format!("Unknown image host \"{selection}\", using SM.MS")
}

/// Outcome of resolving the stored selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub backend: BackendId,
    /// Set when the default backend was picked as a fallback.
    pub notice: Option<String>,
}

impl Resolution {
    fn selected(backend: BackendId) -> Self {
        Self {
            backend,
            notice: None,
        }
    }

    fn fallback(notice: String) -> Self {
        Self {
            backend: BackendId::DEFAULT,
            notice: Some(notice),
        }
    }
}

/// A registered adapter with its settings type erased.
trait Route: Send + Sync {
    /// Loads and validates the adapter's settings.
    fn prepare(&self, store: &dyn ConfigStore) -> Result<Box<dyn Prepared>, UploadError>;
}

/// An adapter together with settings that passed validation.
#[async_trait]
trait Prepared: Send + Sync {
    async fn run(
        &self,
        pipeline: &Pipeline,
        request: &UploadRequest,
    ) -> Result<UploadResult, UploadError>;
}

struct Registered<H>(Arc<H>);

struct Loaded<H: ImageHost> {
    host: Arc<H>,
    settings: H::Settings,
}

impl<H: ImageHost> Route for Registered<H> {
    fn prepare(&self, store: &dyn ConfigStore) -> Result<Box<dyn Prepared>, UploadError> {
        let settings = load_settings::<H::Settings>(store, self.0.id().display_name())?;
        Ok(Box::new(Loaded {
            host: self.0.clone(),
            settings,
        }))
    }
}

#[async_trait]
impl<H: ImageHost> Prepared for Loaded<H> {
    async fn run(
        &self,
        pipeline: &Pipeline,
        request: &UploadRequest,
    ) -> Result<UploadResult, UploadError> {
        pipeline
            .run(self.host.as_ref(), &self.settings, request)
            .await
    }
}

pub struct Dispatcher {
    store: Arc<dyn ConfigStore>,
    pipeline: Pipeline,
    routes: BTreeMap<BackendId, Arc<dyn Route>>,
}

impl Dispatcher {
    /// Dispatcher with every built-in host registered against the public services.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn Transport>,
        notifier: Arc<NotificationBridge>,
    ) -> Self {
        Self::with_endpoints(store, transport, notifier, Endpoints::default())
    }

    pub fn with_endpoints(
        store: Arc<dyn ConfigStore>,
        transport: Arc<dyn Transport>,
        notifier: Arc<NotificationBridge>,
        endpoints: Endpoints,
    ) -> Self {
        let pipeline = Pipeline::new(transport, notifier, EditorWriter::new(store.clone()));
        Self {
            store,
            pipeline,
            routes: BTreeMap::new(),
        }
        .register(SmmsHost::new(endpoints.smms_upload))
        .register(QiniuHost::new(endpoints.token_proxy, endpoints.qiniu_upload))
        .register(AliOssHost::new(endpoints.aliyun_endpoint))
        .register(GiteeHost::new(endpoints.gitee_api))
        .register(GitHubHost::new(endpoints.github_api, endpoints.jsdelivr_cdn))
        .register(CustomHost)
    }

    /// Delay between an upload's success and the "uploaded" notification.
    pub fn with_success_delay(mut self, delay: Duration) -> Self {
        self.pipeline = self.pipeline.with_success_delay(delay);
        self
    }

    /// Registers `host`, replacing any adapter registered for the same backend.
    pub fn register<H: ImageHost>(mut self, host: H) -> Self {
        let backend = host.id();
        self.routes
            .insert(backend, Arc::new(Registered(Arc::new(host))));
        self
    }

    /// Registered backends, in [`BackendId`] order.
    pub fn backends(&self) -> Vec<BackendId> {
        self.routes.keys().copied().collect()
    }

    /// The selected backend; never fails, unusable selections fall back to the default.
    fn select(&self) -> Resolution {
        let selection = match self.store.get(IMAGE_HOSTING_TYPE) {
            Ok(Some(value)) if !value.trim().is_empty() => value.trim().to_string(),
            Ok(_) => return Resolution::fallback(NO_SELECTION_NOTICE.to_string()),
            Err(e) => {
                warn!(error = %e, "Could not read image host selection");
                return Resolution::fallback(NO_SELECTION_NOTICE.to_string());
            }
        };

        match read_settings::<CustomHostSettings>(self.store.as_ref(), "custom image host") {
            Ok(custom)
                if !custom.hosting_name.trim().is_empty()
                    && custom.hosting_name.trim() == selection =>
            {
                return Resolution::selected(BackendId::Custom);
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable custom image host record"),
        }

        match BackendId::parse_builtin(&selection) {
            Some(backend) => Resolution::selected(backend),
            None => Resolution::fallback(unknown_selection_notice(&selection)),
        }
    }

    fn prepare(&self, backend: BackendId) -> Result<Box<dyn Prepared>, UploadError> {
        let route = self.routes.get(&backend).ok_or_else(|| {
            UploadError::configuration(format!(
                "no adapter registered for {}",
                backend.display_name()
            ))
        })?;
        route.prepare(self.store.as_ref())
    }

    /// Resolves the selection and validates the selected backend's settings without uploading.
    pub fn resolve(&self) -> Result<Resolution, UploadError> {
        let resolution = self.select();
        self.prepare(resolution.backend)?;
        Ok(resolution)
    }

    /// Uploads `request.file` to the configured backend.
    pub async fn dispatch(&self, request: &UploadRequest) -> Result<UploadResult, UploadError> {
        let resolution = self.select();
        let backend = resolution.backend;
        if let Some(notice) = &resolution.notice {
            info!(%backend, notice = %notice, "Falling back to the default image host");
            self.pipeline.notifier().notify_info(notice);
        }

        let prepared = match self.prepare(backend) {
            Ok(prepared) => prepared,
            Err(e) => {
                let message = e.user_message(backend.display_name());
                error!(%backend, file = %request.file.name, error = %e, "Image host configuration rejected");
                self.pipeline.notifier().notify_error(&message);
                request.observer.on_error(&e, &message);
                return Err(e);
            }
        };
        debug!(%backend, file = %request.file.name, "Dispatching upload");
        prepared.run(&self.pipeline, request).await
    }
}
