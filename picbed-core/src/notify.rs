//! Notification bridge: best-effort user feedback that can never fail an upload.
//!
//! A [`NotificationBridge`] forwards to a primary [`Notifier`] (a toast, a console line, ...).
//! If that fails the failure is logged; error messages are then retried on an optional secondary
//! notifier and finally written to the log, so the user always gets some signal about a failure.

use std::sync::Arc;

use mockall::automock;
use thiserror::Error;
use tracing::{error, info, warn};

pub const UPLOADING_MESSAGE: &str = "Uploading image";
pub const UPLOADED_MESSAGE: &str = "Image uploaded";
pub const DEFAULT_ERROR_MESSAGE: &str = "Image upload failed";

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// A UI mechanism able to show short-lived messages.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Notifier: Send + Sync {
    /// Shows a message that stays until dismissed.
    fn loading(&self, message: &str) -> Result<(), NotifyError>;
    fn success(&self, message: &str) -> Result<(), NotifyError>;
    fn error(&self, message: &str) -> Result<(), NotifyError>;
    fn info(&self, message: &str) -> Result<(), NotifyError>;
    fn warning(&self, message: &str) -> Result<(), NotifyError>;
    /// Removes every message currently shown.
    fn dismiss(&self) -> Result<(), NotifyError>;
}

#[derive(Clone, Default)]
pub struct NotificationBridge {
    primary: Option<Arc<dyn Notifier>>,
    secondary: Option<Arc<dyn Notifier>>,
}

impl NotificationBridge {
    pub fn new(primary: Arc<dyn Notifier>) -> Self {
        Self {
            primary: Some(primary),
            secondary: None,
        }
    }

    /// Bridge without any UI: every notification only goes to the log.
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, secondary: Arc<dyn Notifier>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn notify_start(&self) {
        self.deliver("loading", UPLOADING_MESSAGE, |n| n.loading(UPLOADING_MESSAGE));
    }

    /// Clears the "uploading" message and shows the success message.
    pub fn notify_done(&self) {
        self.dismiss();
        self.deliver("success", UPLOADED_MESSAGE, |n| n.success(UPLOADED_MESSAGE));
    }

    pub fn notify_info(&self, message: &str) {
        self.deliver("info", message, |n| n.info(message));
    }

    pub fn notify_warning(&self, message: &str) {
        self.deliver("warning", message, |n| n.warning(message));
    }

    pub fn dismiss(&self) {
        self.deliver("dismiss", "", |n| n.dismiss());
    }

    /// Shows `message` (or a generic failure text when empty) on the first mechanism that works.
    pub fn notify_error(&self, message: &str) {
        let message = if message.trim().is_empty() {
            DEFAULT_ERROR_MESSAGE
        } else {
            message
        };
        if let Some(primary) = &self.primary {
            match primary.error(message) {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Primary notifier failed to show error"),
            }
        }
        if let Some(secondary) = &self.secondary {
            match secondary.error(message) {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "Secondary notifier failed to show error"),
            }
        }
        error!(message, "Upload error (no notifier available)");
    }

    fn deliver<F>(&self, kind: &str, message: &str, show: F)
    where
        F: Fn(&dyn Notifier) -> Result<(), NotifyError>,
    {
        match &self.primary {
            Some(primary) => {
                if let Err(e) = show(primary.as_ref()) {
                    warn!(error = %e, kind, message, "Notifier failed, continuing");
                }
            }
            None => {
                if !message.is_empty() {
                    info!(kind, message, "Notification");
                }
            }
        }
    }
}
