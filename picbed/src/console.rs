//! Terminal front end for notifications and upload callbacks.
//!
//! Messages go to stderr so stdout only carries the uploaded URLs.

use picbed_core::contract::{ImageFile, Progress, UploadObserver};
use picbed_core::error::UploadError;
use picbed_core::notify::{Notifier, NotifyError};

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn loading(&self, message: &str) -> Result<(), NotifyError> {
        eprintln!("... {message}");
        Ok(())
    }

    fn success(&self, message: &str) -> Result<(), NotifyError> {
        eprintln!("ok  {message}");
        Ok(())
    }

    fn error(&self, message: &str) -> Result<(), NotifyError> {
        eprintln!("err {message}");
        Ok(())
    }

    fn info(&self, message: &str) -> Result<(), NotifyError> {
        eprintln!("    {message}");
        Ok(())
    }

    fn warning(&self, message: &str) -> Result<(), NotifyError> {
        eprintln!("!   {message}");
        Ok(())
    }

    fn dismiss(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Prints per-file progress; outcomes are printed by the command once all uploads finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleObserver;

impl UploadObserver for ConsoleObserver {
    fn on_progress(&self, progress: Progress, file: &ImageFile) {
        eprintln!("    {}: {}%", file.name, progress.percent);
    }

    fn on_success(&self, _response: &serde_json::Value, file: &ImageFile) {
        tracing::debug!(file = %file.name, "Upload callback: success");
    }

    fn on_error(&self, error: &UploadError, message: &str) {
        tracing::debug!(error = %error, message, "Upload callback: error");
    }
}
