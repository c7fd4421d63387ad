/// # picbed CLI Interface (Module)
///
/// Command parsing and the glue between the terminal, the YAML config file and
/// [`picbed_core::dispatch::Dispatcher`].
///
/// All upload logic (backend selection, adapters, notifications, editor insertion) lives in the
/// `picbed-core` crate; this module only wires it to files, stdout and stderr.
///
/// ## Commands
/// - `upload`: upload images concurrently, print their URLs and optionally link them into a
///   markdown document
/// - `check`: resolve the selected backend and validate its settings without any network call
/// - `backends`: list the built-in backend ids
///
/// ## How To Use
/// - From a shell: `picbed upload --config picbed.yaml --document post.md shot.png`
/// - From tests: call [`run`] with a constructed [`Cli`]
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use picbed_core::config::ConfigStore;
use picbed_core::contract::{ImageFile, ResultLog, UploadRequest, UploadResult};
use picbed_core::dispatch::Dispatcher;
use picbed_core::editor::{Cursor, EditorDocument, TextBuffer};
use picbed_core::error::UploadError;
use picbed_core::host::BackendId;
use picbed_core::notify::NotificationBridge;
use picbed_core::transport::ReqwestTransport;

use crate::console::{ConsoleNotifier, ConsoleObserver};
use crate::load_config::{load_config, CliConfig};

/// CLI for picbed: upload images to an image host and link them into markdown.
#[derive(Parser)]
#[clap(
    name = "picbed",
    version,
    about = "Upload images to SM.MS, Qiniu, Aliyun OSS, Gitee, GitHub or a custom host"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload images to the configured backend and print their URLs
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Markdown file the image links are inserted into
        #[clap(long)]
        document: Option<PathBuf>,
        /// Zero-based line of the insertion point (defaults to the end of the document)
        #[clap(long, requires = "document")]
        line: Option<usize>,
        /// Zero-based column of the insertion point
        #[clap(long, requires = "line")]
        column: Option<usize>,
        /// Image files to upload
        #[clap(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate the configured backend without uploading anything
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// List the built-in backends
    Backends,
}

fn console_bridge() -> Arc<NotificationBridge> {
    Arc::new(NotificationBridge::new(Arc::new(ConsoleNotifier)))
}

fn dispatcher(config: CliConfig, notifier: Arc<NotificationBridge>) -> Result<Dispatcher> {
    let store: Arc<dyn ConfigStore> = Arc::new(config.store);
    let transport = Arc::new(ReqwestTransport::new()?);
    Ok(Dispatcher::with_endpoints(
        store,
        transport,
        notifier,
        config.endpoints,
    ))
}

async fn open_document(
    path: &Path,
    line: Option<usize>,
    column: Option<usize>,
) -> Result<Arc<TextBuffer>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read document {:?}: {}", path, e))?;
    let buffer = match line {
        Some(line) => TextBuffer::new(
            text,
            Cursor {
                line,
                column: column.unwrap_or(0),
            },
        ),
        None => TextBuffer::at_end(text),
    };
    Ok(Arc::new(buffer))
}

async fn upload_one(
    dispatcher: &Dispatcher,
    notifier: &NotificationBridge,
    path: PathBuf,
    document: Option<Arc<dyn EditorDocument>>,
    results: ResultLog,
) -> Result<UploadResult, UploadError> {
    let file = match ImageFile::read(&path).await {
        Ok(file) => file,
        Err(e) => {
            notifier.notify_error(&e.to_string());
            return Err(e);
        }
    };
    let mut request = UploadRequest::new(file, Arc::new(ConsoleObserver), results);
    if let Some(document) = document {
        request = request.with_document(document);
    }
    dispatcher.dispatch(&request).await
}

async fn upload(
    config: PathBuf,
    document: Option<PathBuf>,
    line: Option<usize>,
    column: Option<usize>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let notifier = console_bridge();
    let dispatcher = dispatcher(load_config(&config)?, notifier.clone())?;
    let buffer = match &document {
        Some(path) => Some(open_document(path, line, column).await?),
        None => None,
    };
    let results = ResultLog::new();

    tracing::info!(command = "upload", files = files.len(), "Starting uploads");
    let outcomes = join_all(files.iter().cloned().map(|path| {
        let document = buffer
            .clone()
            .map(|b| b as Arc<dyn EditorDocument>);
        upload_one(&dispatcher, &notifier, path, document, results.clone())
    }))
    .await;

    let mut failed = 0;
    for (path, outcome) in files.iter().zip(&outcomes) {
        match outcome {
            Ok(result) => println!("{}", result.url),
            Err(e) => {
                failed += 1;
                tracing::error!(command = "upload", path = ?path, error = %e, "Upload failed");
            }
        }
    }

    if let (Some(path), Some(buffer)) = (&document, &buffer) {
        if !results.is_empty() {
            tokio::fs::write(path, buffer.value())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to write document {:?}: {}", path, e))?;
            tracing::info!(command = "upload", document = ?path, links = results.len(), "Document updated");
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{failed} of {} uploads failed",
            outcomes.len()
        ));
    }
    Ok(())
}

fn check(config: PathBuf) -> Result<()> {
    let dispatcher = dispatcher(load_config(&config)?, console_bridge())?;
    match dispatcher.resolve() {
        Ok(resolution) => {
            if let Some(notice) = &resolution.notice {
                eprintln!("    {notice}");
            }
            println!(
                "{} ({}) is configured",
                resolution.backend,
                resolution.backend.display_name()
            );
            tracing::info!(command = "check", backend = %resolution.backend, "Configuration valid");
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "check", error = %e, "Configuration invalid");
            Err(anyhow::Error::new(e))
        }
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload {
            config,
            document,
            line,
            column,
            files,
        } => upload(config, document, line, column, files).await,
        Commands::Check { config } => check(config),
        Commands::Backends => {
            for backend in BackendId::BUILTIN {
                println!("{}\t{}", backend, backend.display_name());
            }
            Ok(())
        }
    }
}
