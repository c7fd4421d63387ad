use anyhow::Result;
use clap::Parser;
use picbed::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets such as PICBED_GITHUB_IMAGE_HOSTING may live in .env
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
