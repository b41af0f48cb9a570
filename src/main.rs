//! CLI entry point for pdf-mirror.

use std::io::{self, IsTerminal};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use pdf_mirror_core::{HttpClient, MirrorEngine, load_file_config};
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_layer = load_file_config(args.config.as_deref())?.unwrap_or_default();
    let config = args
        .config_layer()
        .layered_over(file_layer)
        .into_mirror_config()
        .context("Invalid configuration")?;

    info!(
        base_url = %config.base_url,
        output_dir = %config.output_dir.display(),
        "pdf-mirror starting"
    );

    let client = HttpClient::new(&config.client_settings())?;
    let engine = MirrorEngine::new(&config)?;

    let use_spinner = !args.quiet && !args.no_progress && io::stderr().is_terminal();
    let (spinner, stop) = progress::spawn_progress_ui(use_spinner, engine.stats());

    let result = engine.run(&client).await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner
        && let Err(e) = handle.await
    {
        warn!(error = %e, "progress task panicked");
    }

    let summary = result.context("Mirror run aborted")?;
    info!(
        categories = summary.categories,
        posts = summary.posts,
        finished = summary.processed(),
        failed = summary.failed.len(),
        pdfs_downloaded = summary.pdfs_downloaded(),
        pdfs_failed = summary.pdfs_failed(),
        "Finished posts: {}",
        summary.processed()
    );

    Ok(())
}
