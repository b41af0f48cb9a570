//! Retrying transport, naming and the per-post download pipeline.
//!
//! # Features
//!
//! - One shared HTTP session with a hard connection cap
//! - Exponential backoff with jitter for every logical request
//! - Streaming downloads that never leave a truncated file behind
//! - Filesystem-safe, collision-free directory and file names
//! - Two independent slot pools (posts, downloads) in [`MirrorEngine`]
//!
//! # Example
//!
//! ```no_run
//! use pdf_mirror_core::download::{ClientSettings, HttpClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&ClientSettings::default())?;
//! let bytes = client
//!     .download_to_file("https://example.com/paper.pdf", Path::new("./paper.pdf"))
//!     .await?;
//! println!("Downloaded {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
pub mod filename;
mod pipeline;
mod retry;

pub use client::{ClientSettings, HttpClient, JsonResponse};
pub use engine::{EngineError, MirrorEngine, MirrorStats, PostFailure, RunSummary};
pub use error::DownloadError;
pub use filename::{NameRegistry, resolve_directory_name, resolve_file_name, sanitize_name};
pub use pipeline::{
    DownloadOutcome, PostContext, PostError, download_link, process_post, process_raw_post,
};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
