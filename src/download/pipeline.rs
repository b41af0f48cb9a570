//! Per-post processing: links to files, files to a metadata record.
//!
//! [`process_post`] extracts a post's PDF links, resolves its output
//! directory, downloads each link in discovery order and finally writes
//! `metadata.json`. A failed download is recorded in the link's
//! [`DownloadOutcome`] and never stops the remaining links. Anything else
//! that goes wrong surfaces as a [`PostError`] for the engine to isolate.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::{DownloadError, HttpClient};
use super::engine::MirrorStats;
use super::filename::{NameRegistry, resolve_directory_name, resolve_file_name};
use crate::api::{Post, post_id_hint};
use crate::metadata::{MetadataError, PdfRecord, PostRecord, write_metadata};
use crate::parser::{LinkExtractor, ParseError};

/// Errors that exclude a single post from the run.
#[derive(Debug, Error)]
pub enum PostError {
    /// The raw item did not decode into a post.
    #[error("malformed post: {source}")]
    Decode {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Link extraction failed.
    #[error("link extraction failed: {0}")]
    Extract(#[from] ParseError),

    /// The post directory could not be created.
    #[error("failed to create post directory: {0}")]
    Directory(#[source] DownloadError),

    /// The metadata record could not be written.
    #[error("failed to write metadata: {0}")]
    Metadata(#[from] MetadataError),

    /// A concurrency slot pool was closed.
    #[error("{pool} slot pool closed")]
    SlotPoolClosed {
        /// Which pool.
        pool: &'static str,
    },
}

/// Result of one link's transfer. Never fatal to the post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Whether the file was fully written.
    pub downloaded: bool,
    /// Failure message, empty on success.
    pub error: String,
}

impl DownloadOutcome {
    /// A successful transfer.
    #[must_use]
    pub fn success() -> Self {
        Self {
            downloaded: true,
            error: String::new(),
        }
    }

    /// A failed transfer described by `error`.
    #[must_use]
    pub fn failure(error: &impl Display) -> Self {
        Self {
            downloaded: false,
            error: error.to_string(),
        }
    }
}

/// Shared, read-only state every post is processed with.
#[derive(Clone, Copy)]
pub struct PostContext<'a> {
    /// Transport shared by all posts.
    pub client: &'a HttpClient,
    /// Download slot pool shared by all posts.
    pub download_slots: &'a Semaphore,
    /// Source of PDF links.
    pub extractor: &'a dyn LinkExtractor,
    /// Category id to display name.
    pub categories: &'a HashMap<u64, String>,
    /// Site URL relative links resolve against.
    pub base_url: &'a str,
    /// Root directory for per-post output.
    pub output_root: &'a Path,
    /// Run counters.
    pub stats: &'a MirrorStats,
}

/// Decodes a raw collection item and processes it.
///
/// # Errors
///
/// Returns [`PostError::Decode`] for a malformed item, otherwise whatever
/// [`process_post`] returns.
pub async fn process_raw_post(ctx: PostContext<'_>, raw: Value) -> Result<PostRecord, PostError> {
    let hint = post_id_hint(&raw);
    let post = Post::from_value(raw).map_err(|source| {
        debug!(post_id = ?hint, error = %source, "post failed to decode");
        PostError::Decode { source }
    })?;
    process_post(ctx, &post).await
}

/// Processes one post and writes its `metadata.json`.
///
/// # Errors
///
/// Returns [`PostError`] when link extraction, directory creation or the
/// metadata write fails. Individual download failures are not errors.
#[instrument(skip(ctx, post), fields(post_id = post.id))]
pub async fn process_post(ctx: PostContext<'_>, post: &Post) -> Result<PostRecord, PostError> {
    let title = post.title_text();
    let category_ids = post.category_ids().to_vec();
    let category_names = category_ids
        .iter()
        .map(|id| ctx.categories.get(id).cloned().unwrap_or_default())
        .collect();

    let links = ctx.extractor.extract(post.content_html(), ctx.base_url)?;
    let post_dir =
        resolve_directory_name(ctx.output_root, &title, post.id).map_err(PostError::Directory)?;
    debug!(dir = %post_dir.display(), links = links.len(), "post directory ready");

    let mut registry = NameRegistry::new();
    let mut pdfs = Vec::with_capacity(links.len());
    for link in links {
        let file_name = resolve_file_name(&link.text, &link.url, &mut registry);
        let dest = post_dir.join(&file_name);
        let outcome = download_link(ctx, &link.url, &dest).await?;

        if outcome.downloaded {
            ctx.stats.increment_pdfs_downloaded();
        } else {
            ctx.stats.increment_pdfs_failed();
            warn!(post_id = post.id, url = %link.url, error = %outcome.error, "pdf download failed");
        }

        pdfs.push(PdfRecord {
            url: link.url,
            link_text: link.text,
            file_name,
            downloaded: outcome.downloaded,
            error: outcome.error,
        });
    }

    let record = PostRecord {
        post_id: post.id,
        post_title: title,
        date: post.date().to_string(),
        category_ids,
        category_names,
        pdfs,
    };
    write_metadata(&post_dir, &record)?;
    Ok(record)
}

/// Downloads `url` to `dest` while holding one download slot.
///
/// The slot is held for the whole transfer, retries included.
///
/// # Errors
///
/// Only [`PostError::SlotPoolClosed`]; transfer failures become a failed
/// [`DownloadOutcome`].
#[instrument(skip(ctx, url, dest), fields(url = %url, dest = %dest.display()))]
pub async fn download_link(
    ctx: PostContext<'_>,
    url: &str,
    dest: &Path,
) -> Result<DownloadOutcome, PostError> {
    let _slot = ctx
        .download_slots
        .acquire()
        .await
        .map_err(|_| PostError::SlotPoolClosed { pool: "download" })?;

    match ctx.client.download_to_file(url, dest).await {
        Ok(bytes) => {
            debug!(bytes, "pdf downloaded");
            Ok(DownloadOutcome::success())
        }
        Err(e) => Ok(DownloadOutcome::failure(&e)),
    }
}
