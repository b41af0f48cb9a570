//! Mirror engine: lists the site, then processes every post concurrently.
//!
//! # Overview
//!
//! [`MirrorEngine::run`] fetches all categories and all posts, then drives
//! one future per post. Two independent slot pools bound the work:
//!
//! - the **post** pool gates entry into a post's processing and is held
//!   until its `metadata.json` is written;
//! - the **download** pool gates each file transfer and is shared by every
//!   post, so in-flight downloads never exceed its capacity no matter how
//!   many posts are active.
//!
//! All futures run on the calling task and interleave at I/O boundaries.
//! Listing failures abort the run; a failing post is logged, counted and
//! left out of the summary.
//!
//! # Example
//!
//! ```no_run
//! use pdf_mirror_core::{HttpClient, MirrorConfig, MirrorEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MirrorConfig::new("https://example.org");
//! let client = HttpClient::new(&config.client_settings())?;
//! let engine = MirrorEngine::new(&config)?;
//! let summary = engine.run(&client).await?;
//! println!("Processed: {}, Failed: {}", summary.processed(), summary.failed.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::HttpClient;
use super::pipeline::{PostContext, PostError, process_raw_post};
use crate::api::{ApiError, fetch_categories, fetch_posts, post_id_hint};
use crate::config::MirrorConfig;
use crate::metadata::PostRecord;
use crate::parser::{HtmlLinkExtractor, LinkExtractor};

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Error type for mirror engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid {name} value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// Which limit was rejected.
        name: &'static str,
        /// The invalid value that was provided.
        value: usize,
    },

    /// The output root could not be created.
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        /// The output root.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Listing categories or posts failed.
    #[error("collection failed: {0}")]
    Collection(#[from] ApiError),
}

/// Live counters for a run.
///
/// Shared with the progress display through [`MirrorEngine::stats`]. Uses
/// atomic counters so readers on other threads see consistent values.
#[derive(Debug, Default)]
pub struct MirrorStats {
    posts_total: AtomicUsize,
    posts_finished: AtomicUsize,
    posts_failed: AtomicUsize,
    pdfs_downloaded: AtomicUsize,
    pdfs_failed: AtomicUsize,
}

impl MirrorStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of posts listed (0 until listing completes).
    #[must_use]
    pub fn posts_total(&self) -> usize {
        self.posts_total.load(Ordering::SeqCst)
    }

    /// Number of posts that produced a record.
    #[must_use]
    pub fn posts_finished(&self) -> usize {
        self.posts_finished.load(Ordering::SeqCst)
    }

    /// Number of posts excluded after an error.
    #[must_use]
    pub fn posts_failed(&self) -> usize {
        self.posts_failed.load(Ordering::SeqCst)
    }

    /// Posts finished or failed.
    #[must_use]
    pub fn posts_done(&self) -> usize {
        self.posts_finished() + self.posts_failed()
    }

    /// Number of PDFs written.
    #[must_use]
    pub fn pdfs_downloaded(&self) -> usize {
        self.pdfs_downloaded.load(Ordering::SeqCst)
    }

    /// Number of PDFs whose transfer failed.
    #[must_use]
    pub fn pdfs_failed(&self) -> usize {
        self.pdfs_failed.load(Ordering::SeqCst)
    }

    fn set_posts_total(&self, total: usize) {
        self.posts_total.store(total, Ordering::SeqCst);
    }

    fn increment_posts_finished(&self) {
        self.posts_finished.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_posts_failed(&self) {
        self.posts_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_pdfs_downloaded(&self) {
        self.pdfs_downloaded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_pdfs_failed(&self) {
        self.pdfs_failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A post left out of the run's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFailure {
    /// Post id, when the raw item carried one.
    pub post_id: Option<u64>,
    /// Why the post failed.
    pub reason: String,
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Number of categories listed.
    pub categories: usize,
    /// Number of posts listed.
    pub posts: usize,
    /// Records written, in listing order.
    pub records: Vec<PostRecord>,
    /// Posts excluded after an error, in listing order.
    pub failed: Vec<PostFailure>,
}

impl RunSummary {
    /// Number of posts that produced a record.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.records.len()
    }

    /// Total PDFs written across all records.
    #[must_use]
    pub fn pdfs_downloaded(&self) -> usize {
        self.records.iter().map(PostRecord::downloaded_count).sum()
    }

    /// Total PDF links that could not be downloaded.
    #[must_use]
    pub fn pdfs_failed(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.pdfs.len() - record.downloaded_count())
            .sum()
    }
}

/// Concurrent mirror of a site's posts and their PDF attachments.
pub struct MirrorEngine {
    config: MirrorConfig,
    post_slots: Semaphore,
    download_slots: Semaphore,
    extractor: Box<dyn LinkExtractor>,
    stats: Arc<MirrorStats>,
}

impl std::fmt::Debug for MirrorEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorEngine")
            .field("base_url", &self.config.base_url)
            .field("max_concurrent_posts", &self.config.max_concurrent_posts)
            .field(
                "max_concurrent_downloads",
                &self.config.max_concurrent_downloads,
            )
            .finish_non_exhaustive()
    }
}

impl MirrorEngine {
    /// Creates an engine for `config` using [`HtmlLinkExtractor`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if either concurrency limit
    /// is outside 1..=100.
    #[instrument(level = "debug", skip(config), fields(base_url = %config.base_url))]
    pub fn new(config: &MirrorConfig) -> Result<Self, EngineError> {
        validate_concurrency("max_concurrent_posts", config.max_concurrent_posts)?;
        validate_concurrency("max_concurrent_downloads", config.max_concurrent_downloads)?;

        debug!(
            max_concurrent_posts = config.max_concurrent_posts,
            max_concurrent_downloads = config.max_concurrent_downloads,
            "creating mirror engine"
        );

        Ok(Self {
            config: config.clone(),
            post_slots: Semaphore::new(config.max_concurrent_posts),
            download_slots: Semaphore::new(config.max_concurrent_downloads),
            extractor: Box::new(HtmlLinkExtractor),
            stats: Arc::new(MirrorStats::new()),
        })
    }

    /// Replaces the link extractor.
    #[must_use]
    pub fn with_link_extractor(mut self, extractor: impl LinkExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Live counters for this engine's runs.
    #[must_use]
    pub fn stats(&self) -> Arc<MirrorStats> {
        Arc::clone(&self.stats)
    }

    /// Mirrors every post of the configured site.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if the output root cannot be created
    /// and [`EngineError::Collection`] if listing categories or posts fails.
    /// Failures of individual posts or downloads are reported in the
    /// [`RunSummary`] instead.
    #[instrument(skip(self, client), fields(output_dir = %self.config.output_dir.display()))]
    pub async fn run(&self, client: &HttpClient) -> Result<RunSummary, EngineError> {
        let config = &self.config;
        std::fs::create_dir_all(&config.output_dir).map_err(|source| EngineError::OutputDir {
            path: config.output_dir.clone(),
            source,
        })?;

        info!("fetching categories");
        let categories =
            fetch_categories(client, &config.categories_endpoint, config.per_page).await?;
        let category_names: HashMap<u64, String> = categories
            .into_iter()
            .map(|category| (category.id, category.name))
            .collect();

        info!("fetching posts");
        let posts = fetch_posts(client, &config.posts_endpoint, config.per_page).await?;
        self.stats.set_posts_total(posts.len());

        let ctx = PostContext {
            client,
            download_slots: &self.download_slots,
            extractor: self.extractor.as_ref(),
            categories: &category_names,
            base_url: &config.base_url,
            output_root: &config.output_dir,
            stats: &self.stats,
        };

        let mut summary = RunSummary {
            categories: category_names.len(),
            posts: posts.len(),
            ..RunSummary::default()
        };

        let results = join_all(posts.into_iter().map(|raw| self.process_limited(ctx, raw))).await;
        for result in results {
            match result {
                Ok(record) => summary.records.push(record),
                Err(failure) => summary.failed.push(failure),
            }
        }

        info!(
            finished = summary.processed(),
            failed = summary.failed.len(),
            pdfs_downloaded = summary.pdfs_downloaded(),
            pdfs_failed = summary.pdfs_failed(),
            "mirror complete"
        );
        Ok(summary)
    }

    async fn process_limited(
        &self,
        ctx: PostContext<'_>,
        raw: Value,
    ) -> Result<PostRecord, PostFailure> {
        let post_id = post_id_hint(&raw);

        let result = match self.post_slots.acquire().await {
            Ok(_slot) => process_raw_post(ctx, raw).await,
            Err(_) => Err(PostError::SlotPoolClosed { pool: "post" }),
        };

        match result {
            Ok(record) => {
                self.stats.increment_posts_finished();
                debug!(
                    post_id = record.post_id,
                    pdfs = record.pdfs.len(),
                    "post finished"
                );
                Ok(record)
            }
            Err(e) => {
                self.stats.increment_posts_failed();
                warn!(post_id = ?post_id, error = %e, "post failed");
                Err(PostFailure {
                    post_id,
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn validate_concurrency(name: &'static str, value: usize) -> Result<(), EngineError> {
    if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidConcurrency { name, value })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::PdfRecord;

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, 10, 100] {
            let mut config = MirrorConfig::new("https://example.org");
            config.max_concurrent_posts = value;
            config.max_concurrent_downloads = value;
            assert!(MirrorEngine::new(&config).is_ok(), "value {value}");
        }
    }

    #[test]
    fn test_engine_new_invalid_post_concurrency() {
        let mut config = MirrorConfig::new("https://example.org");
        config.max_concurrent_posts = 0;
        assert!(matches!(
            MirrorEngine::new(&config),
            Err(EngineError::InvalidConcurrency {
                name: "max_concurrent_posts",
                value: 0
            })
        ));
    }

    #[test]
    fn test_engine_new_invalid_download_concurrency() {
        let mut config = MirrorConfig::new("https://example.org");
        config.max_concurrent_downloads = 101;
        assert!(matches!(
            MirrorEngine::new(&config),
            Err(EngineError::InvalidConcurrency {
                name: "max_concurrent_downloads",
                value: 101
            })
        ));
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidConcurrency {
            name: "max_concurrent_posts",
            value: 0,
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid max_concurrent_posts"));
        assert!(msg.contains("between 1 and 100"));
    }

    #[test]
    fn test_mirror_stats_increment() {
        let stats = MirrorStats::new();
        stats.set_posts_total(3);
        stats.increment_posts_finished();
        stats.increment_posts_finished();
        stats.increment_posts_failed();
        stats.increment_pdfs_downloaded();
        stats.increment_pdfs_failed();
        stats.increment_pdfs_failed();

        assert_eq!(stats.posts_total(), 3);
        assert_eq!(stats.posts_finished(), 2);
        assert_eq!(stats.posts_failed(), 1);
        assert_eq!(stats.posts_done(), 3);
        assert_eq!(stats.pdfs_downloaded(), 1);
        assert_eq!(stats.pdfs_failed(), 2);
    }

    #[test]
    fn test_mirror_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(MirrorStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.increment_posts_finished();
                        stats.increment_pdfs_downloaded();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.posts_finished(), 1000);
        assert_eq!(stats.pdfs_downloaded(), 1000);
    }

    #[test]
    fn test_run_summary_totals() {
        let pdf = |downloaded| PdfRecord {
            url: "https://example.org/a.pdf".to_string(),
            link_text: String::new(),
            file_name: "a.pdf".to_string(),
            downloaded,
            error: String::new(),
        };
        let summary = RunSummary {
            categories: 1,
            posts: 2,
            records: vec![PostRecord {
                post_id: 1,
                post_title: String::new(),
                date: String::new(),
                category_ids: Vec::new(),
                category_names: Vec::new(),
                pdfs: vec![pdf(true), pdf(false), pdf(true)],
            }],
            failed: vec![PostFailure {
                post_id: Some(2),
                reason: "boom".to_string(),
            }],
        };

        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.pdfs_downloaded(), 2);
        assert_eq!(summary.pdfs_failed(), 1);
    }
}
