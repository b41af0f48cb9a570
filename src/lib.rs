//! pdf-mirror core library
//!
//! Mirrors the PDF attachments of a WordPress site: lists every category and
//! post through the REST API, downloads the PDFs linked from each post and
//! writes a `metadata.json` per post describing what was found.
//!
//! # Architecture
//!
//! - [`download`] - retrying transport, naming, per-post pipeline and engine
//! - [`api`] - paginated collection endpoints
//! - [`parser`] - PDF link extraction from rendered HTML
//! - [`metadata`] - per-post records
//! - [`config`] - run configuration and its TOML layer

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod download;
pub mod metadata;
pub mod parser;
pub mod user_agent;

// Re-export commonly used types
pub use api::{ApiError, Category, Post, collect_all, fetch_categories, fetch_posts};
pub use config::{ConfigError, FileConfig, MirrorConfig, load_file_config};
pub use download::{
    ClientSettings, DownloadError, DownloadOutcome, EngineError, FailureType, HttpClient,
    MirrorEngine, MirrorStats, PostError, PostFailure, RetryDecision, RetryPolicy, RunSummary,
    classify_error,
};
pub use metadata::{MetadataError, PdfRecord, PostRecord, write_metadata};
pub use parser::{HtmlLinkExtractor, Link, LinkExtractor, ParseError};
