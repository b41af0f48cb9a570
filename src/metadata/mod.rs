//! Per-post `metadata.json` records.
//!
//! A record is built fully in memory after every link of a post has been
//! attempted, then serialized once. The JSON is written to a temporary
//! sibling and renamed into place so readers never observe a truncated file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::constants::METADATA_FILE_NAME;

/// Errors produced while persisting a record.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// I/O error creating, writing or renaming the record file.
    #[error("I/O error writing {path}: {source}")]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// JSON serialization error (shouldn't occur for well-formed structs).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl MetadataError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of one discovered PDF link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfRecord {
    /// Absolute URL of the document.
    pub url: String,
    /// Anchor text the link was found with.
    pub link_text: String,
    /// Name assigned within the post directory.
    pub file_name: String,
    /// Whether the file was fully written.
    pub downloaded: bool,
    /// Failure message, empty on success.
    pub error: String,
}

/// Persisted summary of one processed post.
///
/// Field order is the key order in `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Remote post id.
    pub post_id: u64,
    /// Plain-text post title.
    pub post_title: String,
    /// Publication date as reported by the API.
    pub date: String,
    /// Category ids in API order.
    pub category_ids: Vec<u64>,
    /// Category names parallel to `category_ids`; unknown ids map to `""`.
    pub category_names: Vec<String>,
    /// One entry per distinct discovered link, in discovery order.
    pub pdfs: Vec<PdfRecord>,
}

impl PostRecord {
    /// Number of links that were downloaded successfully.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.pdfs.iter().filter(|pdf| pdf.downloaded).count()
    }
}

/// Writes `record` as `metadata.json` inside `dir`, returning the final path.
///
/// # Errors
///
/// Returns [`MetadataError`] on I/O or serialization failure. The temporary
/// file is removed on failure.
#[instrument(skip(record), fields(post_id = record.post_id, dir = %dir.display()))]
pub fn write_metadata(dir: &Path, record: &PostRecord) -> Result<PathBuf, MetadataError> {
    let path = dir.join(METADATA_FILE_NAME);
    let tmp_path = dir.join(format!(".{METADATA_FILE_NAME}.tmp"));

    if let Err(err) = write_json(&tmp_path, record) {
        // Best-effort cleanup so a stale temp file doesn't linger.
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp_path, &path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(MetadataError::io(&path, err));
    }

    debug!(path = %path.display(), "metadata written");
    Ok(path)
}

fn write_json(path: &Path, record: &PostRecord) -> Result<(), MetadataError> {
    let file = fs::File::create(path).map_err(|e| MetadataError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| MetadataError::io(path, e))
}
