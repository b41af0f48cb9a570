//! Name sanitization and collision-free naming for mirrored posts.
//!
//! Post directories are unique within the output root (checked against the
//! filesystem); file names are unique within one post directory (checked
//! against a [`NameRegistry`] owned by that post's pipeline).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use super::DownloadError;
use super::constants::{MAX_NAME_LENGTH, METADATA_FILE_NAME};

/// Characters reserved on common filesystems; each run becomes a single `-`.
#[allow(clippy::expect_used)]
static RESERVED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]+"#).expect("reserved-char regex is valid"));

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Windows device names that cannot be used as a file or directory name.
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Fallback name for a link with neither text nor a usable URL segment.
const DOCUMENT_FALLBACK: &str = "document";

const PDF_EXTENSION: &str = ".pdf";

/// Turns arbitrary text into a filesystem-safe name of at most `max_length` chars.
///
/// Entities are decoded, the text is NFKD-folded to ASCII, reserved characters
/// become `-`, whitespace collapses, leading/trailing dots and spaces are
/// trimmed and device names get a `_` prefix. `fallback` is used whenever the
/// result would be empty.
#[must_use]
pub fn sanitize_name(raw: &str, fallback: &str, max_length: usize) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let ascii: String = decoded
        .nfkd()
        .filter(|c| c.is_ascii() && (!c.is_ascii_control() || c.is_ascii_whitespace()))
        .collect();
    let replaced = RESERVED_CHARS.replace_all(&ascii, "-");
    let collapsed = WHITESPACE_RUN.replace_all(&replaced, " ");
    let mut value = trim_dots_and_spaces(&collapsed).to_string();

    if value.is_empty() {
        value = fallback.to_string();
    }

    if value.len() > max_length {
        value = truncate_ascii(&value, max_length)
            .trim_end_matches([' ', '.', '-'])
            .to_string();
    }

    if value.is_empty() {
        value = truncate_ascii(fallback, max_length);
    }

    if is_reserved_device_name(&value) {
        value = truncate_ascii(&format!("_{value}"), max_length);
    }

    value
}

/// Picks, creates and returns the directory for one post.
///
/// The sanitized title is used unless a directory of that name already
/// exists. Otherwise `<name>-<post_id>` is tried, then `<name>-<post_id>-2`,
/// `-3`, ... A suffixed candidate is free when it does not exist or holds a
/// `metadata.json` written for this same post by an earlier run.
///
/// The existence checks and creation happen without an intervening await, so
/// concurrently scheduled posts on the same task cannot interleave between them.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] carrying the directory that could not be
/// created.
pub fn resolve_directory_name(
    output_root: &Path,
    title: &str,
    post_id: u64,
) -> Result<PathBuf, DownloadError> {
    let fallback = format!("post-{post_id}");
    let base_name = sanitize_name(title, &fallback, MAX_NAME_LENGTH);
    let mut post_dir = output_root.join(&base_name);

    let mut attempt = 1u32;
    let mut free = !post_dir.exists();
    while !free {
        let suffix = if attempt == 1 {
            format!("-{post_id}")
        } else {
            format!("-{post_id}-{attempt}")
        };
        let candidate = with_suffix(&base_name, &suffix);
        debug!(
            post_id,
            taken = %post_dir.display(),
            candidate = %candidate,
            "post directory name already in use"
        );
        post_dir = output_root.join(candidate);
        free = is_free_for(&post_dir, post_id);
        attempt += 1;
    }

    std::fs::create_dir_all(&post_dir).map_err(|e| DownloadError::io(&post_dir, e))?;
    Ok(post_dir)
}

fn is_free_for(dir: &Path, post_id: u64) -> bool {
    if !dir.exists() {
        return true;
    }
    let Ok(raw) = std::fs::read_to_string(dir.join(METADATA_FILE_NAME)) else {
        return false;
    };
    serde_json::from_str::<Value>(&raw)
        .ok()
        .and_then(|record| record.get("post_id").and_then(Value::as_u64))
        == Some(post_id)
}

/// Appends `suffix`, shortening `name` so the suffix always survives.
fn with_suffix(name: &str, suffix: &str) -> String {
    let keep = MAX_NAME_LENGTH.saturating_sub(suffix.len());
    let head = truncate_ascii(name, keep);
    format!("{}{suffix}", head.trim_end_matches([' ', '.', '-']))
}

/// File names already handed out inside one post directory.
///
/// Owned by a single post's pipeline and dropped with it; never shared.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` has been handed out.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    fn register(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }
}

/// Chooses a unique `.pdf` file name for a link and registers it.
///
/// Name source: `link_text`, else the last path segment of `url`, else
/// `document`. Collisions get `-2`, `-3`, ... before the extension.
#[must_use]
pub fn resolve_file_name(link_text: &str, url: &str, registry: &mut NameRegistry) -> String {
    let source = if link_text.trim().is_empty() {
        last_path_segment(url).unwrap_or_else(|| DOCUMENT_FALLBACK.to_string())
    } else {
        link_text.to_string()
    };

    let mut base_name = sanitize_name(&source, DOCUMENT_FALLBACK, MAX_NAME_LENGTH);
    if !base_name.to_ascii_lowercase().ends_with(PDF_EXTENSION) {
        base_name.push_str(PDF_EXTENSION);
    }

    let stem = &base_name[..base_name.len() - PDF_EXTENSION.len()];
    let extension = &base_name[base_name.len() - PDF_EXTENSION.len()..];

    let mut candidate = base_name.clone();
    let mut counter = 2u32;
    while registry.contains(&candidate) {
        candidate = format!("{stem}-{counter}{extension}");
        counter += 1;
    }

    registry.register(&candidate);
    candidate
}

/// Last non-empty, percent-decoded path segment of `url`.
fn last_path_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment)
        .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned);
    Some(decoded)
}

fn trim_dots_and_spaces(value: &str) -> &str {
    value.trim_matches([' ', '.'])
}

fn is_reserved_device_name(value: &str) -> bool {
    RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(value))
}

/// Truncates an ASCII string to `max_length` bytes.
fn truncate_ascii(value: &str, max_length: usize) -> String {
    value.chars().take(max_length).collect()
}
