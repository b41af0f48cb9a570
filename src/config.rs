//! Run configuration: the injected [`MirrorConfig`] and its TOML file layer.
//!
//! Values come from three layers, highest precedence first: command-line
//! flags, an optional `config.toml`, built-in defaults. Both upper layers are
//! expressed as a [`FileConfig`] (every field optional) and merged with
//! [`FileConfig::layered_over`] before [`FileConfig::into_mirror_config`]
//! fills the gaps and validates.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::download::constants::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_RETRIES, DEFAULT_RETRY_BACKOFF, REQUEST_TIMEOUT_SECS,
};
use crate::download::{ClientSettings, RetryPolicy};
use crate::user_agent::default_user_agent;

/// Default page size for collection requests.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Default number of posts processed at once.
pub const DEFAULT_MAX_CONCURRENT_POSTS: usize = 4;

/// Default number of file transfers in flight across all posts.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 8;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

const CATEGORIES_PATH: &str = "wp-json/wp/v2/categories";
const POSTS_PATH: &str = "wp-json/wp/v2/posts";
const MAX_RETRY_BACKOFF_SECS: f64 = 60.0;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No base URL was given on the command line or in the config file.
    #[error("missing base URL\n  Suggestion: pass --base-url or set `base_url` in config.toml")]
    MissingBaseUrl,

    /// A value is outside its accepted range or malformed.
    #[error("invalid value for `{field}`: {value}. Expected {expected}")]
    InvalidValue {
        /// Configuration key.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// What would have been accepted.
        expected: &'static str,
    },

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Everything the engine needs to know about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Total attempts per logical request (including the first).
    pub retries: u32,
    /// Base delay for exponential backoff.
    pub retry_backoff: Duration,
    /// Cap on simultaneously open HTTP connections.
    pub max_connections: usize,
    /// User-Agent header value.
    pub user_agent: String,
    /// Items requested per page.
    pub per_page: u32,
    /// Posts processed at once.
    pub max_concurrent_posts: usize,
    /// File transfers in flight across all posts.
    pub max_concurrent_downloads: usize,
    /// Site URL relative links are resolved against.
    pub base_url: String,
    /// Categories collection endpoint.
    pub categories_endpoint: String,
    /// Posts collection endpoint.
    pub posts_endpoint: String,
    /// Root directory for per-post output.
    pub output_dir: PathBuf,
}

impl MirrorConfig {
    /// Builds a config with defaults for everything but the site URL.
    /// Endpoints are derived from `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            user_agent: default_user_agent(),
            per_page: DEFAULT_PER_PAGE,
            max_concurrent_posts: DEFAULT_MAX_CONCURRENT_POSTS,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            categories_endpoint: endpoint_url(&base_url, CATEGORIES_PATH),
            posts_endpoint: endpoint_url(&base_url, POSTS_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            base_url,
        }
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("base_url", &self.base_url)?;
        validate_http_url("categories_endpoint", &self.categories_endpoint)?;
        validate_http_url("posts_endpoint", &self.posts_endpoint)?;

        let timeout_secs = self.request_timeout.as_secs();
        if !(1..=3600).contains(&timeout_secs) {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                timeout_secs,
                "range 1..=3600",
            ));
        }
        if !(1..=10).contains(&self.retries) {
            return Err(ConfigError::invalid("retries", self.retries, "range 1..=10"));
        }
        if self.retry_backoff.as_secs_f64() > MAX_RETRY_BACKOFF_SECS {
            return Err(ConfigError::invalid(
                "retry_backoff_secs",
                self.retry_backoff.as_secs_f64(),
                "range 0..=60",
            ));
        }
        validate_limit("max_connections", self.max_connections)?;
        validate_limit("max_concurrent_posts", self.max_concurrent_posts)?;
        validate_limit("max_concurrent_downloads", self.max_concurrent_downloads)?;
        if !(1..=100).contains(&self.per_page) {
            return Err(ConfigError::invalid("per_page", self.per_page, "range 1..=100"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid(
                "user_agent",
                "\"\"",
                "a non-empty string",
            ));
        }
        Ok(())
    }

    /// Transport settings derived from this config.
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: self.request_timeout,
            max_connections: self.max_connections,
            user_agent: self.user_agent.clone(),
            retry_policy: RetryPolicy::new(self.retries, self.retry_backoff),
        }
    }
}

/// One layer of optional settings, as found in `config.toml`.
///
/// ```toml
/// base_url = "https://example.org"
/// output_dir = "mirror"
/// max_concurrent_downloads = 4
/// retry_backoff_secs = 0.5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Site URL.
    pub base_url: Option<String>,
    /// Categories endpoint override.
    pub categories_endpoint: Option<String>,
    /// Posts endpoint override.
    pub posts_endpoint: Option<String>,
    /// Output directory.
    pub output_dir: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Total attempts per request.
    pub retries: Option<u32>,
    /// Backoff base in seconds (fractions allowed).
    pub retry_backoff_secs: Option<f64>,
    /// Connection cap.
    pub max_connections: Option<usize>,
    /// User-Agent header value.
    pub user_agent: Option<String>,
    /// Page size.
    pub per_page: Option<u32>,
    /// Posts processed at once.
    pub max_concurrent_posts: Option<usize>,
    /// Downloads in flight.
    pub max_concurrent_downloads: Option<usize>,
}

impl FileConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys.
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Returns `self` with unset fields taken from `lower`.
    #[must_use]
    pub fn layered_over(self, lower: Self) -> Self {
        Self {
            base_url: self.base_url.or(lower.base_url),
            categories_endpoint: self.categories_endpoint.or(lower.categories_endpoint),
            posts_endpoint: self.posts_endpoint.or(lower.posts_endpoint),
            output_dir: self.output_dir.or(lower.output_dir),
            request_timeout_secs: self.request_timeout_secs.or(lower.request_timeout_secs),
            retries: self.retries.or(lower.retries),
            retry_backoff_secs: self.retry_backoff_secs.or(lower.retry_backoff_secs),
            max_connections: self.max_connections.or(lower.max_connections),
            user_agent: self.user_agent.or(lower.user_agent),
            per_page: self.per_page.or(lower.per_page),
            max_concurrent_posts: self.max_concurrent_posts.or(lower.max_concurrent_posts),
            max_concurrent_downloads: self
                .max_concurrent_downloads
                .or(lower.max_concurrent_downloads),
        }
    }

    /// Fills unset fields with defaults and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBaseUrl`] when no base URL is set, or
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn into_mirror_config(self) -> Result<MirrorConfig, ConfigError> {
        let base_url = self
            .base_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingBaseUrl)?;
        let mut config = MirrorConfig::new(base_url.trim());

        if let Some(endpoint) = self.categories_endpoint {
            config.categories_endpoint = endpoint;
        }
        if let Some(endpoint) = self.posts_endpoint {
            config.posts_endpoint = endpoint;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        if let Some(secs) = self.retry_backoff_secs {
            config.retry_backoff = Duration::try_from_secs_f64(secs)
                .map_err(|_| ConfigError::invalid("retry_backoff_secs", secs, "range 0..=60"))?;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(per_page) = self.per_page {
            config.per_page = per_page;
        }
        if let Some(max) = self.max_concurrent_posts {
            config.max_concurrent_posts = max;
        }
        if let Some(max) = self.max_concurrent_downloads {
            config.max_concurrent_downloads = max;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/pdf-mirror/config.toml`
/// 2. `$HOME/.config/pdf-mirror/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("pdf-mirror")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("pdf-mirror")
            .join("config.toml"),
    )
}

/// Loads `explicit` if given, else the default config file when it exists.
///
/// # Errors
///
/// Returns [`ConfigError`] when a file exists but cannot be read or parsed.
/// An explicit path that does not exist is an error; a missing default file
/// is not.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>, ConfigError> {
    if let Some(path) = explicit {
        return FileConfig::load(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => FileConfig::load(&path).map(Some),
        _ => Ok(None),
    }
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => Err(ConfigError::invalid(field, value, "an absolute http(s) URL")),
    }
}

fn validate_limit(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, value, "range 1..=100"))
    }
}
