//! HTTP client wrapper for JSON pages and streamed file downloads.
//!
//! This module provides the [`HttpClient`] struct: one shared reqwest session
//! with a hard cap on simultaneously open connections, and a retry loop
//! driven by [`RetryPolicy`] around every logical request.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::HeaderMap;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{DEFAULT_MAX_CONNECTIONS, REQUEST_TIMEOUT_SECS};
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::user_agent;

/// Settings the transport is built from.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Per-request timeout covering connect, headers and body.
    pub request_timeout: Duration,
    /// Cap on simultaneously open connections across all requests.
    pub max_connections: usize,
    /// User-Agent header sent with every request.
    pub user_agent: String,
    /// Attempts and backoff for every logical request.
    pub retry_policy: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            user_agent: user_agent::default_user_agent(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// A decoded JSON response together with its headers.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    /// Parsed response body.
    pub body: serde_json::Value,
    /// Response headers (pagination hints live here).
    pub headers: HeaderMap,
}

/// Retrying HTTP transport.
///
/// Created once per run and shared by reference; cloning is cheap and the
/// clones share both the connection pool and the connection cap.
///
/// # Example
///
/// ```no_run
/// use pdf_mirror_core::download::{ClientSettings, HttpClient};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(&ClientSettings::default())?;
/// let page = client
///     .fetch_json("https://example.com/wp-json/wp/v2/posts", &[("page", "1".to_string())])
///     .await?;
/// client
///     .download_to_file("https://example.com/report.pdf", Path::new("./report.pdf"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    connections: Arc<Semaphore>,
    retry_policy: RetryPolicy,
}

impl HttpClient {
    /// Builds the shared session.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if reqwest rejects the configuration.
    pub fn new(settings: &ClientSettings) -> Result<Self, DownloadError> {
        let max_connections = settings.max_connections.max(1);
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(max_connections)
            .gzip(true)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;

        debug!(
            max_connections,
            timeout_ms = settings.request_timeout.as_millis(),
            max_attempts = settings.retry_policy.max_attempts(),
            "created HTTP client"
        );

        Ok(Self {
            client,
            connections: Arc::new(Semaphore::new(max_connections)),
            retry_policy: settings.retry_policy.clone(),
        })
    }

    /// Fetches `url` with `query` appended and decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the last observed [`DownloadError`] once the retry policy gives
    /// up, or immediately for a malformed URL.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn fetch_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<JsonResponse, DownloadError> {
        let request_url = build_url(url, query)?;
        let request_url = &request_url;
        self.with_retry(request_url.as_str(), move || {
            self.fetch_json_once(request_url)
        })
        .await
    }

    /// Streams the body of `url` into a new file at `dest`, returning bytes written.
    ///
    /// A failed attempt never leaves a file at `dest`: the partial file is
    /// removed before the next attempt and before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the last observed [`DownloadError`] once the retry policy gives up.
    #[instrument(skip(self), fields(url = %url, dest = %dest.display()))]
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let parsed = &parsed;
        self.with_retry(url, move || self.download_once(parsed, dest))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<T, DownloadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "sending request");

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self
                .retry_policy
                .should_retry(classify_error(&error), attempt)
            {
                RetryDecision::Retry { delay, .. } => {
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %url, attempt, reason = %reason, "giving up");
                    return Err(error);
                }
            }
        }
    }

    async fn fetch_json_once(&self, url: &Url) -> Result<JsonResponse, DownloadError> {
        let _connection = self.acquire_connection(url.as_str()).await?;
        let response = self.send_get(url.as_str()).await?;
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;
        let body =
            serde_json::from_slice(&bytes).map_err(|e| DownloadError::decode(url.as_str(), e))?;
        Ok(JsonResponse { body, headers })
    }

    async fn download_once(&self, url: &Url, dest: &Path) -> Result<u64, DownloadError> {
        let result = self.download_attempt(url, dest).await;
        if result.is_err() {
            remove_partial_file(dest).await;
        }
        result
    }

    async fn download_attempt(&self, url: &Url, dest: &Path) -> Result<u64, DownloadError> {
        let _connection = self.acquire_connection(url.as_str()).await?;
        let response = self.send_get(url.as_str()).await?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        let bytes = stream_to_file(&mut file, response, url.as_str(), dest).await?;

        debug!(path = %dest.display(), bytes, "download complete");
        Ok(bytes)
    }

    /// Waits for a free connection; held until the response body is consumed.
    async fn acquire_connection(&self, url: &str) -> Result<SemaphorePermit<'_>, DownloadError> {
        self.connections
            .acquire()
            .await
            .map_err(|_| DownloadError::PoolClosed {
                url: url.to_string(),
            })
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(DownloadError::http_status(url, status));
        }
        Ok(response)
    }
}

/// Appends `query` pairs to `url`.
fn build_url(url: &str, query: &[(&str, String)]) -> Result<Url, DownloadError> {
    let mut parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    if !query.is_empty() {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(parsed)
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

async fn remove_partial_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
    }
}
